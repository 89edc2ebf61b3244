use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::DVec3;
use tracing_subscriber::EnvFilter;

use regionsync_chat::ChatMessage;
use regionsync_common::{ActorRole, AvatarId, Region, RegionId};
use regionsync_host::{Cluster, HostConfig, MemoryDirectory, RecordingViewer};
use regionsync_kernel::{ChatType, ObjectFilter, SceneObject};
use regionsync_sync::{ActorCoordinator, CoordinatorState, SyncConfig};

#[derive(Parser)]
#[command(name = "regionsync-cli", about = "CLI tool for regionsync operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Host configuration (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and the effective configuration
    Info {
        /// Print the configuration as JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
    /// Check whether the configuration activates synchronization
    CheckConfig,
    /// Two regions side by side; one avatar talks across the border
    DemoChat {
        /// Distance of the listener from the shared border, in metres
        #[arg(short, long, default_value = "6")]
        gap: f64,
        /// Chat type: whisper, say, shout or region
        #[arg(short = 't', long, default_value = "say")]
        chat_type: String,
    },
    /// Create objects in a region mirrored by a scene-persistence actor
    DemoPersist {
        /// Number of objects to create
        #[arg(short, long, default_value = "5")]
        objects: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { json } => {
            println!("regionsync-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("roles: {}", ActorRole::ALL.map(|r| r.as_str()).join(", "));
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", serde_yaml::to_string(&config)?);
            }
        }
        Commands::CheckConfig => {
            let coordinator =
                ActorCoordinator::configure(RegionId::new(), config.role, config.sync.as_ref());
            match coordinator.state() {
                CoordinatorState::Active(reg) => {
                    println!("active: role={} actor_id={}", reg.role, reg.actor_id);
                }
                CoordinatorState::Inactive(reason) => {
                    println!("inactive: {reason}");
                }
            }
        }
        Commands::DemoChat { gap, chat_type } => demo_chat(&config, gap, &chat_type)?,
        Commands::DemoPersist { objects } => demo_persist(&config, objects)?,
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<HostConfig> {
    let Some(path) = path else {
        return Ok(HostConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config = serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded config");
    Ok(config)
}

fn parse_chat_type(s: &str) -> anyhow::Result<ChatType> {
    match s.to_ascii_lowercase().as_str() {
        "whisper" => Ok(ChatType::Whisper),
        "say" => Ok(ChatType::Say),
        "shout" => Ok(ChatType::Shout),
        "region" => Ok(ChatType::Region),
        other => anyhow::bail!("unknown chat type {other:?}"),
    }
}

fn demo_chat(config: &HostConfig, gap: f64, chat_type: &str) -> anyhow::Result<()> {
    let chat_type = parse_chat_type(chat_type)?;
    let west = Region::new(RegionId::new(), "west", 1000, 1000);
    let east = Region::new(RegionId::new(), "east", 1001, 1000);
    let mut cluster = Cluster::build(vec![
        (west.clone(), config.clone()),
        (east.clone(), config.clone()),
    ]);

    let listener = AvatarId::new();
    let listener_viewer = RecordingViewer::new();
    let listener_pos = DVec3::new(256.0 - gap, 128.0, 20.0);
    cluster
        .host_mut(west.id())
        .context("west host")?
        .login(listener, "listener", listener_pos, false, Arc::new(listener_viewer.clone()))?;

    let talker = AvatarId::new();
    cluster
        .host_mut(east.id())
        .context("east host")?
        .login(talker, "talker", DVec3::new(6.0, 128.0, 20.0), false, Arc::new(RecordingViewer::new()))?;
    let settled = cluster.pump();
    println!("settled after {} messages", settled.handled);

    for host in cluster.hosts() {
        for p in host.registry().list_presences() {
            let kind = if p.is_root() { "root" } else { "child" };
            println!("  {:<5} {:<8} {kind:<5} local={}", host.region().name(), p.name, p.position);
        }
    }

    let message = ChatMessage::new("hello from the east", chat_type);
    let report = cluster.chat_from_avatar(east.id(), talker, &message)?;
    println!(
        "{chat_type:?}: delivered={} failed={} listener_heard={}",
        report.delivered.len(),
        report.failed.len(),
        !listener_viewer.lines().is_empty()
    );
    Ok(())
}

fn demo_persist(config: &HostConfig, objects: usize) -> anyhow::Result<()> {
    let primary = HostConfig {
        role: ActorRole::ClientManager,
        sync: Some(SyncConfig::new("client_manager", "demo-primary")),
        ..config.clone()
    };
    let persistence = HostConfig {
        role: ActorRole::ScenePersistence,
        sync: Some(SyncConfig::new("scene_persistence", "demo-persist")),
        ..config.clone()
    };
    let region = Region::new(RegionId::new(), "vault", 1000, 1000);
    let id = region.id();
    let mut cluster = Cluster::build(vec![(region, primary)]);
    cluster.add_actor(id, &persistence)?;
    let directory = MemoryDirectory::new();
    for (region, outcome) in cluster.start(&directory) {
        println!("register {region}: {outcome:?}");
    }

    let owner = AvatarId::new();
    let host = cluster.host_mut(id).context("vault host")?;
    for i in 0..objects {
        let object = SceneObject::new(id, format!("crate-{i}"), owner, DVec3::new(10.0 + i as f64, 10.0, 22.0));
        host.create_object(object)?;
    }
    let synced = cluster.pump();
    for (region, err) in &synced.hook_errors {
        println!("  hook error in {region}: {err}");
    }

    let attach_calls = cluster.ledger(id).map_or(0, |l| l.attach_calls());
    let actor = cluster.actor(id).context("persistence actor")?;
    let mirrored = actor.scene().select(&ObjectFilter::Owner(owner)).len();
    println!(
        "replicated={} mirrored={mirrored} attach_calls={attach_calls}",
        synced.handled
    );
    Ok(())
}
