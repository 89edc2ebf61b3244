use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for regionsync")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run fmt, clippy, tests and doc
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates, warnings denied
    Clippy,
    /// Run all tests
    Test,
    /// Build rustdoc for the workspace
    Doc,
    /// Run the neighbour-update benchmark
    Bench,
    /// Run the CLI demos end to end
    Demo,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            fmt()?;
            clippy()?;
            test()?;
            doc()?;
        }
        Commands::Fmt => fmt()?,
        Commands::Clippy => clippy()?,
        Commands::Test => test()?,
        Commands::Doc => doc()?,
        Commands::Bench => cargo(
            "neighbour-update bench",
            &["bench", "-p", "regionsync-stream", "--bench", "bench_neighbor_update"],
        )?,
        Commands::Demo => {
            let cli = ["run", "-q", "-p", "regionsync-cli", "--"];
            cargo("demo-chat (say)", &[&cli[..], &["demo-chat"]].concat())?;
            cargo(
                "demo-chat (whisper, out of range)",
                &[&cli[..], &["demo-chat", "--gap", "20", "-t", "whisper"]].concat(),
            )?;
            cargo("demo-persist", &[&cli[..], &["demo-persist"]].concat())?;
        }
    }

    Ok(())
}

fn fmt() -> Result<()> {
    cargo("cargo fmt --check", &["fmt", "--all", "--", "--check"])
}

fn clippy() -> Result<()> {
    cargo(
        "cargo clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    )
}

fn test() -> Result<()> {
    cargo("cargo test", &["test", "--workspace"])
}

fn doc() -> Result<()> {
    cargo("cargo doc", &["doc", "--workspace", "--no-deps"])
}

fn cargo(label: &str, args: &[&str]) -> Result<()> {
    println!("==> {label}");
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{label} failed");
    }
    Ok(())
}
