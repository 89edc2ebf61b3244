use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use glam::DVec3;
use regionsync_common::{AvatarId, Region, RegionId};
use regionsync_kernel::{NullClient, PresenceRegistry, RegionMessage, RootClaims, Transport, TransportError};
use regionsync_stream::{NeighborMap, NeighborNotifier, NotifierConfig};

/// Accepts and drops every message.
struct Sink;

impl Transport for Sink {
    fn send(&self, _target: RegionId, message: RegionMessage) -> Result<(), TransportError> {
        black_box(message);
        Ok(())
    }
}

fn grid(side: u32) -> Vec<Region> {
    let mut out = Vec::new();
    for y in 0..side {
        for x in 0..side {
            let tail = u128::from(y * side + x + 1);
            out.push(Region::new(RegionId::from_tail(tail), format!("r{x}-{y}"), 1000 + x, 1000 + y));
        }
    }
    out
}

fn bench_root_moves(avatars: usize, iterations: usize, margin: f64) {
    let regions = grid(3);
    let home = regions[4].clone();
    let mut registry = PresenceRegistry::new(home.clone(), RootClaims::new());
    let mut notifier = NeighborNotifier::new(
        NeighborMap::from_regions(home, &regions),
        NotifierConfig {
            interest_margin: margin,
        },
    );
    let ids: Vec<AvatarId> = (0..avatars).map(|_| AvatarId::new()).collect();

    let start = Instant::now();
    for i in 0..iterations {
        for (n, avatar) in ids.iter().enumerate() {
            // Sweep across the region so neighbours enter and leave range.
            let x = ((i + n) % 256) as f64;
            let pos = DVec3::new(x, 128.0, 20.0);
            let _ = registry.upsert_root(*avatar, "bench", pos, false, Arc::new(NullClient));
            let diff = notifier.on_root_moved(&mut registry, *avatar, &NullClient, &Sink);
            black_box(diff);
        }
    }
    let elapsed = start.elapsed();
    let moves = (iterations * avatars) as u32;
    let per_move = elapsed / moves.max(1);
    println!(
        "  root moves ({avatars} avatars, margin {margin}, {iterations} iters): {per_move:?}/move, total {elapsed:?}"
    );
}

fn main() {
    println!("=== Neighbor Update Benchmarks ===\n");

    println!("Root moves across a 3x3 grid:");
    bench_root_moves(10, 1000, 32.0);
    bench_root_moves(100, 100, 32.0);
    bench_root_moves(100, 100, 128.0);

    println!("\n=== Done ===");
}
