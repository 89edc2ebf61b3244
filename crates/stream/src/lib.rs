//! Streaming of avatar presence into neighbouring regions.
//!
//! # Invariants
//! - A neighbour holds a child mirror only while the avatar's root position,
//!   expanded by the interest margin, overlaps that neighbour's footprint.
//! - Every root move refreshes every established mirror; the last update wins.
//! - Sends never wait on the receiving region.

mod neighbors;
mod notifier;

pub use neighbors::NeighborMap;
pub use notifier::{
    EstablishmentError, NeighborDiff, NeighborNotifier, NeighborState, NotifierConfig,
};
