//! Shared types: identities, region geometry, coordinate-frame translation.
//!
//! # Invariants
//! - Translation between world-global and region-local frames is pure and total.
//! - Region ownership of a point uses half-open rectangles, so neighbours never
//!   both own a border point.

mod region;
mod role;
mod types;

pub use region::{GRID_UNIT, Region, to_global, to_local};
pub use role::{ActorRole, UnknownRole};
pub use types::{AvatarId, ObjectId, RegionId};
