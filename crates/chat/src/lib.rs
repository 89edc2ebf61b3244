//! Proximity delivery: chat-like events fanned out to every presence within
//! audible range, Root or Child, in each participating region.
//!
//! # Invariants
//! - Distance is measured in the world-global frame.
//! - Each avatar hears a message at most once, through its Root when present.
//! - One recipient failing never stops delivery to the others.

mod delivery;
mod ranges;

pub use delivery::{
    ChatMessage, ChatSource, DEBUG_CHANNEL, DeliveryReport, PUBLIC_CHANNEL, ProximityDelivery,
};
pub use ranges::ChatRanges;
