//! Region hosting: one [`RegionHost`] per region process, wired together by
//! an in-process [`Cluster`] for tools and tests.
//!
//! # Invariants
//! - Each host mutates only its own registry and scene.
//! - Hosts talk to each other only through their mailboxes.
//! - The root-claim ledger is the one piece of state shared by every host.

mod cluster;
mod config;
mod directory;
mod host;
mod transport;
mod viewer;

pub use cluster::{Cluster, ClusterError, MoveOutcome, PumpReport};
pub use config::HostConfig;
pub use directory::MemoryDirectory;
pub use host::{CreationReport, HostError, InboxReport, RegionHost, TickReport};
pub use transport::LocalTransport;
pub use viewer::RecordingViewer;
