//! Persistence binding: scene objects are flagged for durability and handed
//! to the backup subsystem exactly once, whichever creation channel reports
//! them first.
//!
//! # Invariants
//! - The persist-pending flag is set at most once per object.
//! - An object is attached to backup at most once.
//! - A rejected attach leaves the object flagged but not backed up.

mod binder;
mod ledger;

pub use binder::{BindError, BindOutcome, PersistenceBinder};
pub use ledger::{AttachError, BackupLedger, BackupSubsystem};
