//! WorldVault - backup engine for live game servers
//!
//! Schedules, admits and runs backups of a running server's world and plugin
//! data: sources are staged out of the live tree, promoted atomically into a
//! backup store, and old artifacts are evicted per a retention policy.

pub mod archive;
pub mod config;
pub mod event;
pub mod host;
pub mod job;
pub mod orchestrator;
pub mod retention;
pub mod schedule;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use event::{EventBus, JobEvent};
pub use orchestrator::{Orchestrator, Trigger};
pub use utils::errors::{RejectReason, Result, VaultError};
