//! Retention policy parsing and artifact eviction.

pub mod engine;
pub mod policy;

pub use engine::{evict, BackupArtifact};
pub use policy::{parse_limit, RetentionPolicy};
