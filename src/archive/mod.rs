//! Staging, filtering, copying and archiving of backup sources.

pub mod copy;
pub mod filter;
pub mod stager;
pub mod zipper;

pub use filter::CopyFilter;
pub use stager::{ArchiveStager, StageSource};
