//! Schedule interpretation and trigger drivers.

pub mod interval;
pub mod runner;

pub use interval::{parse_interval, ScheduleSpec};
pub use runner::Scheduler;
