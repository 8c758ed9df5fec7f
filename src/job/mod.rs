//! Backup job identity and lifecycle.

pub mod composer;

pub use composer::{compose, ComposedRun};

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use tracing::{info, warn};

const FALLBACK_DATE_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// What a job backs up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Worlds,
    Plugins,
    Everything,
}

/// Lifecycle states of one backup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Admitted,
    Preparing,
    Staging,
    Retaining,
    Finishing,
    Done,
    Failed,
}

#[derive(Debug)]
pub struct BackupJob {
    pub id: String,
    pub kinds: Vec<JobKind>,
    pub started_at: chrono::DateTime<Local>,
    pub phase: JobPhase,
}

impl BackupJob {
    pub fn new(id: String, kinds: Vec<JobKind>) -> Self {
        Self {
            id,
            kinds,
            started_at: Local::now(),
            phase: JobPhase::Admitted,
        }
    }

    pub fn advance(&mut self, phase: JobPhase) {
        info!(job = %self.id, ?phase, "Backup job phase change");
        self.phase = phase;
    }
}

/// Format the current local time into a job name. An unparsable format
/// string falls back to the default rather than aborting the job.
pub fn job_name(format: &str) -> String {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    let format = if format.is_empty() || items.iter().any(|i| matches!(i, Item::Error)) {
        warn!(format, "Invalid backup date format, using the default");
        FALLBACK_DATE_FORMAT
    } else {
        format
    };
    Local::now().format(format).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_name_uses_the_requested_format() {
        let name = job_name("%Y");
        assert_eq!(name.len(), 4);
        assert!(name.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn invalid_format_falls_back_to_the_default() {
        let name = job_name("%Q-nonsense");
        // Default format: 2026-08-25-13-45-07
        assert_eq!(name.len(), 19);
        assert_eq!(name.matches('-').count(), 5);
    }

    #[test]
    fn empty_format_falls_back_to_the_default() {
        assert_eq!(job_name("").len(), 19);
    }

    #[test]
    fn job_starts_admitted_and_advances() {
        let mut job = BackupJob::new("j".to_string(), vec![JobKind::Worlds]);
        assert_eq!(job.phase, JobPhase::Admitted);
        job.advance(JobPhase::Staging);
        assert_eq!(job.phase, JobPhase::Staging);
    }
}
