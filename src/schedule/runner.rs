//! Drives scheduled triggers into the orchestrator.
//!
//! Interval schedules fire one interval after startup, not immediately.
//! Time-of-day schedules poll the wall clock every 30 seconds and fire each
//! listed entry at most once per matching minute.

use crate::orchestrator::{Orchestrator, Trigger};
use crate::schedule::interval::ScheduleSpec;
use crate::utils::errors::VaultError;
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const CLOCK_POLL: Duration = Duration::from_secs(30);

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    spec: ScheduleSpec,
    no_repeat: bool,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        spec: ScheduleSpec,
        no_repeat: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            spec,
            no_repeat,
            cancel,
        }
    }

    /// Run until cancelled (or, for a one-shot schedule, until it has fired).
    pub async fn run(self) {
        match &self.spec {
            ScheduleSpec::Disabled => {
                info!("Automatic backups are disabled");
            }
            ScheduleSpec::Interval { minutes } => {
                let period = Duration::from_secs(u64::from(*minutes) * 60);
                if self.no_repeat {
                    self.run_once(period).await;
                } else {
                    self.run_interval(period).await;
                }
            }
            ScheduleSpec::TimesOfDay { times } => {
                self.run_times_of_day(times.clone()).await;
            }
        }
    }

    async fn run_once(&self, period: Duration) {
        info!(?period, "One-shot backup scheduled");
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(period) => self.fire().await,
        }
    }

    async fn run_interval(&self, period: Duration) {
        info!(?period, "Interval backups scheduled");
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately; the schedule starts one
        // full interval from now.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.fire().await,
            }
        }
    }

    async fn run_times_of_day(&self, times: Vec<String>) {
        info!(?times, "Time-of-day backups scheduled");
        let mut last_minute = String::new();
        loop {
            let now = Local::now().format("%H:%M").to_string();
            let due = due_on_poll(&times, &now, &last_minute);
            last_minute = now;
            for _ in 0..due {
                self.fire().await;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(CLOCK_POLL) => {}
            }
        }
    }

    async fn fire(&self) {
        match self.orchestrator.trigger(Trigger::Scheduled).await {
            Ok(job) => info!(job = %job, "Scheduled backup completed"),
            Err(VaultError::Rejected(reason)) => {
                debug!(%reason, "Scheduled backup rejected")
            }
            Err(e) => error!(error = %e, "Scheduled backup failed"),
        }
    }
}

/// How many schedule entries are due on this poll. `last_minute` is the
/// minute seen on the previous poll: within one minute only the first poll
/// fires, while the same entry becomes due again on every later day.
/// Duplicate entries fire once each.
fn due_on_poll(times: &[String], now: &str, last_minute: &str) -> usize {
    if now == last_minute {
        return 0;
    }
    times.iter().filter(|t| t.as_str() == now).count()
}
