//! Backup orchestration: admission, single-flight execution and the
//! stage/retain/finish pipeline for one job at a time.

use crate::archive::ArchiveStager;
use crate::config::Config;
use crate::event::{EventBus, JobEvent};
use crate::host::{Capability, LiveData, Notifier};
use crate::job::{compose, job_name, BackupJob, ComposedRun, JobPhase};
use crate::retention::{evict, RetentionPolicy};
use crate::utils::errors::{RejectReason, Result, VaultError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where a trigger came from. Manual triggers skip population checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Manual,
}

struct DeferredTrigger {
    /// Generation counter; the firing task only clears the slot it owns.
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Orchestrator {
    config: Arc<Config>,
    live: Arc<dyn LiveData>,
    notifier: Arc<dyn Notifier>,
    events: EventBus,
    policy: RetentionPolicy,
    in_progress: AtomicBool,
    enabled: AtomicBool,
    last_backup: AtomicBool,
    deferred: Mutex<Option<DeferredTrigger>>,
    deferred_seq: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        live: Arc<dyn LiveData>,
        notifier: Arc<dyn Notifier>,
        events: EventBus,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            config,
            live,
            notifier,
            events,
            policy,
            in_progress: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            last_backup: AtomicBool::new(false),
            deferred: Mutex::new(None),
            deferred_seq: AtomicU64::new(0),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_backup_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_backup_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "Backup engine toggled");
    }

    /// Whether a one-shot backup is owed after the server went idle.
    pub fn last_backup_pending(&self) -> bool {
        self.last_backup.load(Ordering::SeqCst)
    }

    pub fn set_last_backup_flag(&self, pending: bool) {
        self.last_backup.store(pending, Ordering::SeqCst);
    }

    pub async fn trigger_manual_backup(self: &Arc<Self>) -> Result<String> {
        self.trigger(Trigger::Manual).await
    }

    /// Run one backup if admission passes. Returns the job id; a rejection
    /// is an expected outcome surfaced as [`VaultError::Rejected`].
    pub async fn trigger(self: &Arc<Self>, source: Trigger) -> Result<String> {
        if !self.is_backup_enabled() {
            return Err(VaultError::Rejected(RejectReason::Disabled));
        }

        // Single flight: whoever flips the flag owns the run; everyone else
        // is turned away, including during admission checks.
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VaultError::Rejected(RejectReason::AlreadyRunning));
        }

        let result = self.run_guarded(source).await;
        self.in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn run_guarded(self: &Arc<Self>, source: Trigger) -> Result<String> {
        if let Err(reason) = self.admit(source) {
            debug!(%reason, "Backup trigger rejected");
            if self.config.schedule.always_flush {
                if let Err(e) = self.live.flush_all() {
                    warn!(error = %e, "Flush on rejected trigger failed");
                }
            }
            return Err(VaultError::Rejected(reason));
        }

        let run = compose(&self.config, self.live.as_ref());
        let mut job = BackupJob::new(job_name(&self.config.backup.date_format), run.kinds.clone());
        info!(job = %job.id, ?source, kinds = ?job.kinds, "Backup admitted");

        job.advance(JobPhase::Preparing);
        self.notify(&self.config.notify.started_message);
        if let Err(e) = self.prepare_live_state() {
            self.finish_failed(&mut job, &format!("failed to quiesce live state: {e}"));
            return Err(VaultError::Io(e));
        }
        self.events.publish(JobEvent::Started {
            job_id: job.id.clone(),
        });

        job.advance(JobPhase::Staging);
        let (artifacts, stage_errors) = self.stage(&run, &job.id).await;

        job.advance(JobPhase::Retaining);
        self.retain(&run).await;

        job.advance(JobPhase::Finishing);
        self.restore_live_state();
        self.notify(&self.config.notify.finished_message);

        if stage_errors == 0 {
            self.events.publish(JobEvent::Finished {
                job_id: job.id.clone(),
                artifacts,
            });
            job.advance(JobPhase::Done);
        } else {
            self.events.publish(JobEvent::Failed {
                job_id: job.id.clone(),
                reason: format!("{stage_errors} source(s) failed to stage"),
            });
            job.advance(JobPhase::Failed);
        }
        Ok(job.id)
    }

    /// Admission policy. Manual triggers always pass and consume any pending
    /// last-backup flag. Scheduled triggers need either a populated server
    /// with at least one non-bypass user, the empty-server override, or the
    /// one-shot last-backup flag.
    fn admit(&self, source: Trigger) -> std::result::Result<(), RejectReason> {
        if source == Trigger::Manual {
            self.last_backup.store(false, Ordering::SeqCst);
            return Ok(());
        }
        if self.config.schedule.backup_empty_server {
            return Ok(());
        }

        let users = self.live.online_users();
        if users.is_empty() {
            if self.last_backup.swap(false, Ordering::SeqCst) {
                return Ok(());
            }
            return Err(RejectReason::ServerEmpty);
        }

        if users
            .iter()
            .any(|u| !self.live.user_has_capability(u, Capability::BypassBackup))
        {
            Ok(())
        } else {
            Err(RejectReason::AllUsersBypass)
        }
    }

    fn prepare_live_state(&self) -> std::io::Result<()> {
        self.live.flush_all()?;
        if let Err(e) = self.live.set_autosave(false) {
            // Leave the host the way we found it before bailing out.
            if let Err(restore) = self.live.set_autosave(true) {
                warn!(error = %restore, "Failed to restore autosave after error");
            }
            return Err(e);
        }
        Ok(())
    }

    fn restore_live_state(&self) {
        if self.config.notify.enable_autosave_after {
            if let Err(e) = self.live.set_autosave(true) {
                warn!(error = %e, "Failed to re-enable autosave");
            }
        }
    }

    /// Copy and promote every source. Per-source failures are logged and
    /// counted; the remaining sources still run. A panicking worker counts
    /// as one failure so the job still reaches its later phases.
    async fn stage(&self, run: &ComposedRun, job_id: &str) -> (Vec<PathBuf>, usize) {
        let config = Arc::clone(&self.config);
        let run = clone_run(run);
        let job_id = job_id.to_string();

        let staged = tokio::task::spawn_blocking(move || {
            let stager = ArchiveStager::from_config(&config);
            let mut artifacts = Vec::new();
            let mut errors = 0usize;

            if !run.combined.is_empty() {
                match stager.stage_combined(&run.combined, &job_id) {
                    Ok(path) => artifacts.push(path),
                    Err(e) => {
                        error!(job = %job_id, error = %e, "Combined staging failed");
                        errors += 1;
                    }
                }
            }
            for (unit, source) in &run.split {
                match stager.stage_split(unit, source, &job_id) {
                    Ok(path) => artifacts.push(path),
                    Err(e) => {
                        error!(job = %job_id, unit = %unit.display(), error = %e, "Split staging failed");
                        errors += 1;
                    }
                }
            }
            (artifacts, errors)
        })
        .await;

        match staged {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Staging task aborted");
                (Vec::new(), 1)
            }
        }
    }

    /// Evict old artifacts. In split mode each unit subdirectory is its own
    /// store; otherwise the store root is evicted with the staging area
    /// exempted. Eviction problems never fail the job.
    async fn retain(&self, run: &ComposedRun) {
        let config = Arc::clone(&self.config);
        let policy = self.policy;
        let units: Vec<PathBuf> = run.split.iter().map(|(u, _)| u.clone()).collect();
        let split = !units.is_empty();

        let result = tokio::task::spawn_blocking(move || {
            let store = config.backup.path.clone();
            let staging = config.staging_root();
            if split {
                for unit in units {
                    let unit_store = store.join(&unit);
                    if let Err(e) = evict(&unit_store, policy, &[]) {
                        warn!(store = %unit_store.display(), error = %e, "Eviction failed");
                    }
                }
            } else if let Err(e) = evict(&store, policy, &[&staging]) {
                warn!(store = %store.display(), error = %e, "Eviction failed");
            }

            if config.backup.use_staging {
                ArchiveStager::from_config(&config).remove_staging_root();
            }
        })
        .await;

        if let Err(e) = result {
            error!(error = %e, "Retention task aborted");
        }
    }

    /// Send a notification template. `;;` separates lines; an empty template
    /// disables the message entirely.
    fn notify(&self, template: &str) {
        if template.is_empty() {
            return;
        }
        for line in template.split(";;") {
            info!("{line}");
            if self.config.notify.notify_all_users {
                self.notifier.broadcast(line);
            } else {
                self.notifier
                    .send_to_capable(Capability::ReceiveNotifications, line);
            }
        }
    }

    fn finish_failed(&self, job: &mut BackupJob, reason: &str) {
        error!(job = %job.id, reason, "Backup job failed");
        self.restore_live_state();
        self.events.publish(JobEvent::Failed {
            job_id: job.id.clone(),
            reason: reason.to_string(),
        });
        job.advance(JobPhase::Failed);
    }

    /// React to the online population changing. Dropping to zero arms one
    /// deferred backup after a grace period; anyone joining disarms it.
    pub async fn handle_population_change(self: &Arc<Self>, online: usize) {
        let mut slot = self.deferred.lock().await;
        if let Some(pending) = slot.take() {
            pending.cancel.cancel();
            pending.handle.abort();
        }

        if online > 0 {
            if self.last_backup.swap(false, Ordering::SeqCst) {
                debug!("User joined, deferred backup cancelled");
            }
            return;
        }
        if self.config.schedule.backup_empty_server {
            // Regular schedule already covers the idle server.
            return;
        }

        self.last_backup.store(true, Ordering::SeqCst);
        let grace = std::time::Duration::from_secs(self.config.schedule.last_backup_grace_minutes * 60);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let id = self.deferred_seq.fetch_add(1, Ordering::SeqCst);
        let this = Arc::clone(self);
        info!(grace_minutes = self.config.schedule.last_backup_grace_minutes, "Server empty, deferring one last backup");

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(grace) => {
                    match this.trigger(Trigger::Scheduled).await {
                        Ok(job) => info!(job = %job, "Deferred last backup completed"),
                        Err(VaultError::Rejected(reason)) => {
                            debug!(%reason, "Deferred last backup rejected")
                        }
                        Err(e) => error!(error = %e, "Deferred last backup failed"),
                    }
                    let mut slot = this.deferred.lock().await;
                    if slot.as_ref().is_some_and(|d| d.id == id) {
                        *slot = None;
                    }
                }
            }
        });
        *slot = Some(DeferredTrigger { id, cancel, handle });
    }
}

fn clone_run(run: &ComposedRun) -> ComposedRun {
    ComposedRun {
        combined: run.combined.clone(),
        split: run.split.clone(),
        kinds: run.kinds.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::WorldInfo;
    use crate::retention::parse_limit;
    use std::collections::HashSet;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeServer {
        users: StdMutex<Vec<String>>,
        bypass: StdMutex<HashSet<String>>,
        worlds: StdMutex<Vec<WorldInfo>>,
        flushes: AtomicUsize,
        autosave: AtomicBool,
        messages: StdMutex<Vec<String>>,
    }

    impl LiveData for FakeServer {
        fn flush_all(&self) -> std::io::Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn set_autosave(&self, enabled: bool) -> std::io::Result<()> {
            self.autosave.store(enabled, Ordering::SeqCst);
            Ok(())
        }
        fn online_users(&self) -> Vec<String> {
            self.users.lock().unwrap().clone()
        }
        fn user_has_capability(&self, user: &str, capability: Capability) -> bool {
            capability == Capability::BypassBackup && self.bypass.lock().unwrap().contains(user)
        }
        fn worlds(&self) -> Vec<WorldInfo> {
            self.worlds.lock().unwrap().clone()
        }
    }

    impl Notifier for FakeServer {
        fn broadcast(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
        fn send_to_capable(&self, _capability: Capability, message: &str) {
            self.messages.lock().unwrap().push(format!("capable:{message}"));
        }
    }

    struct Fixture {
        orchestrator: Arc<Orchestrator>,
        server: Arc<FakeServer>,
        store: PathBuf,
        _root: TempDir,
    }

    fn fixture(mutate: impl FnOnce(&mut Config)) -> Fixture {
        let root = TempDir::new().unwrap();
        let server_root = root.path().join("server");
        fs::create_dir_all(server_root.join("world/region")).unwrap();
        fs::write(server_root.join("world/level.dat"), b"level").unwrap();
        fs::write(server_root.join("world/region/r.0.0.mca"), b"chunk").unwrap();
        fs::create_dir_all(server_root.join("plugins/Essentials")).unwrap();
        fs::write(server_root.join("plugins/Essentials/config.yml"), b"cfg").unwrap();

        let mut config = Config::default();
        config.server.root = server_root;
        config.backup.path = root.path().join("backups");
        config.schedule.last_backup_grace_minutes = 0;
        mutate(&mut config);

        let server = Arc::new(FakeServer::default());
        server.worlds.lock().unwrap().push(WorldInfo {
            name: "world".to_string(),
            seed: Some(42),
        });

        let store = config.backup.path.clone();
        let policy = parse_limit(&config.retention.max_backups, "-1").0;
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(config),
            Arc::clone(&server) as Arc<dyn LiveData>,
            Arc::clone(&server) as Arc<dyn Notifier>,
            EventBus::new(),
            policy,
        ));
        Fixture {
            orchestrator,
            server,
            store,
            _root: root,
        }
    }

    fn join(server: &FakeServer, user: &str) {
        server.users.lock().unwrap().push(user.to_string());
    }

    #[tokio::test]
    async fn manual_trigger_produces_an_artifact_and_events() {
        let fx = fixture(|_| {});
        let mut rx = fx.orchestrator.events().subscribe();

        let job = fx.orchestrator.trigger_manual_backup().await.unwrap();

        let artifact = fx.store.join(format!("{job}.zip"));
        assert!(artifact.is_file());
        let mut archive = zip::ZipArchive::new(fs::File::open(&artifact).unwrap()).unwrap();
        assert!(archive.by_name("world/level.dat").is_ok());
        assert!(archive.by_name("world/worldSeed.txt").is_ok());
        assert!(archive.by_name("plugins/Essentials/config.yml").is_ok());

        assert!(matches!(rx.try_recv().unwrap(), JobEvent::Started { .. }));
        match rx.try_recv().unwrap() {
            JobEvent::Finished { artifacts, .. } => assert_eq!(artifacts, vec![artifact]),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(fx.server.flushes.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn scheduled_trigger_on_an_empty_server_is_rejected() {
        let fx = fixture(|_| {});
        let result = fx.orchestrator.trigger(Trigger::Scheduled).await;
        assert!(matches!(
            result,
            Err(VaultError::Rejected(RejectReason::ServerEmpty))
        ));
        assert!(!fx.store.exists() || fs::read_dir(&fx.store).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn empty_server_override_admits_scheduled_triggers() {
        let fx = fixture(|c| c.schedule.backup_empty_server = true);
        assert!(fx.orchestrator.trigger(Trigger::Scheduled).await.is_ok());
    }

    #[tokio::test]
    async fn last_backup_flag_admits_exactly_one_empty_server_run() {
        let fx = fixture(|_| {});
        fx.orchestrator.set_last_backup_flag(true);

        assert!(fx.orchestrator.trigger(Trigger::Scheduled).await.is_ok());
        assert!(!fx.orchestrator.last_backup_pending());
        assert!(matches!(
            fx.orchestrator.trigger(Trigger::Scheduled).await,
            Err(VaultError::Rejected(RejectReason::ServerEmpty))
        ));
    }

    #[tokio::test]
    async fn all_bypass_users_reject_a_scheduled_trigger() {
        let fx = fixture(|_| {});
        join(&fx.server, "admin");
        fx.server.bypass.lock().unwrap().insert("admin".to_string());

        assert!(matches!(
            fx.orchestrator.trigger(Trigger::Scheduled).await,
            Err(VaultError::Rejected(RejectReason::AllUsersBypass))
        ));

        join(&fx.server, "player");
        assert!(fx.orchestrator.trigger(Trigger::Scheduled).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_trigger_is_turned_away() {
        let fx = fixture(|_| {});
        fx.orchestrator.in_progress.store(true, Ordering::SeqCst);

        assert!(matches!(
            fx.orchestrator.trigger_manual_backup().await,
            Err(VaultError::Rejected(RejectReason::AlreadyRunning))
        ));

        fx.orchestrator.in_progress.store(false, Ordering::SeqCst);
        assert!(fx.orchestrator.trigger_manual_backup().await.is_ok());
    }

    #[tokio::test]
    async fn disabled_engine_rejects_everything() {
        let fx = fixture(|_| {});
        fx.orchestrator.set_backup_enabled(false);
        assert!(matches!(
            fx.orchestrator.trigger_manual_backup().await,
            Err(VaultError::Rejected(RejectReason::Disabled))
        ));
    }

    #[tokio::test]
    async fn always_flush_flushes_even_on_rejection() {
        let fx = fixture(|c| c.schedule.always_flush = true);
        let _ = fx.orchestrator.trigger(Trigger::Scheduled).await;
        assert_eq!(fx.server.flushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn notification_templates_split_on_the_line_separator() {
        let fx = fixture(|c| {
            c.notify.started_message = "Backup starting;;Expect lag".to_string();
            c.notify.finished_message = String::new();
        });
        fx.orchestrator.trigger_manual_backup().await.unwrap();

        let messages = fx.server.messages.lock().unwrap().clone();
        assert_eq!(messages, vec!["Backup starting", "Expect lag"]);
    }

    #[tokio::test]
    async fn capability_gated_notifications_use_the_narrow_channel() {
        let fx = fixture(|c| {
            c.notify.notify_all_users = false;
            c.notify.started_message = "hi".to_string();
            c.notify.finished_message = String::new();
        });
        fx.orchestrator.trigger_manual_backup().await.unwrap();
        let messages = fx.server.messages.lock().unwrap().clone();
        assert_eq!(messages, vec!["capable:hi"]);
    }

    #[tokio::test]
    async fn split_mode_promotes_each_unit_into_its_own_store() {
        let fx = fixture(|c| c.backup.split_backup = true);
        let job = fx.orchestrator.trigger_manual_backup().await.unwrap();

        assert!(fx.store.join(format!("world/{job}.zip")).is_file());
        assert!(fx.store.join(format!("plugins/{job}.zip")).is_file());
    }

    #[tokio::test]
    async fn retention_prunes_old_artifacts_after_staging() {
        let fx = fixture(|c| c.retention.max_backups = "1".to_string());
        // Policy was parsed from the mutated config inside fixture().
        fs::create_dir_all(&fx.store).unwrap();
        let stale = fx.store.join("ancient.zip");
        fs::write(&stale, b"old").unwrap();
        fs::File::open(&stale)
            .unwrap()
            .set_modified(std::time::SystemTime::UNIX_EPOCH)
            .unwrap();

        fx.orchestrator.trigger_manual_backup().await.unwrap();

        assert!(!stale.exists());
        let artifacts: Vec<_> = fs::read_dir(&fx.store)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(artifacts.len(), 1);
    }

    #[tokio::test]
    async fn population_drop_arms_a_deferred_backup() {
        let fx = fixture(|_| {});
        let mut rx = fx.orchestrator.events().subscribe();

        fx.orchestrator.handle_population_change(0).await;
        assert!(fx.orchestrator.last_backup_pending());

        // Zero-minute grace: the deferred trigger fires immediately.
        let event = tokio::time::timeout(std::time::Duration::from_secs(10), rx.recv())
            .await
            .expect("deferred backup never started")
            .unwrap();
        assert!(matches!(event, JobEvent::Started { .. }));
    }

    #[tokio::test]
    async fn user_joining_cancels_the_deferred_backup() {
        let fx = fixture(|c| c.schedule.last_backup_grace_minutes = 60);

        fx.orchestrator.handle_population_change(0).await;
        assert!(fx.orchestrator.last_backup_pending());
        assert!(fx.orchestrator.deferred.lock().await.is_some());

        join(&fx.server, "player");
        fx.orchestrator.handle_population_change(1).await;

        assert!(!fx.orchestrator.last_backup_pending());
        assert!(fx.orchestrator.deferred.lock().await.is_none());
    }

    #[tokio::test]
    async fn failed_staging_still_finishes_and_restores_the_host() {
        let fx = fixture(|_| {});
        // A world the host reports but that is missing on disk fails staging.
        fx.server.worlds.lock().unwrap().push(WorldInfo {
            name: "ghost".to_string(),
            seed: None,
        });
        let mut rx = fx.orchestrator.events().subscribe();

        let job = fx.orchestrator.trigger_manual_backup().await.unwrap();

        assert!(matches!(rx.try_recv().unwrap(), JobEvent::Started { .. }));
        match rx.try_recv().unwrap() {
            JobEvent::Failed { job_id, .. } => assert_eq!(job_id, job),
            other => panic!("unexpected event: {other:?}"),
        }
        // Finishing still ran: autosave back on, finished message sent,
        // single flight released.
        assert!(fx.server.autosave.load(Ordering::SeqCst));
        let messages = fx.server.messages.lock().unwrap().clone();
        assert!(messages.contains(&"Backup finished.".to_string()));
        assert!(fx.orchestrator.trigger_manual_backup().await.is_ok());
    }

    #[tokio::test]
    async fn completed_deferred_trigger_clears_its_slot() {
        let fx = fixture(|_| {});
        let mut rx = fx.orchestrator.events().subscribe();

        fx.orchestrator.handle_population_change(0).await;
        assert!(fx.orchestrator.deferred.lock().await.is_some());

        // Zero-minute grace: wait for the deferred job to run to completion.
        loop {
            let event = tokio::time::timeout(std::time::Duration::from_secs(10), rx.recv())
                .await
                .expect("deferred backup never ran")
                .unwrap();
            if matches!(event, JobEvent::Finished { .. } | JobEvent::Failed { .. }) {
                break;
            }
        }

        tokio::time::timeout(std::time::Duration::from_secs(10), async {
            while fx.orchestrator.deferred.lock().await.is_some() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("deferred slot was never cleared");
    }

    #[tokio::test]
    async fn empty_server_override_skips_deferral() {
        let fx = fixture(|c| c.schedule.backup_empty_server = true);
        fx.orchestrator.handle_population_change(0).await;
        assert!(!fx.orchestrator.last_backup_pending());
        assert!(fx.orchestrator.deferred.lock().await.is_none());
    }
}
