//! Trait seams toward the host game server.
//!
//! The engine never talks to the server process directly: live-state control,
//! population queries and user messaging all go through these traits. The
//! daemon binary wires in [`StandaloneHost`]; an embedding plugin layer
//! provides its own implementations.

use std::path::{Path, PathBuf};
use tracing::info;

/// Per-user permissions the engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// This user's presence does not count toward backup admission.
    BypassBackup,
    /// This user receives backup notifications when broadcasts are capability-gated.
    ReceiveNotifications,
}

#[derive(Debug, Clone)]
pub struct WorldInfo {
    pub name: String,
    /// Generation seed, when the host knows it.
    pub seed: Option<i64>,
}

/// The live, actively-mutated server state.
pub trait LiveData: Send + Sync {
    /// Persist all mutable state (players, worlds) to disk.
    fn flush_all(&self) -> std::io::Result<()>;

    /// Toggle the host's periodic autosave. Disabled during the copy so the
    /// engine observes a quiescent tree.
    fn set_autosave(&self, enabled: bool) -> std::io::Result<()>;

    fn online_users(&self) -> Vec<String>;

    fn user_has_capability(&self, user: &str, capability: Capability) -> bool;

    fn worlds(&self) -> Vec<WorldInfo>;
}

/// Best-effort user messaging. Failures here never abort a backup, so these
/// methods are infallible by contract.
pub trait Notifier: Send + Sync {
    /// Message every connected user.
    fn broadcast(&self, message: &str);

    /// Message only users holding the given capability.
    fn send_to_capable(&self, capability: Capability, message: &str);
}

/// Host adapter for running the daemon against a server tree without an
/// embedded plugin runtime: no users are ever online, flush and autosave are
/// no-ops, and worlds are the directories found in the world container.
pub struct StandaloneHost {
    world_container: PathBuf,
}

impl StandaloneHost {
    pub fn new(server_root: &Path, world_container: &Path) -> Self {
        let world_container = if world_container == Path::new(".") {
            server_root.to_path_buf()
        } else {
            server_root.join(world_container)
        };
        Self { world_container }
    }
}

impl LiveData for StandaloneHost {
    fn flush_all(&self) -> std::io::Result<()> {
        Ok(())
    }

    fn set_autosave(&self, _enabled: bool) -> std::io::Result<()> {
        Ok(())
    }

    fn online_users(&self) -> Vec<String> {
        Vec::new()
    }

    fn user_has_capability(&self, _user: &str, _capability: Capability) -> bool {
        false
    }

    fn worlds(&self) -> Vec<WorldInfo> {
        let Ok(entries) = std::fs::read_dir(&self.world_container) else {
            return Vec::new();
        };
        let mut worlds: Vec<WorldInfo> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .map(|name| WorldInfo { name, seed: None })
            .collect();
        worlds.sort_by(|a, b| a.name.cmp(&b.name));
        worlds
    }
}

impl Notifier for StandaloneHost {
    fn broadcast(&self, message: &str) {
        info!("[notify] {message}");
    }

    fn send_to_capable(&self, _capability: Capability, message: &str) {
        info!("[notify] {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn standalone_host_discovers_world_directories() -> std::io::Result<()> {
        let root = TempDir::new()?;
        fs::create_dir(root.path().join("world"))?;
        fs::create_dir(root.path().join("world_nether"))?;
        fs::write(root.path().join("server.log"), b"log")?;

        let host = StandaloneHost::new(root.path(), Path::new("."));
        let worlds = host.worlds();
        let names: Vec<&str> = worlds.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["world", "world_nether"]);
        assert!(worlds.iter().all(|w| w.seed.is_none()));

        Ok(())
    }

    #[test]
    fn standalone_host_is_always_empty() {
        let host = StandaloneHost::new(Path::new("/nonexistent"), Path::new("."));
        assert!(host.online_users().is_empty());
        assert!(host.worlds().is_empty());
        assert!(!host.user_has_capability("anyone", Capability::BypassBackup));
    }
}
