//! Artifact eviction.
//!
//! Deletes the oldest artifacts in a store directory until it satisfies the
//! retention policy. Deletion failures are logged per artifact and never
//! abort the remaining loop; the stopping condition is always re-evaluated
//! against what is actually still on disk.

use crate::retention::policy::RetentionPolicy;
use crate::utils::errors::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One retained backup unit in the final store: a zip file or a backup
/// directory.
#[derive(Debug, Clone)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size_bytes: u64,
}

/// Delete old artifacts in `store_dir` until the policy is satisfied.
/// Returns the artifacts actually deleted. Paths in `excluded` (and `.part`
/// leftovers from interrupted promotions) are never counted or touched.
pub fn evict(
    store_dir: &Path,
    policy: RetentionPolicy,
    excluded: &[&Path],
) -> Result<Vec<BackupArtifact>> {
    match policy {
        RetentionPolicy::Disabled => Ok(Vec::new()),
        RetentionPolicy::ByCount { limit } => evict_by_count(store_dir, limit, excluded),
        RetentionPolicy::BySize { limit_bytes } => evict_by_size(store_dir, limit_bytes, excluded),
    }
}

/// Keep the `limit` newest artifacts by modification time, delete the rest.
/// Ties break by directory-scan order; that order is unspecified.
fn evict_by_count(store_dir: &Path, limit: u64, excluded: &[&Path]) -> Result<Vec<BackupArtifact>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut artifacts = list_artifacts(store_dir, excluded)?;
    if artifacts.len() as u64 <= limit {
        return Ok(Vec::new());
    }

    artifacts.sort_by(|a, b| b.modified.cmp(&a.modified));
    let victims = artifacts.split_off(limit as usize);

    let mut deleted = Vec::new();
    for artifact in victims {
        match delete_artifact(&artifact.path) {
            Ok(()) => {
                debug!(path = %artifact.path.display(), "Evicted artifact over count limit");
                deleted.push(artifact);
            }
            Err(e) => {
                warn!(path = %artifact.path.display(), error = %e, "Failed to evict artifact");
            }
        }
    }
    if !deleted.is_empty() {
        info!(count = deleted.len(), limit, "Removed backups over the count limit");
    }
    Ok(deleted)
}

/// Delete oldest-first while the store's total recursive size exceeds the
/// limit, or until no artifacts remain.
fn evict_by_size(store_dir: &Path, limit_bytes: u64, excluded: &[&Path]) -> Result<Vec<BackupArtifact>> {
    let mut artifacts = list_artifacts(store_dir, excluded)?;
    artifacts.sort_by(|a, b| a.modified.cmp(&b.modified));

    let mut total: u64 = artifacts.iter().map(|a| a.size_bytes).sum();
    let mut deleted = Vec::new();

    for artifact in artifacts {
        if total <= limit_bytes {
            break;
        }
        match delete_artifact(&artifact.path) {
            Ok(()) => {
                total = total.saturating_sub(artifact.size_bytes);
                debug!(path = %artifact.path.display(), "Evicted artifact over size limit");
                deleted.push(artifact);
            }
            Err(e) => {
                warn!(path = %artifact.path.display(), error = %e, "Failed to evict artifact");
                // A partial deletion may have freed some of it; count what is
                // actually left rather than assuming.
                let remaining = tree_size(&artifact.path);
                total = total.saturating_sub(artifact.size_bytes) + remaining;
            }
        }
    }
    if !deleted.is_empty() {
        info!(count = deleted.len(), limit_bytes, "Removed backups over the size limit");
    }
    Ok(deleted)
}

/// Non-recursive listing of the store: every file and directory is one
/// artifact.
fn list_artifacts(store_dir: &Path, excluded: &[&Path]) -> Result<Vec<BackupArtifact>> {
    if !store_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut artifacts = Vec::new();
    for entry in fs::read_dir(store_dir)? {
        let entry = entry?;
        let path = entry.path();
        if excluded.iter().any(|e| *e == path) {
            continue;
        }
        if path
            .extension()
            .is_some_and(|ext| ext == "part")
        {
            continue;
        }

        let metadata = entry.metadata()?;
        let size_bytes = if metadata.is_dir() {
            tree_size(&path)
        } else {
            metadata.len()
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        artifacts.push(BackupArtifact {
            path,
            modified,
            size_bytes,
        });
    }
    Ok(artifacts)
}

fn delete_artifact(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Total recursive size of a path; unreadable entries count as zero.
fn tree_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
