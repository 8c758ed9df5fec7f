//! The stage -> promote pipeline.
//!
//! Sources are copied out of the live tree into a per-job staging area, then
//! promoted into the final store as a zip archive or a plain directory.
//! Promotion writes under a `.part` name and renames on success, so an
//! observer polling the store never sees a half-written artifact under its
//! final name. A failed promotion keeps the staged copy.

use crate::archive::copy::copy_tree;
use crate::archive::filter::CopyFilter;
use crate::archive::zipper::zip_tree;
use crate::config::Config;
use crate::utils::errors::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One directory tree to pull into a backup.
#[derive(Debug, Clone)]
pub struct StageSource {
    /// Live directory to copy from.
    pub path: PathBuf,
    /// Where the tree lands inside the job, relative to the job root
    /// ("." mounts at the root itself).
    pub mount: PathBuf,
    pub filter: CopyFilter,
    /// Extra files written into the job tree: (path relative to the job
    /// root, contents).
    pub sidecars: Vec<(PathBuf, String)>,
}

pub struct ArchiveStager {
    store_root: PathBuf,
    staging_root: PathBuf,
    use_staging: bool,
    compress: bool,
}

impl ArchiveStager {
    pub fn new(store_root: PathBuf, staging_root: PathBuf, use_staging: bool, compress: bool) -> Self {
        Self {
            store_root,
            staging_root,
            use_staging,
            compress,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.backup.path.clone(),
            config.staging_root(),
            config.backup.use_staging,
            config.backup.zip_archives,
        )
    }

    pub fn store_root(&self) -> &Path {
        &self.store_root
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Stage all sources under one job name and promote a single combined
    /// artifact. Returns the final artifact path.
    pub fn stage_combined(&self, sources: &[StageSource], job_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.store_root)?;
        let work_dir = if self.use_staging {
            self.staging_root.join(job_name)
        } else {
            self.store_root.join(job_name)
        };

        for source in sources {
            self.stage_into(&work_dir, source)?;
        }

        self.promote(&work_dir, &self.store_root, job_name)
    }

    /// Stage one source and promote it independently under its own unit
    /// subdirectory of the store: `<store>/<unit>/<job>[.zip]`.
    pub fn stage_split(&self, unit: &Path, source: &StageSource, job_name: &str) -> Result<PathBuf> {
        let unit_store = self.store_root.join(unit);
        fs::create_dir_all(&unit_store)?;
        let work_dir = if self.use_staging {
            self.staging_root.join(unit).join(job_name)
        } else {
            unit_store.join(job_name)
        };

        self.stage_into(&work_dir, source)?;
        self.promote(&work_dir, &unit_store, job_name)
    }

    /// Best-effort removal of the whole staging area.
    pub fn remove_staging_root(&self) {
        if !self.use_staging || !self.staging_root.exists() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.staging_root) {
            warn!(path = %self.staging_root.display(), error = %e, "Failed to remove staging area");
        }
    }

    fn stage_into(&self, work_dir: &Path, source: &StageSource) -> Result<()> {
        let dest = if source.mount == Path::new(".") || source.mount.as_os_str().is_empty() {
            work_dir.to_path_buf()
        } else {
            work_dir.join(&source.mount)
        };
        debug!(
            source = %source.path.display(),
            dest = %dest.display(),
            "Staging source tree"
        );
        copy_tree(&source.path, &dest, &source.filter)?;

        for (relative, contents) in &source.sidecars {
            let sidecar = work_dir.join(relative);
            if let Some(parent) = sidecar.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&sidecar, contents)?;
        }
        Ok(())
    }

    fn promote(&self, work_dir: &Path, final_parent: &Path, job_name: &str) -> Result<PathBuf> {
        if self.compress {
            let final_path = final_parent.join(format!("{job_name}.zip"));
            let part = final_parent.join(format!("{job_name}.zip.part"));
            if let Err(e) = zip_tree(work_dir, &part) {
                let _ = fs::remove_file(&part);
                return Err(e);
            }
            fs::rename(&part, &final_path)?;
            self.discard(work_dir);
            debug!(artifact = %final_path.display(), "Promoted zip artifact");
            return Ok(final_path);
        }

        if self.use_staging {
            let final_path = final_parent.join(job_name);
            let part = final_parent.join(format!("{job_name}.part"));
            if let Err(e) = copy_tree(work_dir, &part, &CopyFilter::Everything) {
                let _ = fs::remove_dir_all(&part);
                return Err(e.into());
            }
            fs::rename(&part, &final_path)?;
            self.discard(work_dir);
            debug!(artifact = %final_path.display(), "Promoted directory artifact");
            return Ok(final_path);
        }

        // Staging disabled, no compression: the sources were written straight
        // to their final destination.
        Ok(work_dir.to_path_buf())
    }

    fn discard(&self, work_dir: &Path) {
        if let Err(e) = fs::remove_dir_all(work_dir) {
            warn!(path = %work_dir.display(), error = %e, "Failed to remove staged copy");
        }
    }
}
