//! Turns configuration plus live server state into the concrete source trees
//! a job will stage.

use crate::archive::{CopyFilter, StageSource};
use crate::config::Config;
use crate::host::LiveData;
use crate::job::JobKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The staging plan for one backup run.
#[derive(Debug)]
pub struct ComposedRun {
    /// Sources merged into a single artifact.
    pub combined: Vec<StageSource>,
    /// Sources promoted independently, keyed by their unit subdirectory in
    /// the store.
    pub split: Vec<(PathBuf, StageSource)>,
    pub kinds: Vec<JobKind>,
}

impl ComposedRun {
    pub fn is_empty(&self) -> bool {
        self.combined.is_empty() && self.split.is_empty()
    }
}

/// Compose the run for the current configuration.
///
/// Whole-tree backups are always a single combined artifact; world and
/// plugin backups honor `split_backup`.
pub fn compose(config: &Config, live: &dyn LiveData) -> ComposedRun {
    if config.backup.backup_everything {
        return ComposedRun {
            combined: vec![whole_tree_source(config)],
            split: Vec::new(),
            kinds: vec![JobKind::Everything],
        };
    }

    let mut run = ComposedRun {
        combined: Vec::new(),
        split: Vec::new(),
        kinds: Vec::new(),
    };

    if config.backup.backup_worlds {
        run.kinds.push(JobKind::Worlds);
        for world in live.worlds() {
            if config.backup.ignored_worlds.contains(&world.name) {
                debug!(world = %world.name, "Skipping ignored world");
                continue;
            }
            let source = world_source(config, &world.name, world.seed, config.backup.split_backup);
            if config.backup.split_backup {
                run.split.push((world_unit(config, &world.name), source));
            } else {
                run.combined.push(source);
            }
        }
    }

    if config.backup.backup_plugins {
        run.kinds.push(JobKind::Plugins);
        let source = plugin_source(config, config.backup.split_backup);
        if config.backup.split_backup {
            run.split.push((PathBuf::from("plugins"), source));
        } else {
            run.combined.push(source);
        }
    }

    run
}

/// The entire server tree, minus the backup store, the staging area and the
/// live log. Exclusion is by name, the way the store would appear inside
/// the tree.
fn whole_tree_source(config: &Config) -> StageSource {
    let mut denied: Vec<String> = Vec::new();
    for dir in [&config.backup.path, &config.staging_root()] {
        if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
            if !denied.iter().any(|d| d == name) {
                denied.push(name.to_string());
            }
        }
    }
    denied.push(config.server.log_name.clone());

    StageSource {
        path: config.server.root.clone(),
        mount: PathBuf::from("."),
        filter: CopyFilter::DenyNames(denied),
        sidecars: Vec::new(),
    }
}

fn world_dir(config: &Config, name: &str) -> PathBuf {
    if config.server.world_container == Path::new(".") {
        config.server.root.join(name)
    } else {
        config
            .server
            .root
            .join(&config.server.world_container)
            .join(name)
    }
}

/// Unit subdirectory a split world artifact lands under.
fn world_unit(config: &Config, name: &str) -> PathBuf {
    if config.server.world_container == Path::new(".") {
        PathBuf::from(name)
    } else {
        config.server.world_container.join(name)
    }
}

fn world_source(config: &Config, name: &str, seed: Option<i64>, split: bool) -> StageSource {
    let mut sidecars = Vec::new();
    if config.backup.backup_world_seeds {
        if let Some(seed) = seed {
            let text = format!("Level seed for '{name}':\n{seed}");
            let at = if split {
                PathBuf::from("worldSeed.txt")
            } else {
                world_unit(config, name).join("worldSeed.txt")
            };
            sidecars.push((at, text));
        }
    }

    StageSource {
        path: world_dir(config, name),
        mount: if split {
            PathBuf::from(".")
        } else {
            world_unit(config, name)
        },
        filter: CopyFilter::Everything,
        sidecars,
    }
}

fn plugin_source(config: &Config, split: bool) -> StageSource {
    let list = config.backup.plugin_list.clone();
    let filter = if config.backup.plugin_list_is_denylist {
        CopyFilter::DenyTopLevel(list)
    } else {
        CopyFilter::AllowTopLevel(list)
    };

    StageSource {
        path: config.server.root.join(&config.server.plugin_dir),
        mount: if split {
            PathBuf::from(".")
        } else {
            PathBuf::from("plugins")
        },
        filter,
        sidecars: Vec::new(),
    }
}
