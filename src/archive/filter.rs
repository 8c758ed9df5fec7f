//! Copy-filter strategies.
//!
//! A closed set of named predicates applied while staging a source tree,
//! consulted once per entry with the entry's path relative to the source
//! root. Rejecting a directory prunes its whole subtree.

use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyFilter {
    /// Copy every entry.
    Everything,
    /// Skip any entry whose own name matches one of the given names, at any
    /// depth. Used to keep the backup store and the live log file out of
    /// whole-tree backups.
    DenyNames(Vec<String>),
    /// Keep only the top-level entries named in the list, and everything
    /// beneath them. An empty list keeps nothing.
    AllowTopLevel(Vec<String>),
    /// Skip the top-level entries named in the list.
    DenyTopLevel(Vec<String>),
}

impl CopyFilter {
    pub fn accepts(&self, relative: &Path) -> bool {
        match self {
            CopyFilter::Everything => true,
            CopyFilter::DenyNames(names) => relative
                .file_name()
                .map_or(true, |name| !names.iter().any(|n| name == n.as_str())),
            CopyFilter::AllowTopLevel(names) => {
                first_component(relative).is_some_and(|c| names.iter().any(|n| n == c))
            }
            CopyFilter::DenyTopLevel(names) => {
                !first_component(relative).is_some_and(|c| names.iter().any(|n| n == c))
            }
        }
    }
}

fn first_component(relative: &Path) -> Option<&str> {
    relative.components().next().and_then(|c| c.as_os_str().to_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn everything_accepts_all() {
        assert!(CopyFilter::Everything.accepts(Path::new("any/depth/file.bin")));
    }

    #[test]
    fn deny_names_matches_entry_name_at_any_depth() {
        let filter = CopyFilter::DenyNames(vec!["backups".into(), "server.log".into()]);
        assert!(!filter.accepts(Path::new("backups")));
        assert!(!filter.accepts(Path::new("server.log")));
        assert!(!filter.accepts(Path::new("nested/server.log")));
        assert!(filter.accepts(Path::new("world/region/r.0.0.mca")));
        assert!(filter.accepts(Path::new("server.log.old")));
    }

    #[test]
    fn allow_list_keeps_only_listed_subtrees() {
        let filter = CopyFilter::AllowTopLevel(vec!["Essentials".into()]);
        assert!(filter.accepts(Path::new("Essentials")));
        assert!(filter.accepts(Path::new("Essentials/config.yml")));
        assert!(!filter.accepts(Path::new("WorldEdit")));
        assert!(!filter.accepts(Path::new("WorldEdit/config.yml")));
        assert!(!filter.accepts(Path::new("stray.jar")));
    }

    #[test]
    fn empty_allow_list_keeps_nothing() {
        let filter = CopyFilter::AllowTopLevel(Vec::new());
        assert!(!filter.accepts(Path::new("anything")));
    }

    #[test]
    fn deny_list_skips_listed_subtrees() {
        let filter = CopyFilter::DenyTopLevel(vec!["dynmap".into()]);
        assert!(!filter.accepts(Path::new("dynmap")));
        assert!(!filter.accepts(Path::new("dynmap/web/tiles.db")));
        assert!(filter.accepts(Path::new("Essentials/config.yml")));
    }

    #[test]
    fn empty_deny_list_keeps_everything() {
        let filter = CopyFilter::DenyTopLevel(Vec::new());
        assert!(filter.accepts(Path::new("anything/at/all")));
    }
}
