//! Recursive, filtered directory copy.
//!
//! Preserves modification times where the platform allows it and fails
//! loudly when a destination cannot be created or written. Entries rejected
//! by the filter are skipped silently; symlinks are skipped entirely.

use crate::archive::filter::CopyFilter;
use std::fs;
use std::io;
use std::path::Path;

/// Copy the contents of `src` into `dest`, creating `dest` as needed.
pub fn copy_tree(src: &Path, dest: &Path, filter: &CopyFilter) -> io::Result<()> {
    if !src.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source '{}' is not a directory", src.display()),
        ));
    }
    fs::create_dir_all(dest)?;

    // Guard against dest living inside src: resolve it once so the walk can
    // skip over it even when the filter does not.
    let dest_resolved = dest.canonicalize()?;
    copy_dir_contents(src, dest, src, &dest_resolved, filter)
}

fn copy_dir_contents(
    dir: &Path,
    dest: &Path,
    root: &Path,
    dest_resolved: &Path,
    filter: &CopyFilter,
) -> io::Result<()> {
    fs::create_dir_all(dest)?;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path);

        if !filter.accepts(relative) {
            continue;
        }
        if path.canonicalize().map(|p| p == *dest_resolved).unwrap_or(false) {
            continue;
        }

        let file_type = entry.file_type()?;
        let target = dest.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_contents(&path, &target, root, dest_resolved, filter)?;
        } else if file_type.is_file() {
            copy_file(&path, &target)?;
        }
        // symlinks: skipped
    }

    // Contents first; copying into the directory bumps its mtime.
    preserve_mtime(dir, dest);
    Ok(())
}

fn copy_file(src: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(src, dest)?;
    preserve_mtime(src, dest);
    Ok(())
}

/// Best-effort: mtime preservation failure is not worth failing a backup over.
fn preserve_mtime(src: &Path, dest: &Path) {
    let Ok(metadata) = fs::metadata(src) else {
        return;
    };
    let Ok(modified) = metadata.modified() else {
        return;
    };
    if let Ok(file) = fs::File::open(dest) {
        let _ = file.set_modified(modified);
    }
}
