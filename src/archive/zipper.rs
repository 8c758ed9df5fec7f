//! Directory-to-zip archiving.

use crate::utils::errors::Result;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Archive the contents of `src_dir` into the zip file at `dest_file`.
/// Entry names are relative to `src_dir`; directory entries are kept so an
/// extraction reproduces empty directories too.
pub fn zip_tree(src_dir: &Path, dest_file: &Path) -> Result<()> {
    let file = File::create(dest_file)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    let mut buffer = Vec::new();

    for entry in WalkDir::new(src_dir) {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        let relative = match path.strip_prefix(src_dir) {
            Ok(r) if !r.as_os_str().is_empty() => r,
            _ => continue,
        };
        let name = relative.to_string_lossy();

        if path.is_file() {
            zip.start_file(name.as_ref(), options)?;
            let mut f = File::open(path)?;
            f.read_to_end(&mut buffer)?;
            zip.write_all(&buffer)?;
            buffer.clear();
        } else if path.is_dir() {
            zip.add_directory(name.as_ref(), options)?;
        }
    }

    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn zips_a_tree_and_reads_it_back() -> anyhow::Result<()> {
        let src = TempDir::new()?;
        let out = TempDir::new()?;
        fs::write(src.path().join("a.txt"), b"alpha")?;
        fs::create_dir(src.path().join("sub"))?;
        fs::write(src.path().join("sub/b.txt"), b"beta")?;
        fs::create_dir(src.path().join("empty"))?;

        let archive_path = out.path().join("backup.zip");
        zip_tree(src.path(), &archive_path)?;

        let mut archive = zip::ZipArchive::new(File::open(&archive_path)?)?;
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "empty/", "sub/", "sub/b.txt"]);

        let mut contents = String::new();
        archive.by_name("sub/b.txt")?.read_to_string(&mut contents)?;
        assert_eq!(contents, "beta");
        Ok(())
    }

    #[test]
    fn empty_directory_produces_empty_archive() -> anyhow::Result<()> {
        let src = TempDir::new()?;
        let out = TempDir::new()?;
        let archive_path = out.path().join("empty.zip");
        zip_tree(src.path(), &archive_path)?;

        let archive = zip::ZipArchive::new(File::open(&archive_path)?)?;
        assert_eq!(archive.len(), 0);
        Ok(())
    }
}
