use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, trace, warn};

/// Temporary home of a fetched snapshot, keyed by cookbook name. Removed when
/// dropped if it was not moved into place.
pub struct ScratchClone {
    path: PathBuf,
}

impl ScratchClone {
    pub fn new(base: &Path, package: &str) -> ScratchClone {
        ScratchClone {
            path: base.join(format!("_tmp_cookfetch_{package}")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Moves the snapshot to `target`, which must not exist yet. Falls back to a
    /// copy when a rename is not possible, e.g. across filesystems.
    pub fn move_into(&self, target: &Path) -> io::Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::rename(&self.path, target) {
            Ok(()) => Ok(()),
            Err(error) => {
                debug!(
                    "Could not rename {} to {} ({}), copying instead",
                    self.path.display(),
                    target.display(),
                    error
                );
                copy_dir_all(&self.path, target)?;
                fs::remove_dir_all(&self.path)
            }
        }
    }
}

impl Drop for ScratchClone {
    fn drop(&mut self) {
        if self.path.exists() {
            trace!("Removing scratch directory {}", self.path.display());
            if let Err(error) = fs::remove_dir_all(&self.path) {
                warn!(
                    "Could not remove scratch directory {}: {}",
                    self.path.display(),
                    error
                );
            }
        }
    }
}

fn copy_dir_all(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let destination = to.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_all(&entry.path(), &destination)?;
        } else if file_type.is_symlink() {
            copy_symlink(&entry.path(), &destination)?;
        } else {
            fs::copy(entry.path(), destination)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to).map(|_| ())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::test_support::{read, write_files};

    #[test]
    fn scratch_path_is_keyed_by_package() {
        let base = Path::new("/tmp");
        assert_eq!(
            ScratchClone::new(base, "widget").path(),
            Path::new("/tmp/_tmp_cookfetch_widget")
        );
    }

    #[test]
    fn move_into_renames_snapshot() {
        let dir = tempdir().unwrap();
        let scratch = ScratchClone::new(dir.path(), "widget");
        write_files(scratch.path(), &[("recipes/default.rb", "package 'widget'")]);
        let target = dir.path().join("cookbooks/widget");

        scratch.move_into(&target).unwrap();

        assert_eq!(read(&target, "recipes/default.rb"), "package 'widget'");
        assert!(!scratch.path().exists());
    }

    #[test]
    fn copy_dir_all_copies_nested_files() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        write_files(&source, &[("a.txt", "a"), ("nested/deeper/b.txt", "b")]);

        copy_dir_all(&source, &dir.path().join("copy")).unwrap();

        assert_eq!(read(&dir.path().join("copy"), "a.txt"), "a");
        assert_eq!(read(&dir.path().join("copy"), "nested/deeper/b.txt"), "b");
    }

    #[test]
    fn drop_removes_leftovers() {
        let dir = tempdir().unwrap();
        let path = {
            let scratch = ScratchClone::new(dir.path(), "widget");
            write_files(scratch.path(), &[("metadata.rb", "name 'widget'")]);
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
