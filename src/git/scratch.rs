use std::io;
use std::path::{Component, Path, PathBuf};

/// A job's scratch checkout, removed when the guard drops.
///
/// The directory itself is left for `git clone` to create; acquiring only
/// clears anything stale at the path and makes sure the parent exists.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Claim `root/name`. `name` must be a single plain path component.
    pub fn acquire(root: &Path, name: &str) -> io::Result<Self> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("scratch name {name:?} must be a single directory name"),
                ))
            }
        }
        let path = root.join(name);

        if path.exists() {
            tracing::warn!("Removing stale scratch directory {}", path.display());
            std::fs::remove_dir_all(&path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the directory now. Safe to call more than once.
    pub fn remove(&self) -> io::Result<()> {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {
                tracing::debug!("Removed scratch directory {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            tracing::warn!("Failed to clean up {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("acme_widget");
        {
            let scratch = ScratchDir::acquire(root.path(), "acme_widget").unwrap();
            std::fs::create_dir_all(scratch.path().join("src")).unwrap();
            std::fs::write(scratch.path().join("src/main.py"), "x = 1").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_acquire_clears_stale_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("stale");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("leftover.txt"), "old").unwrap();

        let scratch = ScratchDir::acquire(root.path(), "stale").unwrap();
        assert_eq!(scratch.path(), path);
        assert!(!scratch.path().exists());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::acquire(root.path(), "never-created").unwrap();
        scratch.remove().unwrap();
        scratch.remove().unwrap();
    }

    #[test]
    fn test_acquire_refuses_names_outside_root() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("temp_repos");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(parent.path().join("precious.txt"), "keep me").unwrap();
        std::fs::write(root.join("other_job.txt"), "in use").unwrap();

        for name in ["..", ".", "", "a/b", "/etc"] {
            let err = ScratchDir::acquire(&root, name).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }

        assert!(parent.path().join("precious.txt").exists());
        assert!(root.join("other_job.txt").exists());
    }
}
