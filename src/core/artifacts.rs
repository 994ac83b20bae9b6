/// Temporary files created while a pipeline runs
///
/// Each file is owned by a [`TempArtifact`] guard that deletes it when
/// dropped, so every exit path of a pipeline cleans up after itself.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::error::CleanupError;

/// Build a process-unique file name such as `backup_<uuid>.sql`
pub fn unique_name(prefix: &str, extension: Option<&str>) -> String {
    let token = Uuid::new_v4().simple();
    match extension {
        Some(ext) => format!("{}_{}.{}", prefix, token, ext),
        None => format!("{}_{}", prefix, token),
    }
}

/// A local file removed on drop unless [`TempArtifact::keep`] is called
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    armed: bool,
}

impl TempArtifact {
    /// Take ownership of `path`. The file itself may not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now. A file that was never created counts as removed.
    pub fn remove(mut self) -> Result<(), CleanupError> {
        self.armed = false;
        remove_path(&self.path)
    }

    /// Give up ownership and return the path without deleting it
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = remove_path(&self.path) {
                warn!(error = %e, "temporary artifact left behind");
            }
        }
    }
}

fn remove_path(path: &Path) -> Result<(), CleanupError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed temporary artifact");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CleanupError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Every artifact registered here is released when the scope ends,
/// whichever step of the pipeline failed.
#[derive(Debug, Default)]
pub struct CleanupScope {
    artifacts: Vec<TempArtifact>,
}

impl CleanupScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` for removal and return it for convenience
    pub fn register(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        self.adopt(TempArtifact::new(path))
    }

    /// Take over an existing guard and return its path
    pub fn adopt(&mut self, artifact: TempArtifact) -> PathBuf {
        let path = artifact.path().to_path_buf();
        self.artifacts.push(artifact);
        path
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Remove everything now, in reverse registration order. Failures are
    /// logged and returned but never stop the remaining removals.
    pub fn release(mut self) -> Vec<CleanupError> {
        let mut failures = Vec::new();
        while let Some(artifact) = self.artifacts.pop() {
            if let Err(e) = artifact.remove() {
                warn!(error = %e, "cleanup failed");
                failures.push(e);
            }
        }
        failures
    }
}

impl Drop for CleanupScope {
    fn drop(&mut self) {
        // Later artifacts are usually derived from earlier ones
        while let Some(artifact) = self.artifacts.pop() {
            drop(artifact);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unique_names_do_not_collide() {
        let a = unique_name("backup", Some("sql"));
        let b = unique_name("backup", Some("sql"));
        assert_ne!(a, b);
        assert!(a.starts_with("backup_"));
        assert!(a.ends_with(".sql"));
        assert!(!unique_name("upload", None).contains('.'));
    }

    #[test]
    fn test_artifact_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.sql");
        std::fs::write(&path, b"data").unwrap();

        {
            let _guard = TempArtifact::new(&path);
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_keep_disarms_guard() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload");
        std::fs::write(&path, b"data").unwrap();

        let kept = TempArtifact::new(&path).keep();
        assert_eq!(kept, path);
        assert!(path.exists());
    }

    #[test]
    fn test_missing_file_is_not_a_cleanup_error() {
        let dir = TempDir::new().unwrap();
        let artifact = TempArtifact::new(dir.path().join("never-created"));
        assert!(artifact.remove().is_ok());
    }

    #[test]
    fn test_scope_releases_everything() {
        let dir = TempDir::new().unwrap();
        let mut scope = CleanupScope::new();
        let first = scope.register(dir.path().join("a"));
        let second = scope.register(dir.path().join("a.tar"));
        std::fs::write(&first, b"1").unwrap();
        std::fs::write(&second, b"2").unwrap();
        assert_eq!(scope.len(), 2);

        assert!(scope.release().is_empty());
        assert!(!first.exists());
        assert!(!second.exists());
    }

    #[test]
    fn test_scope_drop_cleans_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.tar");
        {
            let mut scope = CleanupScope::new();
            scope.register(&path);
            std::fs::write(&path, b"half an archive").unwrap();
        }
        assert!(!path.exists());
    }
}
