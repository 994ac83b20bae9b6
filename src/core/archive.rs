/// Archive packager
///
/// Wraps an uploaded file into a single-entry tar archive keyed by its base
/// name and extracts it into the container's staging directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;
use tracing::debug;

use super::artifacts::{CleanupScope, TempArtifact};
use super::error::PackagingError;
use super::runtime::{ContainerHandle, ContainerRuntime};

/// Base name of `path`, which becomes the archive entry name
pub fn entry_name(path: &Path) -> Result<String, PackagingError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PackagingError::InvalidName(path.to_path_buf()))
}

/// Write a tar archive at `archive_path` containing only `source`, stored
/// under its base name so no host directories leak into the container.
pub fn build_single_entry_archive(source: &Path, archive_path: &Path) -> Result<(), PackagingError> {
    let name = entry_name(source)?;
    let archive_err = |source_err| PackagingError::Archive {
        path: archive_path.to_path_buf(),
        source: source_err,
    };

    let file = File::create(archive_path).map_err(archive_err)?;
    let mut builder = tar::Builder::new(file);
    builder.append_path_with_name(source, &name).map_err(archive_err)?;
    builder.into_inner().map_err(archive_err)?.sync_all().map_err(archive_err)?;
    Ok(())
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Local archive that was sent
    pub archive_path: PathBuf,
    /// Where the file now lives inside the container
    pub container_path: String,
}

pub struct ArchivePackager<'a> {
    runtime: &'a dyn ContainerRuntime,
    staging_dir: &'a str,
}

impl<'a> ArchivePackager<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, staging_dir: &'a str) -> Self {
        Self { runtime, staging_dir }
    }

    /// Package `upload` next to itself as `<upload>.tar` and upload it. The
    /// archive guard is created by the build task and handed to `scope`, so
    /// an abandoned build still removes what it wrote.
    pub async fn stage(
        &self,
        container: &ContainerHandle,
        upload: &Path,
        scope: &mut CleanupScope,
        upload_timeout: Duration,
    ) -> Result<StagedFile, PackagingError> {
        let name = entry_name(upload)?;

        let source = upload.to_path_buf();
        let target = tar_path(upload);
        let guard = tokio::task::spawn_blocking(move || build_archive_artifact(&source, target))
            .await
            .map_err(|e| PackagingError::Archive {
                path: tar_path(upload),
                source: std::io::Error::other(e),
            })??;
        let archive_path = scope.adopt(guard);

        let archive = tokio::fs::read(&archive_path)
            .await
            .map_err(|source| PackagingError::Archive {
                path: archive_path.clone(),
                source,
            })?;
        debug!(bytes = archive.len(), path = %archive_path.display(), "archive built");

        timeout(
            upload_timeout,
            self.runtime
                .upload_archive(container, Bytes::from(archive), self.staging_dir),
        )
        .await
        .map_err(|_| PackagingError::TimedOut(upload_timeout))??;

        Ok(StagedFile {
            archive_path,
            container_path: staged_path(self.staging_dir, &name),
        })
    }
}

/// Build the archive at `archive_path` under a guard that removes it when
/// dropped, whether the build failed or nobody took ownership of the result
pub fn build_archive_artifact(source: &Path, archive_path: PathBuf) -> Result<TempArtifact, PackagingError> {
    let guard = TempArtifact::new(archive_path);
    build_single_entry_archive(source, guard.path())?;
    Ok(guard)
}

/// Where a file with `base_name` lands inside the container
pub fn staged_path(staging_dir: &str, base_name: &str) -> String {
    format!("{}/{}", staging_dir.trim_end_matches('/'), base_name)
}

fn tar_path(upload: &Path) -> PathBuf {
    let mut name = upload.as_os_str().to_os_string();
    name.push(".tar");
    PathBuf::from(name)
}
