/// Restore pipeline
///
/// Validating -> TestingConnection -> Packaging -> Uploading -> Executing ->
/// CleaningUp. The uploaded file and the archive built from it are released
/// through a [`CleanupScope`] however the run ends.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use super::archive::{ArchivePackager, StagedFile};
use super::artifacts::CleanupScope;
use super::backup::BackupRequest;
use super::commands::{redact, RestoreMode};
use super::error::{PipelineError, ValidationError};
use super::exec::{verify_connection, ExecReader, StreamSummary};
use super::runtime::{ContainerHandle, ContainerRuntime, ExecSpec};
use super::settings::PipelineSettings;

/// A file received from the client and already stored locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedArtifact {
    pub local_path: PathBuf,
    pub declared_mime_type: String,
}

#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub target: BackupRequest,
    pub artifact: Option<UploadedArtifact>,
}

impl RestoreRequest {
    pub fn new(target: BackupRequest, artifact: Option<UploadedArtifact>) -> Self {
        Self { target, artifact }
    }

    pub fn validate(&self) -> Result<&UploadedArtifact, ValidationError> {
        self.target.validate()?;
        let artifact = self.artifact.as_ref().ok_or(ValidationError::MissingArtifact)?;
        if !artifact.local_path.is_file() {
            return Err(ValidationError::ArtifactNotFound(artifact.local_path.clone()));
        }
        Ok(artifact)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub mode: RestoreMode,
    /// Path the file was staged at inside the container
    pub staged_path: String,
    pub output: StreamSummary,
}

#[derive(Debug, Clone, Copy)]
enum RestoreStage {
    TestingConnection,
    Packaging,
    Executing,
    CleaningUp,
}

#[derive(Clone)]
pub struct RestorePipeline {
    runtime: Arc<dyn ContainerRuntime>,
    settings: Arc<PipelineSettings>,
}

impl RestorePipeline {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: Arc<PipelineSettings>) -> Self {
        Self { runtime, settings }
    }

    /// Run a restore. The uploaded file is owned by the pipeline from here
    /// on and is deleted even when the request turns out to be invalid.
    pub async fn run(&self, request: RestoreRequest) -> Result<RestoreOutcome, PipelineError> {
        let mut scope = CleanupScope::new();
        if let Some(artifact) = &request.artifact {
            scope.register(&artifact.local_path);
        }

        let artifact = request.validate()?.clone();
        let span = info_span!(
            "restore",
            container = %request.target.container_name,
            database = %request.target.database_name,
        );
        let outcome = self
            .execute(&request.target, &artifact, &mut scope)
            .instrument(span)
            .await?;

        debug!(stage = ?RestoreStage::CleaningUp, artifacts = scope.len());
        scope.release();
        Ok(outcome)
    }

    async fn execute(
        &self,
        target: &BackupRequest,
        artifact: &UploadedArtifact,
        scope: &mut CleanupScope,
    ) -> Result<RestoreOutcome, PipelineError> {
        let settings = &*self.settings;
        let runtime = &*self.runtime;

        debug!(stage = ?RestoreStage::TestingConnection);
        let container =
            verify_connection(runtime, settings, &target.container_name, &target.root_password).await?;

        debug!(stage = ?RestoreStage::Packaging, upload = %artifact.local_path.display());
        let staged = ArchivePackager::new(runtime, &settings.staging_dir)
            .stage(&container, &artifact.local_path, scope, settings.exec_timeout)
            .await?;

        let mode = RestoreMode::for_media_type(&artifact.declared_mime_type);
        let command = settings.tools.restore(
            &target.root_password,
            &target.database_name,
            &staged.container_path,
            mode,
        );
        debug!(
            stage = ?RestoreStage::Executing,
            ?mode,
            command = %redact(&command, &target.root_password),
        );

        let reader = ExecReader::new(runtime, &container);
        let result = reader
            .run_logged(ExecSpec::interactive(command), settings.exec_timeout)
            .await;

        // The staged file is useless whether or not the restore worked
        self.remove_staged(&reader, &container, &staged).await;

        let output = result?;
        info!(
            stdout_bytes = output.stdout_bytes,
            stderr_bytes = output.stderr_bytes,
            "restore complete"
        );

        Ok(RestoreOutcome {
            mode,
            staged_path: staged.container_path,
            output,
        })
    }

    /// Best effort; failures are logged and otherwise ignored
    async fn remove_staged(&self, reader: &ExecReader<'_>, container: &ContainerHandle, staged: &StagedFile) {
        let command = self.settings.tools.remove_staged(&staged.container_path);
        if let Err(e) = reader
            .run_logged(ExecSpec::output(command), self.settings.connect_timeout)
            .await
        {
            warn!(
                container = %container.name,
                path = %staged.container_path,
                error = %e,
                "failed to remove staged file"
            );
        }
    }
}
