/// Backup pipeline
///
/// Validating -> TestingConnection -> Dumping -> Compressing -> Responding,
/// with the local dump file removed on every exit path once it exists.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Deserialize;
use tracing::{debug, info, info_span, warn, Instrument};

use super::artifacts::{unique_name, TempArtifact};
use super::commands::redact;
use super::error::{ExecutionError, PipelineError, ValidationError};
use super::exec::{verify_connection, ExecReader};
use super::runtime::ContainerRuntime;
use super::settings::PipelineSettings;

pub const GZIP_CONTENT_TYPE: &str = "application/gzip";

/// Which database to reach and how to log in
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRequest {
    #[serde(default, alias = "containerIdentifier")]
    pub container_name: String,
    #[serde(default, alias = "credentialSecret")]
    pub root_password: String,
    #[serde(default)]
    pub database_name: String,
}

impl BackupRequest {
    pub fn new(
        container_name: impl Into<String>,
        root_password: impl Into<String>,
        database_name: impl Into<String>,
    ) -> Self {
        Self {
            container_name: container_name.into(),
            root_password: root_password.into(),
            database_name: database_name.into(),
        }
    }

    /// All three fields must be present and non-empty
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("containerName", &self.container_name),
            ("rootPassword", &self.root_password),
            ("databaseName", &self.database_name),
        ];
        match fields.iter().find(|(_, value)| value.is_empty()) {
            Some((name, _)) => Err(ValidationError::MissingField(*name)),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for BackupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupRequest")
            .field("container_name", &self.container_name)
            .field("root_password", &"****")
            .field("database_name", &self.database_name)
            .finish()
    }
}

/// Compressed dump ready to be sent to the caller
#[derive(Debug, Clone)]
pub struct BackupArtifact {
    /// Suggested download name, e.g. `backup_<token>.sql.gz`
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
    /// Size of the dump before compression
    pub raw_size: u64,
}

#[derive(Debug, Clone, Copy)]
enum BackupStage {
    TestingConnection,
    Dumping,
    Compressing,
    CleaningUp,
}

/// Gzip `data` in memory
pub fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[derive(Clone)]
pub struct BackupPipeline {
    runtime: Arc<dyn ContainerRuntime>,
    settings: Arc<PipelineSettings>,
}

impl BackupPipeline {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: Arc<PipelineSettings>) -> Self {
        Self { runtime, settings }
    }

    pub async fn run(&self, request: &BackupRequest) -> Result<BackupArtifact, PipelineError> {
        request.validate()?;

        let span = info_span!(
            "backup",
            container = %request.container_name,
            database = %request.database_name,
        );
        self.execute(request).instrument(span).await
    }

    async fn execute(&self, request: &BackupRequest) -> Result<BackupArtifact, PipelineError> {
        let settings = &*self.settings;
        let runtime = &*self.runtime;

        debug!(stage = ?BackupStage::TestingConnection);
        let container = verify_connection(
            runtime,
            settings,
            &request.container_name,
            &request.root_password,
        )
        .await?;

        let dump_name = unique_name("backup", Some("sql"));
        let dump = TempArtifact::new(settings.work_dir.join(&dump_name));

        let command = settings.tools.dump(&request.root_password, &request.database_name);
        debug!(stage = ?BackupStage::Dumping, command = %redact(&command, &request.root_password));
        let summary = ExecReader::new(runtime, &container)
            .capture_to_file(command, dump.path(), settings.exec_timeout)
            .await?;

        debug!(stage = ?BackupStage::Compressing, raw_bytes = summary.stdout_bytes);
        let raw = tokio::fs::read(dump.path()).await.map_err(ExecutionError::Sink)?;
        let raw_size = raw.len() as u64;
        let bytes = tokio::task::spawn_blocking(move || gzip(&raw))
            .await
            .map_err(|e| ExecutionError::Compression(std::io::Error::other(e)))?
            .map_err(ExecutionError::Compression)?;

        debug!(stage = ?BackupStage::CleaningUp);
        if let Err(e) = dump.remove() {
            warn!(error = %e, "dump file left behind");
        }

        info!(
            raw_bytes = raw_size,
            compressed_bytes = bytes.len(),
            "backup complete"
        );

        Ok(BackupArtifact {
            file_name: format!("{}.gz", dump_name),
            content_type: GZIP_CONTENT_TYPE,
            bytes,
            raw_size,
        })
    }
}
