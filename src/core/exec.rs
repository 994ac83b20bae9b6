/// Exec stream reader
///
/// Runs one command inside a container and classifies how it went. Every
/// runtime call and every stream read shares a single deadline, so a stuck
/// remote command fails instead of blocking the request forever.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::error::{ConnectionError, ExecutionError, RuntimeError};
use super::runtime::{ContainerHandle, ContainerRuntime, ExecChunk, ExecSpec, ExecStream};
use super::settings::PipelineSettings;

/// Cumulative verdict of a connectivity test. Once an error marker has been
/// seen nothing flips it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityScan {
    marker: String,
    rejected: bool,
    bytes_seen: usize,
}

impl ConnectivityScan {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            rejected: false,
            bytes_seen: 0,
        }
    }

    pub fn observe(&mut self, chunk: &[u8]) {
        self.bytes_seen += chunk.len();
        if String::from_utf8_lossy(chunk).contains(self.marker.as_str()) {
            self.rejected = true;
        }
    }

    pub fn saw_output(&self) -> bool {
        self.bytes_seen > 0
    }

    /// Final verdict once the stream has ended
    pub fn verdict(&self, require_output: bool) -> Result<(), ConnectionError> {
        if self.rejected {
            Err(ConnectionError::Rejected)
        } else if require_output && !self.saw_output() {
            Err(ConnectionError::NoOutput)
        } else {
            Ok(())
        }
    }
}

/// Byte counts of a finished exec stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub stdout_bytes: u64,
    pub stderr_bytes: u64,
}

pub struct ExecReader<'a> {
    runtime: &'a dyn ContainerRuntime,
    container: &'a ContainerHandle,
}

impl<'a> ExecReader<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, container: &'a ContainerHandle) -> Self {
        Self { runtime, container }
    }

    async fn open(&self, spec: ExecSpec, deadline: Instant) -> Result<Option<ExecStream>, RuntimeError> {
        let Ok(session) = timeout_at(deadline, self.runtime.create_exec(self.container, &spec)).await else {
            return Ok(None);
        };
        let session = session?;

        match timeout_at(deadline, self.runtime.start_exec(&session)).await {
            Ok(stream) => stream.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Run the connectivity query and decide from its output whether the
    /// credentials work. The verdict is taken when the stream ends.
    pub async fn test_connection(
        &self,
        command: Vec<String>,
        marker: &str,
        require_output: bool,
        timeout: Duration,
    ) -> Result<(), ConnectionError> {
        let deadline = Instant::now() + timeout;
        let mut stream = self
            .open(ExecSpec::output(command), deadline)
            .await?
            .ok_or(ConnectionError::TimedOut(timeout))?;

        let mut scan = ConnectivityScan::new(marker);
        loop {
            match timeout_at(deadline, stream.next()).await {
                Ok(Some(Ok(chunk))) => scan.observe(chunk.bytes()),
                Ok(Some(Err(e))) => return Err(ConnectionError::Runtime(e)),
                Ok(None) => break,
                Err(_) => return Err(ConnectionError::TimedOut(timeout)),
            }
        }

        if !scan.saw_output() {
            warn!(container = %self.container.name, "connection test produced no output");
        }
        scan.verdict(require_output)
    }

    /// Stream the command's stdout into `sink` chunk by chunk. Stderr goes
    /// to the log so warnings never corrupt the captured file.
    pub async fn capture_to_file(
        &self,
        command: Vec<String>,
        sink: &Path,
        timeout: Duration,
    ) -> Result<StreamSummary, ExecutionError> {
        let deadline = Instant::now() + timeout;
        let mut stream = self
            .open(ExecSpec::output(command), deadline)
            .await?
            .ok_or(ExecutionError::TimedOut(timeout))?;

        let mut file = tokio::fs::File::create(sink).await.map_err(ExecutionError::Sink)?;
        let mut summary = StreamSummary::default();

        loop {
            match timeout_at(deadline, stream.next()).await {
                Ok(Some(Ok(ExecChunk::Stderr(message)))) => {
                    summary.stderr_bytes += message.len() as u64;
                    warn!(container = %self.container.name, "{}", String::from_utf8_lossy(&message).trim_end());
                }
                Ok(Some(Ok(chunk))) => {
                    let bytes = chunk.bytes();
                    file.write_all(bytes).await.map_err(ExecutionError::Sink)?;
                    summary.stdout_bytes += bytes.len() as u64;
                }
                Ok(Some(Err(e))) => return Err(ExecutionError::Stream(e)),
                Ok(None) => break,
                Err(_) => return Err(ExecutionError::TimedOut(timeout)),
            }
        }

        file.flush().await.map_err(ExecutionError::Sink)?;
        debug!(bytes = summary.stdout_bytes, path = %sink.display(), "captured exec output");
        Ok(summary)
    }

    /// Run a command and forward its output to the log. Success means the
    /// stream ended without an error event; the output itself is not judged.
    pub async fn run_logged(&self, spec: ExecSpec, timeout: Duration) -> Result<StreamSummary, ExecutionError> {
        let deadline = Instant::now() + timeout;
        let mut stream = self
            .open(spec, deadline)
            .await?
            .ok_or(ExecutionError::TimedOut(timeout))?;

        let mut summary = StreamSummary::default();
        loop {
            match timeout_at(deadline, stream.next()).await {
                Ok(Some(Ok(chunk))) => {
                    let text = String::from_utf8_lossy(chunk.bytes());
                    let text = text.trim_end();
                    if chunk.is_stderr() {
                        summary.stderr_bytes += chunk.bytes().len() as u64;
                        warn!(container = %self.container.name, "{}", text);
                    } else {
                        summary.stdout_bytes += chunk.bytes().len() as u64;
                        info!(container = %self.container.name, "{}", text);
                    }
                }
                Ok(Some(Err(e))) => return Err(ExecutionError::Stream(e)),
                Ok(None) => break,
                Err(_) => return Err(ExecutionError::TimedOut(timeout)),
            }
        }

        Ok(summary)
    }
}

/// Resolve `container_name` and run the connectivity test against it
pub async fn verify_connection(
    runtime: &dyn ContainerRuntime,
    settings: &PipelineSettings,
    container_name: &str,
    secret: &str,
) -> Result<ContainerHandle, ConnectionError> {
    let container = timeout(settings.connect_timeout, runtime.resolve_container(container_name))
        .await
        .map_err(|_| ConnectionError::TimedOut(settings.connect_timeout))??;

    ExecReader::new(runtime, &container)
        .test_connection(
            settings.tools.connection_test(secret),
            &settings.error_marker,
            settings.connect_requires_output,
            settings.connect_timeout,
        )
        .await?;

    debug!(container = %container.name, id = %container.id, "database connection verified");
    Ok(container)
}
