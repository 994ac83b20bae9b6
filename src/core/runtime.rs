/// Container runtime seam
///
/// The pipelines only talk to containers through this trait, so the Docker
/// implementation can be swapped for a scripted one in tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use super::error::RuntimeError;

/// A resolved, existing container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// What to run inside the container and which streams to attach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    pub command: Vec<String>,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub attach_stdin: bool,
}

impl ExecSpec {
    /// Command whose stdout and stderr are both read back
    pub fn output(command: Vec<String>) -> Self {
        Self {
            command,
            attach_stdout: true,
            attach_stderr: true,
            attach_stdin: false,
        }
    }

    /// Like [`ExecSpec::output`] but also declares stdin, which shell
    /// pipelines with redirections may expect
    pub fn interactive(command: Vec<String>) -> Self {
        Self {
            attach_stdin: true,
            ..Self::output(command)
        }
    }
}

/// One created exec instance, discarded once its output stream closes
#[derive(Debug, Clone)]
pub struct ExecSession {
    pub id: String,
    pub spec: ExecSpec,
}

/// A demultiplexed piece of exec output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecChunk {
    Stdout(Bytes),
    Stderr(Bytes),
    /// Raw output when the runtime does not separate streams
    Console(Bytes),
}

impl ExecChunk {
    pub fn bytes(&self) -> &Bytes {
        match self {
            ExecChunk::Stdout(b) | ExecChunk::Stderr(b) | ExecChunk::Console(b) => b,
        }
    }

    pub fn is_stderr(&self) -> bool {
        matches!(self, ExecChunk::Stderr(_))
    }
}

pub type ExecStream = BoxStream<'static, Result<ExecChunk, RuntimeError>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Look up a container by name or id
    async fn resolve_container(&self, name: &str) -> Result<ContainerHandle, RuntimeError>;

    async fn create_exec(
        &self,
        container: &ContainerHandle,
        spec: &ExecSpec,
    ) -> Result<ExecSession, RuntimeError>;

    /// Start an exec session and return its output stream
    async fn start_exec(&self, session: &ExecSession) -> Result<ExecStream, RuntimeError>;

    /// Extract a tar archive into `destination` inside the container
    async fn upload_archive(
        &self,
        container: &ContainerHandle,
        archive: Bytes,
        destination: &str,
    ) -> Result<(), RuntimeError>;

    /// Check that the runtime daemon answers
    async fn ping(&self) -> Result<(), RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactive_spec_attaches_stdin() {
        let spec = ExecSpec::interactive(vec!["bash".into()]);
        assert!(spec.attach_stdin);
        assert!(spec.attach_stdout);
        assert!(spec.attach_stderr);

        let spec = ExecSpec::output(vec!["ls".into()]);
        assert!(!spec.attach_stdin);
    }

    #[test]
    fn test_chunk_accessors() {
        let chunk = ExecChunk::Stderr(Bytes::from_static(b"oops"));
        assert!(chunk.is_stderr());
        assert_eq!(chunk.bytes().as_ref(), b"oops");
        assert!(!ExecChunk::Console(Bytes::new()).is_stderr());
    }
}
