/// Docker integration
///
/// Implements the container runtime seam on top of the Docker Engine API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, LogOutput, UploadToContainerOptions};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::Docker;
use bytes::Bytes;
use futures::StreamExt;
use tracing::debug;

use super::error::RuntimeError;
use super::runtime::{ContainerHandle, ContainerRuntime, ExecChunk, ExecSession, ExecSpec, ExecStream};

/// Seconds the client waits on a single Docker API request
const DOCKER_CLIENT_TIMEOUT_SECS: u64 = 120;

#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the platform defaults (`DOCKER_HOST` or the local socket)
    pub fn connect_local() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon. Is Docker running?")?;
        Ok(Self { docker })
    }

    /// Connect to an explicit socket path
    pub fn connect_socket(path: &str) -> Result<Self> {
        let docker = Docker::connect_with_socket(
            path,
            DOCKER_CLIENT_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
        .with_context(|| format!("Failed to connect to Docker socket at {}", path))?;
        Ok(Self { docker })
    }

    /// Connect to `socket` when given, otherwise fall back to local defaults
    pub fn connect(socket: Option<&str>) -> Result<Self> {
        match socket {
            Some(path) => Self::connect_socket(path),
            None => Self::connect_local(),
        }
    }
}

fn runtime_error(operation: &'static str, err: bollard::errors::Error) -> RuntimeError {
    RuntimeError::new(operation, err.to_string())
}

fn into_chunk(output: LogOutput) -> Option<ExecChunk> {
    match output {
        LogOutput::StdOut { message } => Some(ExecChunk::Stdout(message)),
        LogOutput::StdErr { message } => Some(ExecChunk::Stderr(message)),
        LogOutput::Console { message } => Some(ExecChunk::Console(message)),
        // Echoed input is never interesting to the pipelines
        LogOutput::StdIn { .. } => None,
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn resolve_container(&self, name: &str) -> Result<ContainerHandle, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| runtime_error("inspect container", e))?;

        let id = inspect
            .id
            .ok_or_else(|| RuntimeError::new("inspect container", format!("{} has no id", name)))?;

        Ok(ContainerHandle {
            id,
            name: name.to_string(),
        })
    }

    async fn create_exec(
        &self,
        container: &ContainerHandle,
        spec: &ExecSpec,
    ) -> Result<ExecSession, RuntimeError> {
        let options = CreateExecOptions {
            cmd: Some(spec.command.clone()),
            attach_stdout: Some(spec.attach_stdout),
            attach_stderr: Some(spec.attach_stderr),
            attach_stdin: Some(spec.attach_stdin),
            ..Default::default()
        };

        let created = self
            .docker
            .create_exec(&container.id, options)
            .await
            .map_err(|e| runtime_error("create exec", e))?;

        debug!(exec_id = %created.id, container = %container.name, "exec created");

        Ok(ExecSession {
            id: created.id,
            spec: spec.clone(),
        })
    }

    async fn start_exec(&self, session: &ExecSession) -> Result<ExecStream, RuntimeError> {
        let started = self
            .docker
            .start_exec(&session.id, None)
            .await
            .map_err(|e| runtime_error("start exec", e))?;

        match started {
            // The input half is dropped right away; nothing is ever written to it
            StartExecResults::Attached { output, .. } => Ok(output
                .filter_map(|item| async move {
                    match item {
                        Ok(output) => into_chunk(output).map(Ok),
                        Err(e) => Some(Err(runtime_error("read exec output", e))),
                    }
                })
                .boxed()),
            StartExecResults::Detached => Err(RuntimeError::new(
                "start exec",
                format!("exec {} started detached", session.id),
            )),
        }
    }

    async fn upload_archive(
        &self,
        container: &ContainerHandle,
        archive: Bytes,
        destination: &str,
    ) -> Result<(), RuntimeError> {
        let options = UploadToContainerOptions {
            path: destination.to_string(),
            ..Default::default()
        };

        self.docker
            .upload_to_container(&container.id, Some(options), archive)
            .await
            .map_err(|e| runtime_error("upload archive", e))
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| runtime_error("ping", e))
    }
}
