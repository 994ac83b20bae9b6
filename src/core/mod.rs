pub mod archive;
pub mod artifacts;
pub mod backup;
pub mod commands;
pub mod docker;
pub mod error;
pub mod exec;
pub mod restore;
pub mod runtime;
pub mod settings;

pub use backup::{BackupArtifact, BackupPipeline, BackupRequest};
pub use docker::DockerRuntime;
pub use error::{ErrorKind, Operation, PipelineError};
pub use restore::{RestoreOutcome, RestorePipeline, RestoreRequest, UploadedArtifact};
pub use runtime::{ContainerHandle, ContainerRuntime, ExecChunk, ExecSession, ExecSpec, ExecStream};
pub use settings::PipelineSettings;
