/// API Request Handlers
/// Thin adapters between HTTP and the backup/restore pipelines

use std::path::Path;

use anyhow::Context;
use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::JsonRejection,
        State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use super::AppState;
use crate::core::artifacts::{unique_name, TempArtifact};
use crate::core::error::REQUIRED_FIELDS_MESSAGE;
use crate::core::{BackupRequest, Operation, PipelineError, RestoreRequest, UploadedArtifact};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(msg: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg),
        }
    }
}

#[derive(Serialize)]
pub struct HealthInfo {
    version: &'static str,
    docker: bool,
}

/// Error body sent to clients: `{"error": "<fixed message>"}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
}

impl ApiError {
    fn bad_request() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: REQUIRED_FIELDS_MESSAGE,
        }
    }

    /// Log the precise failure, expose only the generic message
    fn from_pipeline(err: &PipelineError, operation: Operation) -> Self {
        if err.is_client_error() {
            warn!(?operation, error = %err, "rejected invalid request");
            Self::bad_request()
        } else {
            error!(?operation, kind = ?err.kind(), error = %err, "pipeline failed");
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: err.public_message(operation),
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// ============================================================================
// Backup / Restore Handlers
// ============================================================================

pub async fn backup(
    State(state): State<AppState>,
    body: Result<Json<BackupRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    // A body that does not parse is treated like one with no fields
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "unreadable backup request body");
            BackupRequest::default()
        }
    };

    let artifact = state
        .backup
        .run(&request)
        .await
        .map_err(|e| ApiError::from_pipeline(&e, Operation::Backup))?;

    let disposition = format!("attachment; filename={}", artifact.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}

pub async fn restore(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let multipart = multipart.map_err(|rejection| {
        warn!(error = %rejection, "restore request is not multipart");
        ApiError::bad_request()
    })?;

    let request = read_restore_form(&state.upload_dir, multipart)
        .await
        .map_err(|e| {
            warn!(error = %format!("{:#}", e), "failed to read restore upload");
            ApiError::bad_request()
        })?;

    let outcome = state
        .restore
        .run(request)
        .await
        .map_err(|e| ApiError::from_pipeline(&e, Operation::Restore))?;

    info!(staged = %outcome.staged_path, mode = ?outcome.mode, "restore request finished");
    Ok(Json(json!({ "message": "Restore successful" })))
}

/// Collect the text fields and store the `file` part under a unique name.
/// The stored file is handed to the pipeline, which owns its removal.
async fn read_restore_form(upload_dir: &Path, mut multipart: Multipart) -> anyhow::Result<RestoreRequest> {
    let mut target = BackupRequest::default();
    let mut upload: Option<(TempArtifact, String)> = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "containerName" | "containerIdentifier" => target.container_name = field.text().await?,
            "rootPassword" | "credentialSecret" => target.root_password = field.text().await?,
            "databaseName" => target.database_name = field.text().await?,
            "file" => {
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let guard = TempArtifact::new(upload_dir.join(unique_name("upload", None)));
                let mut file = tokio::fs::File::create(guard.path())
                    .await
                    .with_context(|| format!("Failed to create {}", guard.path().display()))?;
                while let Some(chunk) = field.chunk().await? {
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                upload = Some((guard, mime));
            }
            other => warn!(field = other, "ignoring unknown form field"),
        }
    }

    let artifact = upload.map(|(guard, mime)| UploadedArtifact {
        local_path: guard.keep(),
        declared_mime_type: mime,
    });
    Ok(RestoreRequest::new(target, artifact))
}

// ============================================================================
// Health Check
// ============================================================================

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<HealthInfo>>) {
    match state.runtime.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::ok(HealthInfo {
                version: env!("CARGO_PKG_VERSION"),
                docker: true,
            })),
        ),
        Err(e) => {
            warn!(error = %e, "docker daemon unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error(format!("Docker unreachable: {}", e))),
            )
        }
    }
}
