/// API Routes definition

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::auth;
use super::handlers;
use super::AppState;

pub fn create_router(state: AppState, enable_cors: bool, body_limit: usize) -> Router {
    // Protected routes (require the API key)
    let protected_routes = Router::new()
        .route("/api/backup", post(handlers::backup))
        .route("/api/restore", post(handlers::restore))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware));

    // Public routes (no auth required)
    let public_routes = Router::new().route("/api/health", get(handlers::health_check));

    let mut app = Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        // Uploads can be large; the configured limit replaces axum's 2MB default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RuntimeError;
    use crate::core::runtime::MockContainerRuntime;
    use crate::core::{ContainerHandle, ExecChunk, ExecSession, PipelineSettings};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use serde_json::Value;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const KEY: &str = "test-key";
    const DUMP: &[u8] = b"-- dump --\nINSERT INTO t VALUES (1);\n";
    const BOUNDARY: &str = "dbdock-test-boundary";

    /// Runtime that answers like a healthy MariaDB container and records
    /// every command it is asked to run
    fn healthy_runtime(commands: Arc<Mutex<Vec<Vec<String>>>>) -> MockContainerRuntime {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_resolve_container().returning(|name| {
            Ok(ContainerHandle {
                id: format!("{}-id", name),
                name: name.to_string(),
            })
        });
        runtime.expect_create_exec().returning(move |_, spec| {
            commands.lock().unwrap().push(spec.command.clone());
            Ok(ExecSession {
                id: "exec-1".to_string(),
                spec: spec.clone(),
            })
        });
        runtime.expect_start_exec().returning(|session| {
            let output: &'static [u8] = match session.spec.command[0].as_str() {
                "mariadb" => b"1\n",
                "mariadb-dump" => DUMP,
                _ => b"",
            };
            Ok(stream::iter(vec![Ok(ExecChunk::Stdout(Bytes::from_static(output)))]).boxed())
        });
        runtime.expect_upload_archive().returning(|_, _, _| Ok(()));
        runtime
    }

    fn app_in(runtime: MockContainerRuntime, work_dir: &Path, upload_dir: &Path) -> Router {
        let settings = PipelineSettings {
            work_dir: work_dir.to_path_buf(),
            ..PipelineSettings::default()
        };
        let state = AppState::new(Arc::new(runtime), settings, KEY, upload_dir.to_path_buf());
        create_router(state, false, 1024 * 1024)
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    fn multipart_body(fields: &[(&str, &str)], file: &[u8], file_type: &str) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"app.sql.gz\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn app(runtime: MockContainerRuntime) -> Router {
        let state = AppState::new(
            Arc::new(runtime),
            PipelineSettings::default(),
            KEY,
            std::env::temp_dir(),
        );
        create_router(state, false, 1024 * 1024)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn backup_request(key: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/backup")
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_missing_api_key_is_unauthorized() {
        let response = app(MockContainerRuntime::new())
            .oneshot(backup_request(None, "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Unauthorized: Invalid API key");
    }

    #[tokio::test]
    async fn test_wrong_api_key_is_unauthorized() {
        let response = app(MockContainerRuntime::new())
            .oneshot(backup_request(Some("nope"), "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_backup_missing_fields_is_bad_request() {
        // The mock has no expectations, so reaching the runtime would panic
        let response = app(MockContainerRuntime::new())
            .oneshot(backup_request(
                Some(KEY),
                r#"{"containerName":"db1","rootPassword":"secret"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(
            body["error"],
            "Container name, root password, and database name are required"
        );
    }

    #[tokio::test]
    async fn test_backup_runtime_failure_is_generic_500() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_resolve_container()
            .returning(|_| Err(RuntimeError::new("inspect container", "no such container: db1")));

        let response = app(runtime)
            .oneshot(backup_request(
                Some(KEY),
                r#"{"containerName":"db1","rootPassword":"secret","databaseName":"app"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Backup failed");
    }

    #[tokio::test]
    async fn test_restore_without_multipart_is_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/restore")
            .header("X-API-Key", KEY)
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app(MockContainerRuntime::new()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_ping().returning(|| Ok(()));

        let request = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let response = app(runtime).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["docker"], true);
    }

    #[tokio::test]
    async fn test_backup_success_returns_gzip_attachment() {
        let work = TempDir::new().unwrap();
        let uploads = TempDir::new().unwrap();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let app = app_in(healthy_runtime(commands.clone()), work.path(), uploads.path());

        let response = app
            .oneshot(backup_request(
                Some(KEY),
                r#"{"containerName":"db1","rootPassword":"secret","databaseName":"app"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/gzip");
        let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.starts_with("attachment; filename=backup_"));
        assert!(disposition.ends_with(".sql.gz"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut raw = Vec::new();
        std::io::Read::read_to_end(&mut flate2::read::GzDecoder::new(&body[..]), &mut raw).unwrap();
        assert_eq!(raw, DUMP);

        assert_eq!(commands.lock().unwrap().len(), 2);
        assert!(dir_is_empty(work.path()));
    }

    #[tokio::test]
    async fn test_restore_success_consumes_upload() {
        let work = TempDir::new().unwrap();
        let uploads = TempDir::new().unwrap();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let app = app_in(healthy_runtime(commands.clone()), work.path(), uploads.path());

        let body = multipart_body(
            &[
                ("containerName", "db1"),
                ("rootPassword", "secret"),
                ("databaseName", "app"),
            ],
            b"\x1f\x8b compressed dump",
            "application/gzip",
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/restore")
            .header("X-API-Key", KEY)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Restore successful");

        let commands = commands.lock().unwrap();
        assert_eq!(commands.len(), 3);
        assert!(commands[1][2].starts_with("gunzip -c '/tmp/upload_"));
        assert_eq!(commands[2][0], "rm");
        assert!(dir_is_empty(uploads.path()), "upload and archive must be removed");
    }

    #[tokio::test]
    async fn test_restore_missing_field_removes_upload() {
        let work = TempDir::new().unwrap();
        let uploads = TempDir::new().unwrap();
        // No expectations: reaching the runtime would panic
        let app = app_in(MockContainerRuntime::new(), work.path(), uploads.path());

        let body = multipart_body(
            &[("containerName", "db1"), ("rootPassword", "secret")],
            b"CREATE TABLE t (id INT);\n",
            "application/sql",
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/restore")
            .header("X-API-Key", KEY)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(dir_is_empty(uploads.path()));
    }
}
