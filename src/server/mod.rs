/// HTTP API Server module for dbdock
/// Exposes the backup and restore pipelines over REST

#[cfg(feature = "server")]
pub mod routes;

#[cfg(feature = "server")]
pub mod handlers;

#[cfg(feature = "server")]
pub mod auth;

#[cfg(feature = "server")]
pub use routes::create_router;

#[cfg(feature = "server")]
pub use state::AppState;

#[cfg(feature = "server")]
mod state {
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::core::{BackupPipeline, ContainerRuntime, PipelineSettings, RestorePipeline};

    /// Shared by every request handler
    #[derive(Clone)]
    pub struct AppState {
        pub backup: BackupPipeline,
        pub restore: RestorePipeline,
        pub runtime: Arc<dyn ContainerRuntime>,
        pub api_key: Arc<str>,
        pub upload_dir: Arc<PathBuf>,
    }

    impl AppState {
        pub fn new(
            runtime: Arc<dyn ContainerRuntime>,
            settings: PipelineSettings,
            api_key: impl Into<Arc<str>>,
            upload_dir: PathBuf,
        ) -> Self {
            let settings = Arc::new(settings);
            Self {
                backup: BackupPipeline::new(runtime.clone(), settings.clone()),
                restore: RestorePipeline::new(runtime.clone(), settings),
                runtime,
                api_key: api_key.into(),
                upload_dir: Arc::new(upload_dir),
            }
        }
    }
}

#[cfg(feature = "server")]
pub async fn run(
    config: crate::utils::AppConfig,
    host: String,
    port: u16,
    enable_cors: bool,
) -> anyhow::Result<()> {
    use anyhow::{anyhow, Context};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tracing::info;

    use crate::core::{ContainerRuntime, DockerRuntime};
    use crate::utils::ENV_API_KEY;

    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            anyhow!(
                "No API key configured. Set {} or run `dbdock config init`",
                ENV_API_KEY
            )
        })?;

    config.ensure_dirs()?;
    let settings = config.pipeline_settings()?;
    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerRuntime::connect(config.docker_socket.as_deref())?);

    let state = AppState::new(runtime, settings, api_key, config.upload_dir.clone());
    let app = create_router(state, enable_cors, config.body_limit_bytes);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    println!("🚀 dbdock backup service");
    println!("   🔌 API:    http://{}/api", addr);
    println!("   🔒 Auth:   X-API-Key header required");
    println!();
    println!("📚 API Endpoints:");
    println!("   POST /api/backup   - Dump a database as a gzip download");
    println!("   POST /api/restore  - Load an uploaded dump (multipart)");
    println!("   GET  /api/health   - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

#[cfg(feature = "server")]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
