use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dbdock::cli::{Cli, Commands, ConfigCommands};
use dbdock::core::artifacts::unique_name;
use dbdock::core::error::{ErrorKind, CONNECTION_FAILED_MESSAGE};
use dbdock::core::{
    BackupPipeline, BackupRequest, ContainerRuntime, DockerRuntime, Operation, PipelineError,
    RestorePipeline, RestoreRequest, UploadedArtifact,
};
use dbdock::utils::{
    default_backup_path, format_bytes, mask_sensitive, media_type_for, AppConfig, DEFAULT_HOST,
    DEFAULT_PORT, ENV_DB_PASSWORD,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dbdock=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        None => {
            // No command - run the API server with defaults
            let config = AppConfig::load(config_path)?;
            dbdock::server::run(config, DEFAULT_HOST.to_string(), DEFAULT_PORT, false).await?;
        }
        Some(Commands::Serve { host, port, cors }) => {
            let config = AppConfig::load(config_path)?;
            dbdock::server::run(config, host, port, cors).await?;
        }
        Some(Commands::Backup {
            container,
            database,
            output,
            password,
        }) => {
            let config = AppConfig::load(config_path)?;
            handle_backup(&config, container, database, output, password).await?;
        }
        Some(Commands::Restore {
            container,
            database,
            file,
            gzip,
            password,
        }) => {
            let config = AppConfig::load(config_path)?;
            handle_restore(&config, container, database, file, gzip, password).await?;
        }
        Some(Commands::Config { command }) => {
            handle_config(config_path, command)?;
        }
    }

    Ok(())
}

fn resolve_password(password: Option<String>) -> Result<String> {
    password
        .or_else(|| std::env::var(ENV_DB_PASSWORD).ok())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| anyhow!("Database password required: pass --password or set {}", ENV_DB_PASSWORD))
}

fn runtime_for(config: &AppConfig) -> Result<Arc<dyn ContainerRuntime>> {
    Ok(Arc::new(DockerRuntime::connect(config.docker_socket.as_deref())?))
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Turn a pipeline failure into a CLI error, keeping the precise cause
fn describe(err: PipelineError, operation: Operation) -> anyhow::Error {
    let headline = match err.kind() {
        ErrorKind::Connection => CONNECTION_FAILED_MESSAGE,
        _ => err.public_message(operation),
    };
    anyhow!("{}: {}", headline, err)
}

async fn handle_backup(
    config: &AppConfig,
    container: String,
    database: String,
    output: Option<PathBuf>,
    password: Option<String>,
) -> Result<()> {
    config.ensure_dirs()?;
    let pipeline = BackupPipeline::new(runtime_for(config)?, Arc::new(config.pipeline_settings()?));
    let request = BackupRequest::new(container, resolve_password(password)?, database);
    let output = output.unwrap_or_else(|| default_backup_path(&request.database_name));

    let bar = spinner(format!(
        "Backing up {} from {}",
        request.database_name, request.container_name
    ));
    let result = pipeline.run(&request).await;
    bar.finish_and_clear();

    let artifact = result.map_err(|e| describe(e, Operation::Backup))?;
    tokio::fs::write(&output, &artifact.bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{} {} ({} raw, {} compressed)",
        "✓ Backup written to".green(),
        output.display(),
        format_bytes(artifact.raw_size),
        format_bytes(artifact.bytes.len() as u64)
    );
    Ok(())
}

async fn handle_restore(
    config: &AppConfig,
    container: String,
    database: String,
    file: PathBuf,
    gzip: bool,
    password: Option<String>,
) -> Result<()> {
    config.ensure_dirs()?;
    if !file.is_file() {
        return Err(anyhow!("{} is not a file", file.display()));
    }

    // The pipeline deletes its upload, so hand it a copy
    let staged = config.upload_dir.join(unique_name("upload", None));
    tokio::fs::copy(&file, &staged)
        .await
        .with_context(|| format!("Failed to copy {} to {}", file.display(), staged.display()))?;

    let declared = if gzip { "application/gzip" } else { media_type_for(&file) };
    let pipeline = RestorePipeline::new(runtime_for(config)?, Arc::new(config.pipeline_settings()?));
    let request = RestoreRequest::new(
        BackupRequest::new(container, resolve_password(password)?, database),
        Some(UploadedArtifact {
            local_path: staged,
            declared_mime_type: declared.to_string(),
        }),
    );

    let bar = spinner(format!(
        "Restoring {} into {}",
        file.display(),
        request.target.database_name
    ));
    let result = pipeline.run(request).await;
    bar.finish_and_clear();

    let outcome = result.map_err(|e| describe(e, Operation::Restore))?;
    println!(
        "{} ({:?}, {} of output)",
        "✓ Restore successful".green(),
        outcome.mode,
        format_bytes(outcome.output.stdout_bytes + outcome.output.stderr_bytes)
    );
    Ok(())
}

fn handle_config(config_path: Option<&Path>, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let mut config = AppConfig::load(config_path)?;
            config.api_key = config.api_key.map(|k| mask_sensitive(&k, 4));
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigCommands::Path => {
            let path = match config_path {
                Some(p) => p.to_path_buf(),
                None => AppConfig::config_path()?,
            };
            println!("{}", path.display());
        }
        ConfigCommands::Init { force } => {
            let path = match config_path {
                Some(p) => p.to_path_buf(),
                None => AppConfig::config_path()?,
            };
            if path.exists() && !force {
                return Err(anyhow!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                ));
            }

            let config = AppConfig {
                api_key: Some(dbdock::server::auth::generate_token()),
                ..AppConfig::default()
            };
            let written = config.save(Some(&path))?;
            println!("{} {}", "✓ Config written to".green(), written.display());
            println!("  Send the api_key value in the X-API-Key header.");
        }
    }
    Ok(())
}
