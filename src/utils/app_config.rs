/// Application configuration management
/// Stores settings in ~/.config/dbdock/config.toml, overridable from the environment

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::commands::DatabaseTools;
use crate::core::settings::{
    PipelineSettings, DEFAULT_CONNECT_TIMEOUT, DEFAULT_ERROR_MARKER, DEFAULT_EXEC_TIMEOUT,
    DEFAULT_STAGING_DIR,
};
use crate::utils::constants::{DEFAULT_BODY_LIMIT_BYTES, ENV_API_KEY, ENV_DOCKER_SOCKET};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Shared secret expected in the X-API-Key header
    pub api_key: Option<String>,
    /// Docker socket path; local defaults when unset
    pub docker_socket: Option<String>,
    /// Where multipart uploads are written
    pub upload_dir: PathBuf,
    /// Where dump files and restore archives are written
    pub work_dir: PathBuf,
    /// Container-side directory uploads are extracted into
    pub staging_dir: String,
    pub error_marker: String,
    pub connect_requires_output: bool,
    /// Human readable, e.g. "30s"
    pub connect_timeout: String,
    /// Human readable, e.g. "10m"
    pub exec_timeout: String,
    pub body_limit_bytes: usize,
    pub tools: DatabaseTools,
}

impl Default for AppConfig {
    fn default() -> Self {
        let scratch = std::env::temp_dir().join("dbdock");
        Self {
            api_key: None,
            docker_socket: None,
            upload_dir: scratch.join("uploads"),
            work_dir: scratch.join("work"),
            staging_dir: DEFAULT_STAGING_DIR.to_string(),
            error_marker: DEFAULT_ERROR_MARKER.to_string(),
            connect_requires_output: false,
            connect_timeout: humantime::format_duration(DEFAULT_CONNECT_TIMEOUT).to_string(),
            exec_timeout: humantime::format_duration(DEFAULT_EXEC_TIMEOUT).to_string(),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            tools: DatabaseTools::default(),
        }
    }
}

impl AppConfig {
    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine the user config directory")?
            .join("dbdock");
        Ok(config_dir.join("config.toml"))
    }

    /// Load from `path` (or the default location), then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Environment variables win over the file
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(ENV_API_KEY) {
            if !key.trim().is_empty() {
                self.api_key = Some(key);
            }
        }
        if let Ok(socket) = std::env::var(ENV_DOCKER_SOCKET) {
            if !socket.trim().is_empty() {
                self.docker_socket = Some(socket);
            }
        }
    }

    /// Save configuration to `path` (or the default location)
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, contents).context("Failed to write config file")?;
        Ok(path)
    }

    /// Convert into the settings the pipelines run with
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        let connect_timeout = humantime::parse_duration(&self.connect_timeout)
            .with_context(|| format!("Invalid connect_timeout '{}'", self.connect_timeout))?;
        let exec_timeout = humantime::parse_duration(&self.exec_timeout)
            .with_context(|| format!("Invalid exec_timeout '{}'", self.exec_timeout))?;

        if self.error_marker.is_empty() {
            return Err(anyhow!("error_marker must not be empty"));
        }

        Ok(PipelineSettings {
            tools: self.tools.clone(),
            work_dir: self.work_dir.clone(),
            staging_dir: self.staging_dir.clone(),
            error_marker: self.error_marker.clone(),
            connect_requires_output: self.connect_requires_output,
            connect_timeout,
            exec_timeout,
        })
    }

    /// Create the local scratch directories
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.work_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}
