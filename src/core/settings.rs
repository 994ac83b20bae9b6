/// Runtime knobs shared by the backup and restore pipelines

use std::path::PathBuf;
use std::time::Duration;

use super::commands::DatabaseTools;

/// Substring in connectivity-test output that marks a failed login
pub const DEFAULT_ERROR_MARKER: &str = "ERROR";

/// Container-side directory uploaded archives are extracted into
pub const DEFAULT_STAGING_DIR: &str = "/tmp";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub tools: DatabaseTools,
    /// Local directory for dump files and restore archives
    pub work_dir: PathBuf,
    pub staging_dir: String,
    pub error_marker: String,
    /// Treat a connectivity test that prints nothing as a failure
    pub connect_requires_output: bool,
    pub connect_timeout: Duration,
    pub exec_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            tools: DatabaseTools::default(),
            work_dir: std::env::temp_dir(),
            staging_dir: DEFAULT_STAGING_DIR.to_string(),
            error_marker: DEFAULT_ERROR_MARKER.to_string(),
            connect_requires_output: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
        }
    }
}
