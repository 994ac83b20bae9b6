/// Service-wide constants

/// Environment variable holding the API key
pub const ENV_API_KEY: &str = "DBDOCK_API_KEY";

/// Environment variable overriding the Docker socket path
pub const ENV_DOCKER_SOCKET: &str = "DBDOCK_DOCKER_SOCKET";

/// Environment variable the CLI reads the database password from
pub const ENV_DB_PASSWORD: &str = "DBDOCK_DB_PASSWORD";

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "X-API-Key";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;

/// Largest accepted request body (uploads included)
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024 * 1024;

/// Length of generated API keys
pub const GENERATED_KEY_LEN: usize = 32;
