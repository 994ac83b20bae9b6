/// CLI argument parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::utils::{DEFAULT_HOST, DEFAULT_PORT};

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser)]
#[command(name = "dbdock")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to ~/.config/dbdock/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Address to bind
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Allow cross-origin requests from any origin
        #[arg(long)]
        cors: bool,
    },

    /// Dump a database from a container into a local .sql.gz file
    Backup {
        /// Container name or id
        container: String,

        /// Database to dump
        database: String,

        /// Output file (defaults to <database>_<timestamp>.sql.gz)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Database root password (or DBDOCK_DB_PASSWORD)
        #[arg(long)]
        password: Option<String>,
    },

    /// Load a local .sql or .sql.gz file into a database inside a container
    Restore {
        /// Container name or id
        container: String,

        /// Database to restore into
        database: String,

        /// Dump file to load
        file: PathBuf,

        /// Treat the file as gzip regardless of its extension
        #[arg(long)]
        gzip: bool,

        /// Database root password (or DBDOCK_DB_PASSWORD)
        #[arg(long)]
        password: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a default config file with a freshly generated API key
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
