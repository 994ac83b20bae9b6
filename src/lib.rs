//! dbdock: back up and restore databases running inside Docker containers.
//!
//! The [`core`] module holds the exec orchestration pipelines; [`server`]
//! exposes them over HTTP.

pub mod cli;
pub mod core;
pub mod server;
pub mod utils;
