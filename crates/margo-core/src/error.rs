//! Core error types for margo-core

use thiserror::Error;
use tokio::task::JoinError;

/// Errors that can occur while loading configuration or running a job
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Configuration is missing or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read
    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    /// Configuration file could not be parsed
    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    /// A command failed while the run was configured to abort on first failure
    #[error("aborted: '{command}' as {user}@{host} failed: {reason}")]
    Aborted {
        host: String,
        user: String,
        command: String,
        reason: String,
    },

    /// A unit task panicked or was cancelled
    #[error("unit task failed: {0}")]
    Join(String),
}

impl From<JoinError> for CoreError {
    fn from(err: JoinError) -> Self {
        CoreError::Join(err.to_string())
    }
}
