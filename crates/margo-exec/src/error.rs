//! Error types for margo-exec

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::KeyError;

/// Errors that can occur while running one command on one host
#[derive(Error, Debug)]
pub enum ExecError {
    /// Credential file could not be loaded
    #[error("SSH key error: {0}")]
    Key(#[from] KeyError),

    /// Host address could not be parsed
    #[error("invalid host address: {0}")]
    Address(String),

    /// Failed to connect to remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Session channel could not be opened or driven
    #[error("session error: {0}")]
    Session(String),

    /// Remote command exited with a non-zero status
    #[error("command exited with status {status}: {stderr}")]
    CommandFailed {
        /// Exit status code
        status: u32,
        /// Stderr output
        stderr: String,
    },

    /// Channel closed before the remote end reported an exit status
    #[error("command finished without an exit status")]
    NoExitStatus,
}

/// Coarse failure category, used to tell unreachable hosts apart from failing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Key,
    Connect,
    Auth,
    Session,
    Command,
}

impl FailureKind {
    /// Whether the host itself could not be reached or logged into
    #[must_use]
    pub fn is_host_failure(self) -> bool {
        matches!(self, FailureKind::Connect | FailureKind::Auth | FailureKind::Key)
    }
}

impl ExecError {
    /// Failure category of this error
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecError::Key(_) => FailureKind::Key,
            ExecError::Address(_) | ExecError::ConnectionFailed(_) => FailureKind::Connect,
            ExecError::AuthenticationFailed(_) => FailureKind::Auth,
            ExecError::Session(_) => FailureKind::Session,
            ExecError::CommandFailed { .. } | ExecError::NoExitStatus => FailureKind::Command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_separates_host_and_command_failures() {
        let unreachable = ExecError::ConnectionFailed("refused".to_string());
        assert_eq!(unreachable.kind(), FailureKind::Connect);
        assert!(unreachable.kind().is_host_failure());

        let failed = ExecError::CommandFailed {
            status: 2,
            stderr: "no such file".to_string(),
        };
        assert_eq!(failed.kind(), FailureKind::Command);
        assert!(!failed.kind().is_host_failure());
    }

    #[test]
    fn test_display_includes_status() {
        let err = ExecError::CommandFailed {
            status: 127,
            stderr: "command not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "command exited with status 127: command not found"
        );
    }
}
