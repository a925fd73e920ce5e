//! margo-exec: Remote command execution
//!
//! Loads SSH credentials and runs single commands on single hosts via russh

pub mod error;
pub mod keys;
pub mod result;
pub mod ssh;
pub mod traits;

pub use error::{ExecError, FailureKind};
pub use keys::{CredentialStore, KeyError};
pub use result::{CapturedOutput, ConnectionInfo};
pub use ssh::SshExecutor;
pub use traits::RemoteExecutor;
