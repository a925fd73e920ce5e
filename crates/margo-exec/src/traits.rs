//! Remote executor trait

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::{CapturedOutput, ConnectionInfo};

/// Runs exactly one command on exactly one host under one identity
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Connect, run `command` to completion and return its captured output
    async fn execute(
        &self,
        conn: &ConnectionInfo,
        command: &str,
    ) -> Result<CapturedOutput, ExecError>;

    fn executor_type(&self) -> &'static str;
}
