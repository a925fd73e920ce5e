//! SSH command execution using russh crate

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use russh::keys::ssh_key::{self, HashAlg};
use russh::keys::PrivateKeyWithHashAlg;
use russh::{ChannelMsg, Disconnect, client};
use tracing::{debug, info, instrument, warn};

use crate::error::ExecError;
use crate::keys::CredentialStore;
use crate::result::{CapturedOutput, ConnectionInfo};
use crate::traits::RemoteExecutor;

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler {
    host: String,
}

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host keys are not verified
        debug!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "accepting server key"
        );
        Ok(true)
    }
}

type SshSession = client::Handle<SshClientHandler>;

/// SSH command executor
///
/// Every call to [`RemoteExecutor::execute`] loads the key, opens its own
/// connection and tears it down again. Nothing is cached between calls, so
/// one executor can be shared by any number of concurrent command-units.
#[derive(Clone)]
pub struct SshExecutor {
    config: Arc<client::Config>,
}

impl std::fmt::Debug for SshExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshExecutor").finish_non_exhaustive()
    }
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SshExecutor {
    /// Create a new SSH executor with the default russh client configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Arc::new(client::Config::default()),
        }
    }

    /// Open a connection and authenticate with the first accepted identity
    async fn connect(
        &self,
        conn: &ConnectionInfo,
        credentials: &CredentialStore,
    ) -> Result<SshSession, ExecError> {
        info!(
            host = %conn.host,
            port = conn.port,
            user = %conn.user,
            "connecting to SSH"
        );

        let handler = SshClientHandler {
            host: conn.host.clone(),
        };
        let mut session = client::connect(self.config.clone(), (&conn.host[..], conn.port), handler)
            .await
            .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();

        for key in credentials.identities() {
            let auth_res = session
                .authenticate_publickey(
                    &conn.user,
                    PrivateKeyWithHashAlg::new(key.clone(), hash_alg),
                )
                .await
                .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;

            if auth_res.success() {
                info!(host = %conn.host, user = %conn.user, "SSH connected and authenticated");
                return Ok(session);
            }
        }

        Err(ExecError::AuthenticationFailed(format!(
            "public key rejected for {}@{}",
            conn.user, conn.host
        )))
    }

    /// Run one command on an open session and wait for the channel to close
    async fn run_on_session(
        session: &SshSession,
        command: &str,
    ) -> Result<(Option<u32>, Vec<u8>, Vec<u8>), ExecError> {
        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::Session(e.to_string()))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| ExecError::Session(e.to_string()))?;

        let mut status = None;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        // Exit status may arrive after EOF, so read until the channel closes
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    status = Some(exit_status);
                }
                Some(ChannelMsg::Close) | None => break,
                _ => {}
            }
        }

        Ok((status, stdout, stderr))
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    #[instrument(skip(self, conn), fields(host = %conn.host, user = %conn.user))]
    async fn execute(
        &self,
        conn: &ConnectionInfo,
        command: &str,
    ) -> Result<CapturedOutput, ExecError> {
        let start = Instant::now();

        let credentials = CredentialStore::load(&conn.key_path)?;
        let session = self.connect(conn, &credentials).await?;

        debug!(command = %command, "executing remote command");
        let result = Self::run_on_session(&session, command).await;

        if let Err(e) = session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            warn!(host = %conn.host, error = %e, "failed to disconnect cleanly");
        }

        let (status, stdout, stderr) = result?;
        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&stdout).to_string();
        let stderr = String::from_utf8_lossy(&stderr).to_string();

        debug!(
            command = %command,
            status = ?status,
            duration = ?duration,
            "remote command completed"
        );

        let status = status.ok_or(ExecError::NoExitStatus)?;
        let output = CapturedOutput {
            status,
            stdout,
            stderr,
            duration,
        };
        if output.success() {
            Ok(output)
        } else {
            Err(ExecError::CommandFailed {
                status,
                stderr: output.stderr,
            })
        }
    }

    fn executor_type(&self) -> &'static str {
        "ssh"
    }
}
