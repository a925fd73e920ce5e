//! Result and connection types for command execution

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Output captured from one completed remote command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedOutput {
    /// Exit status code (0 for success)
    pub status: u32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken from connect to channel close
    pub duration: Duration,
}

impl CapturedOutput {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Everything needed to open one authenticated SSH connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Host name or IP address, without port
    pub host: String,
    /// Port (default 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username
    pub user: String,
    /// Path to the private key file
    pub key_path: PathBuf,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ConnectionInfo {
    /// Create connection info from a `host`, `host:port` or `[v6]:port` address
    ///
    /// # Errors
    /// Returns `ExecError::Address` if the address is empty or the port is not a number
    pub fn from_address(
        address: &str,
        user: impl Into<String>,
        key_path: impl Into<PathBuf>,
    ) -> Result<Self, ExecError> {
        let (host, port) = split_address(address)?;
        let info = Self {
            host,
            port: DEFAULT_PORT,
            user: user.into(),
            key_path: key_path.into(),
        };
        Ok(match port {
            Some(port) => info.with_port(port),
            None => info,
        })
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

fn split_address(address: &str) -> Result<(String, Option<u16>), ExecError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ExecError::Address("empty address".to_string()));
    }

    // [v6] or [v6]:port
    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| ExecError::Address(address.to_string()))?;
        let port = match tail.strip_prefix(':') {
            Some(port) => Some(parse_port(address, port)?),
            None if tail.is_empty() => None,
            None => return Err(ExecError::Address(address.to_string())),
        };
        return Ok((host.to_string(), port));
    }

    match address.rsplit_once(':') {
        // A bare v6 address has more than one colon and no port
        Some((host, _)) if host.contains(':') => Ok((address.to_string(), None)),
        Some((host, port)) if !host.is_empty() => {
            Ok((host.to_string(), Some(parse_port(address, port)?)))
        }
        Some(_) => Err(ExecError::Address(address.to_string())),
        None => Ok((address.to_string(), None)),
    }
}

fn parse_port(address: &str, port: &str) -> Result<u16, ExecError> {
    port.parse()
        .map_err(|_| ExecError::Address(format!("{address}: invalid port '{port}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(address: &str) -> Result<(String, u16), ExecError> {
        ConnectionInfo::from_address(address, "root", "/tmp/key").map(|c| (c.host, c.port))
    }

    #[test]
    fn test_address_forms() {
        assert_eq!(parse("web1").unwrap(), ("web1".to_string(), 22));
        assert_eq!(parse("10.0.0.5:2222").unwrap(), ("10.0.0.5".to_string(), 2222));
        assert_eq!(parse("[::1]:2200").unwrap(), ("::1".to_string(), 2200));
        assert_eq!(parse("[fe80::1]").unwrap(), ("fe80::1".to_string(), 22));
        assert_eq!(parse("fe80::1").unwrap(), ("fe80::1".to_string(), 22));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(matches!(parse(""), Err(ExecError::Address(_))));
        assert!(matches!(parse("web1:ssh"), Err(ExecError::Address(_))));
        assert!(matches!(parse(":22"), Err(ExecError::Address(_))));
        assert!(matches!(parse("[::1"), Err(ExecError::Address(_))));
    }

    #[test]
    fn test_with_port_overrides() {
        let info = ConnectionInfo::from_address("web1", "deploy", "/keys/id")
            .unwrap()
            .with_port(8022);
        assert_eq!(info.port, 8022);
        assert_eq!(info.user, "deploy");
    }
}
