//! Configuration types for jobs, tasks and commands
//!
//! The on-disk document is JSON with PascalCase keys. Lowercase keys are
//! accepted as well, and a `.toml` file with the same shape can be used instead.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::policy::SchedulingPolicy;

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "Jobs", alias = "jobs", default)]
    pub jobs: Vec<Job>,
}

/// A named collection of tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    #[serde(rename = "Tasks", alias = "tasks", default)]
    pub tasks: Vec<Task>,
}

/// Run `commands` on every host in `hosts`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Host addresses (`host` or `host:port`)
    #[serde(rename = "Hosts", alias = "hosts", default)]
    pub hosts: Vec<String>,
    /// Private key used for every connection of this task
    #[serde(rename = "Key", alias = "key", default)]
    pub key_path: PathBuf,
    #[serde(rename = "Commands", alias = "commands", default)]
    pub commands: Vec<Command>,
    #[serde(rename = "Options", alias = "options", default)]
    pub options: TaskOptions,
}

/// One shell command and the remote user to run it as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "User", alias = "user")]
    pub user: String,
    #[serde(rename = "Exec", alias = "exec")]
    pub exec: String,
}

impl Command {
    pub fn new(user: impl Into<String>, exec: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            exec: exec.into(),
        }
    }
}

/// Per-level sync flags; `true` runs that level one unit at a time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawTaskOptions", into = "RawTaskOptions")]
pub struct TaskOptions {
    pub hosts_sync: bool,
    pub commands_sync: bool,
}

impl TaskOptions {
    /// Scheduling policy for the hosts of a task
    #[must_use]
    pub fn host_policy(&self) -> SchedulingPolicy {
        SchedulingPolicy::from_sync(self.hosts_sync)
    }

    /// Scheduling policy for the commands of each host
    #[must_use]
    pub fn command_policy(&self) -> SchedulingPolicy {
        SchedulingPolicy::from_sync(self.commands_sync)
    }
}

// Nested document shape: {"Hosts": {"Sync": bool}, "Commands": {"Sync": bool}}
#[derive(Default, Serialize, Deserialize)]
struct RawTaskOptions {
    #[serde(rename = "Hosts", alias = "hosts", default)]
    hosts: LevelOptions,
    #[serde(rename = "Commands", alias = "commands", default)]
    commands: LevelOptions,
}

#[derive(Default, Serialize, Deserialize)]
struct LevelOptions {
    #[serde(rename = "Sync", alias = "sync", default)]
    sync: bool,
}

impl From<RawTaskOptions> for TaskOptions {
    fn from(raw: RawTaskOptions) -> Self {
        Self {
            hosts_sync: raw.hosts.sync,
            commands_sync: raw.commands.sync,
        }
    }
}

impl From<TaskOptions> for RawTaskOptions {
    fn from(options: TaskOptions) -> Self {
        Self {
            hosts: LevelOptions {
                sync: options.hosts_sync,
            },
            commands: LevelOptions {
                sync: options.commands_sync,
            },
        }
    }
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Pick the format from the file extension, defaulting to JSON
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or fails validation
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::Io {
            path: display.clone(),
            reason: e.to_string(),
        })?;

        let config = Self::parse(&content, ConfigFormat::from_path(path)).map_err(|e| match e {
            CoreError::Parse { reason, .. } => CoreError::Parse {
                path: display.clone(),
                reason,
            },
            other => other,
        })?;

        debug!(path = %path.display(), jobs = config.jobs.len(), "loaded configuration");
        Ok(config)
    }

    /// Parse a configuration document
    ///
    /// Keys are not checked here; a task without a usable key fails per
    /// command when it runs, so unselected jobs never block a run.
    ///
    /// # Errors
    /// Returns `CoreError::Parse` for malformed documents
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, CoreError> {
        let config = match format {
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| CoreError::Parse {
                path: "<json>".to_string(),
                reason: e.to_string(),
            })?,
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| CoreError::Parse {
                path: "<toml>".to_string(),
                reason: e.to_string(),
            })?,
        };
        Ok(config)
    }

    /// Names of all jobs in document order, duplicates included
    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|j| j.name.as_str())
    }
}

/// Resolve the configuration path: explicit path, `./margo.json`, then
/// `margo/margo.json` under `config_dir`
///
/// # Errors
/// Returns `CoreError::Config` when no candidate exists
pub fn resolve_config_path(
    explicit: Option<PathBuf>,
    config_dir: Option<PathBuf>,
) -> Result<PathBuf, CoreError> {
    if let Some(path) = explicit {
        return Ok(path);
    }

    let candidates = [
        Some(PathBuf::from("margo.json")),
        config_dir.map(|dir| dir.join("margo").join("margo.json")),
    ];

    candidates
        .into_iter()
        .flatten()
        .find(|path| path.exists())
        .ok_or_else(|| {
            CoreError::Config(
                "missing config (ex: --config \"/tmp/config.json\")".to_string(),
            )
        })
}
