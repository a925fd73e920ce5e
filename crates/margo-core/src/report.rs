//! Per-command records and the reports they roll up into

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use margo_exec::{CapturedOutput, ExecError, FailureKind};

/// Result of one command-unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutcome {
    Succeeded(CapturedOutput),
    Failed { kind: FailureKind, message: String },
}

impl From<Result<CapturedOutput, ExecError>> for CommandOutcome {
    fn from(result: Result<CapturedOutput, ExecError>) -> Self {
        match result {
            Ok(output) => CommandOutcome::Succeeded(output),
            Err(err) => CommandOutcome::Failed {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }
}

/// One command run against one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub host: String,
    pub user: String,
    pub command: String,
    pub outcome: CommandOutcome,
    pub finished_at: DateTime<Utc>,
}

impl CommandRecord {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, CommandOutcome::Succeeded(_))
    }

    /// Captured stdout, if the command succeeded
    #[must_use]
    pub fn stdout(&self) -> Option<&str> {
        match &self.outcome {
            CommandOutcome::Succeeded(output) => Some(&output.stdout),
            CommandOutcome::Failed { .. } => None,
        }
    }

    /// `"<command> - <user>@<host>:"`
    #[must_use]
    pub fn header(&self) -> String {
        format!("{} - {}@{}:", self.command, self.user, self.host)
    }
}

impl fmt::Display for CommandRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            CommandOutcome::Succeeded(output) => {
                writeln!(f, "{}", self.header())?;
                writeln!(f, "{}", output.stdout)
            }
            CommandOutcome::Failed { message, .. } => {
                writeln!(f, "{} {}", self.header(), message)
            }
        }
    }
}

/// All commands of a task against one host, in command-list order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostReport {
    pub host: String,
    pub commands: Vec<CommandRecord>,
}

/// All hosts of one task, in host-list order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    /// Name of the job the task belongs to
    pub job: String,
    /// Position of the task within its job
    pub index: usize,
    pub hosts: Vec<HostReport>,
}

impl TaskReport {
    /// Every command record of the task, host by host
    pub fn records(&self) -> impl Iterator<Item = &CommandRecord> {
        self.hosts.iter().flat_map(|h| h.commands.iter())
    }
}

/// Everything that ran for one job name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job: String,
    pub tasks: Vec<TaskReport>,
}

impl JobReport {
    /// Every command record of the run
    pub fn records(&self) -> impl Iterator<Item = &CommandRecord> {
        self.tasks.iter().flat_map(TaskReport::records)
    }

    /// Number of command-units that completed, successfully or not
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.records().count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CommandRecord> {
        self.records().filter(|r| !r.succeeded())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}
