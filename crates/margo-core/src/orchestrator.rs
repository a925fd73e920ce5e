//! `TaskOrchestrator`: host × command fan-out for a single task
//!
//! A task runs one host-unit per host and, inside each host-unit, one
//! command-unit per command. Both levels go through [`fan_out`], so the
//! `TaskOptions` flags only pick a [`SchedulingPolicy`](crate::policy::SchedulingPolicy).
//! Each level joins all of its children before it completes.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use kameo::actor::ActorRef;
use tracing::{debug, info, instrument, warn};

use margo_exec::{ConnectionInfo, RemoteExecutor};

use crate::config::{Command, Task};
use crate::error::CoreError;
use crate::output::{Emit, OutputActor};
use crate::policy::{FailurePolicy, fan_out};
use crate::report::{CommandOutcome, CommandRecord, HostReport, TaskReport};

/// Drives a `RemoteExecutor` across every host and command of a task
#[derive(Clone)]
pub struct TaskOrchestrator {
    executor: Arc<dyn RemoteExecutor>,
    output: ActorRef<OutputActor>,
    failure_policy: FailurePolicy,
}

impl TaskOrchestrator {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        output: ActorRef<OutputActor>,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            executor,
            output,
            failure_policy,
        }
    }

    /// Run every command on every host of `task` and wait for all of them
    ///
    /// # Errors
    /// Returns `CoreError::Aborted` under `FailurePolicy::Abort` when any
    /// command fails, or `CoreError::Join` if a unit panicked
    #[instrument(skip_all, fields(job = %job, task = index))]
    pub async fn run_task(
        &self,
        job: String,
        index: usize,
        task: Arc<Task>,
    ) -> Result<TaskReport, CoreError> {
        info!(
            hosts = task.hosts.len(),
            commands = task.commands.len(),
            host_policy = ?task.options.host_policy(),
            command_policy = ?task.options.command_policy(),
            "starting task"
        );

        let this = self.clone();
        let task_ref = task.clone();
        let hosts = fan_out(task.options.host_policy(), task.hosts.clone(), move |host| {
            let this = this.clone();
            let task = task_ref.clone();
            async move { this.run_host(host, task).await }
        })
        .await?;

        info!("task finished");
        Ok(TaskReport { job, index, hosts })
    }

    /// Host-unit: run the full command list against one host
    async fn run_host(&self, host: String, task: Arc<Task>) -> Result<HostReport, CoreError> {
        debug!(host = %host, "starting host");

        let this = self.clone();
        let unit_host = host.clone();
        let key_path = task.key_path.clone();
        let commands = fan_out(
            task.options.command_policy(),
            task.commands.clone(),
            move |command| {
                let this = this.clone();
                let host = unit_host.clone();
                let key_path = key_path.clone();
                async move { this.run_command(host, command, key_path).await }
            },
        )
        .await?;

        debug!(host = %host, "host finished");
        Ok(HostReport { host, commands })
    }

    /// Command-unit: one command on one host, emitted as soon as it finishes
    async fn run_command(
        &self,
        host: String,
        command: Command,
        key_path: PathBuf,
    ) -> Result<CommandRecord, CoreError> {
        debug!(host = %host, user = %command.user, command = %command.exec, "starting command");

        let result = match ConnectionInfo::from_address(&host, &command.user, key_path) {
            Ok(conn) => self.executor.execute(&conn, &command.exec).await,
            Err(e) => Err(e),
        };

        let record = CommandRecord {
            host,
            user: command.user,
            command: command.exec,
            outcome: result.into(),
            finished_at: Utc::now(),
        };

        if let Err(e) = self.output.ask(Emit(record.clone())).await {
            warn!(error = ?e, "output sink unavailable");
        }

        match (&record.outcome, self.failure_policy) {
            (CommandOutcome::Failed { message, .. }, FailurePolicy::Abort) => {
                Err(CoreError::Aborted {
                    host: record.host.clone(),
                    user: record.user.clone(),
                    command: record.command.clone(),
                    reason: message.clone(),
                })
            }
            _ => Ok(record),
        }
    }
}
