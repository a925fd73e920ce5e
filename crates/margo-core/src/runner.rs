//! `JobRunner`: job selection and task-level dispatch

use std::sync::Arc;

use kameo::prelude::*;
use tracing::{info, instrument};

use margo_exec::RemoteExecutor;

use crate::config::{Job, Task};
use crate::error::CoreError;
use crate::orchestrator::TaskOrchestrator;
use crate::output::{GetSummary, OutputActor, OutputActorArgs};
use crate::policy::{FailurePolicy, SchedulingPolicy, fan_out};
use crate::report::JobReport;

/// A task picked for execution, tagged with where it came from
#[derive(Debug, Clone)]
pub struct SelectedTask {
    pub job: String,
    pub index: usize,
    pub task: Arc<Task>,
}

/// Every task of every job named exactly `job_name`, in document order
#[must_use]
pub fn select_tasks(jobs: &[Job], job_name: &str) -> Vec<SelectedTask> {
    jobs.iter()
        .filter(|job| job.name == job_name)
        .flat_map(|job| {
            job.tasks.iter().enumerate().map(|(index, task)| SelectedTask {
                job: job.name.clone(),
                index,
                task: Arc::new(task.clone()),
            })
        })
        .collect()
}

/// Runs all tasks of a job concurrently
pub struct JobRunner {
    executor: Arc<dyn RemoteExecutor>,
    failure_policy: FailurePolicy,
    echo: bool,
}

impl JobRunner {
    /// Create a runner that prints output and isolates failures per command
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            executor,
            failure_policy: FailurePolicy::default(),
            echo: true,
        }
    }

    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Whether command output is printed as units finish
    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Run every task of every job named `job_name` and wait for all of them
    ///
    /// No matching job is not an error: nothing runs and the report is empty.
    ///
    /// # Errors
    /// Returns `CoreError::Aborted` under `FailurePolicy::Abort` when any
    /// command fails, or `CoreError::Join` if a unit panicked
    #[instrument(skip(self, jobs), fields(job = %job_name))]
    pub async fn run_job(&self, jobs: &[Job], job_name: &str) -> Result<JobReport, CoreError> {
        let selected = select_tasks(jobs, job_name);
        if selected.is_empty() {
            info!("no job matched, nothing to run");
            return Ok(JobReport {
                job: job_name.to_string(),
                tasks: Vec::new(),
            });
        }

        info!(
            tasks = selected.len(),
            executor = self.executor.executor_type(),
            failure_policy = ?self.failure_policy,
            "starting job"
        );

        let output = OutputActor::spawn(OutputActorArgs { echo: self.echo });
        let orchestrator =
            TaskOrchestrator::new(self.executor.clone(), output.clone(), self.failure_policy);

        // Task-level concurrency is fixed
        let result = fan_out(SchedulingPolicy::Concurrent, selected, move |selected| {
            let orchestrator = orchestrator.clone();
            async move {
                orchestrator
                    .run_task(selected.job, selected.index, selected.task)
                    .await
            }
        })
        .await;

        if let Ok(summary) = output.ask(GetSummary).await {
            info!(
                emitted = summary.emitted,
                failed = summary.failed,
                "job finished"
            );
        }
        output.stop_gracefully().await.ok();

        let tasks = result?;
        Ok(JobReport {
            job: job_name.to_string(),
            tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Command, TaskOptions};

    fn job(name: &str, hosts: &[&str]) -> Job {
        Job {
            name: name.to_string(),
            tasks: vec![Task {
                hosts: hosts.iter().map(|h| (*h).to_string()).collect(),
                key_path: "/keys/id".into(),
                commands: vec![Command::new("u", "true")],
                options: TaskOptions::default(),
            }],
        }
    }

    #[test]
    fn test_select_exact_match_with_duplicates() {
        let jobs = vec![
            job("Deploy", &["a"]),
            job("deploy", &["b"]),
            job("Deploy", &["c"]),
        ];

        let selected = select_tasks(&jobs, "Deploy");
        let hosts: Vec<_> = selected.iter().map(|s| s.task.hosts[0].as_str()).collect();
        assert_eq!(hosts, vec!["a", "c"]);
    }

    #[test]
    fn test_select_unknown_job() {
        let jobs = vec![job("Deploy", &["a"])];
        assert!(select_tasks(&jobs, "DoesNotExist").is_empty());
    }

    #[test]
    fn test_select_keeps_task_index() {
        let mut deploy = job("Deploy", &["a"]);
        deploy.tasks.push(deploy.tasks[0].clone());

        let selected = select_tasks(&[deploy], "Deploy");
        let indices: Vec<_> = selected.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }
}
