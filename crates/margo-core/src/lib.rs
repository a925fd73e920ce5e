//! margo-core: Job execution engine
//!
//! Selects the tasks of a job and fans each one out over its hosts and
//! commands, with per-level sequential or concurrent scheduling.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod policy;
pub mod report;
pub mod runner;

pub use config::{Command, Config, ConfigFormat, Job, Task, TaskOptions, resolve_config_path};
pub use error::CoreError;
pub use orchestrator::TaskOrchestrator;
pub use output::{Emit, GetSummary, OutputActor, OutputActorArgs, OutputSummary};
pub use policy::{FailurePolicy, SchedulingPolicy, fan_out};
pub use report::{CommandOutcome, CommandRecord, HostReport, JobReport, TaskReport};
pub use runner::{JobRunner, SelectedTask, select_tasks};
