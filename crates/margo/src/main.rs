//! margo CLI
//!
//! Runs one named job from a configuration file against its hosts over SSH

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use color_eyre::Result;
use eyre::WrapErr;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use margo_core::{
    CommandOutcome, Config, FailurePolicy, JobReport, JobRunner, resolve_config_path,
};
use margo_exec::SshExecutor;

#[derive(Parser, Debug)]
#[command(name = "margo")]
#[command(about = "Run a named job's commands on every host over SSH", long_about = None)]
struct Cli {
    /// Location of the configuration file (ex: /tmp/config.json)
    #[arg(short, long, env = "MARGO_CONFIG")]
    config: Option<PathBuf>,

    /// Name of the job to run (ex: "My Job")
    #[arg(short, long, value_parser = NonEmptyStringValueParser::new())]
    job: String,

    /// Abort the whole run at the first failing command
    #[arg(long)]
    fail_fast: bool,

    /// Print the final report as JSON after all command output
    #[arg(long)]
    report_json: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn failure_policy(&self) -> FailurePolicy {
        if self.fail_fast {
            FailurePolicy::Abort
        } else {
            FailurePolicy::Continue
        }
    }
}

fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Failure counts only; each failed command was already printed when it finished
fn summary(report: &JobReport) -> Option<String> {
    let (unreachable, failed): (Vec<_>, Vec<_>) = report.failures().partition(|record| {
        matches!(
            &record.outcome,
            CommandOutcome::Failed { kind, .. } if kind.is_host_failure()
        )
    });
    if unreachable.is_empty() && failed.is_empty() {
        return None;
    }

    Some(format!(
        "job '{}': {} of {} commands failed ({} on unreachable hosts, {} exited with an error)",
        report.job,
        unreachable.len() + failed.len(),
        report.command_count(),
        unreachable.len(),
        failed.len()
    ))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli);

    let path = resolve_config_path(cli.config.clone(), dirs::config_dir())?;
    let config = Config::load(&path)
        .wrap_err_with(|| format!("failed to load configuration from {}", path.display()))?;

    if !config.job_names().any(|name| name == cli.job) {
        let available: Vec<_> = config.job_names().collect();
        warn!(job = %cli.job, available = ?available, "no job with this name, nothing to run");
    }

    let runner =
        JobRunner::new(Arc::new(SshExecutor::new())).with_failure_policy(cli.failure_policy());
    let report = runner
        .run_job(&config.jobs, &cli.job)
        .await
        .wrap_err_with(|| format!("job '{}' aborted", cli.job))?;

    if cli.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if let Some(line) = summary(&report) {
        eprintln!("{line}");
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use clap::CommandFactory;
    use margo_core::{CommandRecord, HostReport, TaskReport};
    use margo_exec::{CapturedOutput, FailureKind};

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_job_is_required() {
        let result = Cli::try_parse_from(["margo", "--config", "/tmp/config.json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_fail_fast_selects_abort() {
        let cli = Cli::try_parse_from(["margo", "-c", "/tmp/c.json", "-j", "Deploy", "--fail-fast"])
            .unwrap();
        assert_eq!(cli.job, "Deploy");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert_eq!(cli.failure_policy(), FailurePolicy::Abort);
    }

    #[test]
    fn test_empty_job_rejected() {
        let result = Cli::try_parse_from(["margo", "--config", "x.json", "--job", ""]);
        assert!(result.is_err());
    }

    fn record(host: &str, kind: Option<FailureKind>) -> CommandRecord {
        let outcome = match kind {
            Some(kind) => CommandOutcome::Failed {
                kind,
                message: "boom".to_string(),
            },
            None => CommandOutcome::Succeeded(CapturedOutput {
                status: 0,
                stdout: String::new(),
                stderr: String::new(),
                duration: Duration::ZERO,
            }),
        };
        CommandRecord {
            host: host.to_string(),
            user: "u".to_string(),
            command: "true".to_string(),
            outcome,
            finished_at: Utc::now(),
        }
    }

    fn report(records: Vec<CommandRecord>) -> JobReport {
        JobReport {
            job: "Deploy".to_string(),
            tasks: vec![TaskReport {
                job: "Deploy".to_string(),
                index: 0,
                hosts: vec![HostReport {
                    host: "a".to_string(),
                    commands: records,
                }],
            }],
        }
    }

    #[test]
    fn test_summary_counts_without_repeating_output() {
        let report = report(vec![
            record("a", None),
            record("b", Some(FailureKind::Connect)),
            record("c", Some(FailureKind::Command)),
            record("d", Some(FailureKind::Auth)),
        ]);

        let line = summary(&report).unwrap();
        assert_eq!(
            line,
            "job 'Deploy': 3 of 4 commands failed (2 on unreachable hosts, 1 exited with an error)"
        );
        assert!(!line.contains("boom"));
    }

    #[test]
    fn test_no_summary_on_success() {
        assert_eq!(summary(&report(vec![record("a", None)])), None);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["margo", "--job", "Deploy", "--config", "x.json"]).unwrap();
        assert_eq!(cli.failure_policy(), FailurePolicy::Continue);
        assert_eq!(cli.log_level, "warn");
        assert!(!cli.report_json);
    }
}
