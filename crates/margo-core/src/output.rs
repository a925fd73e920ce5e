//! `OutputActor`: serialized output emission
//!
//! Command-units finish in any order on any worker thread. Each one hands its
//! record to this actor, which prints it as one uninterrupted block and keeps
//! running totals for the end-of-run summary.

use std::io::Write;

use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use kameo_macros::Reply;
use tracing::{debug, error, info, warn};

use crate::error::CoreError;
use crate::report::{CommandOutcome, CommandRecord};

/// Arguments for spawning an `OutputActor`
#[derive(Debug, Clone, Default)]
pub struct OutputActorArgs {
    /// Print records to stdout/stderr; when false records are only counted
    pub echo: bool,
}

/// Single writer for command output
pub struct OutputActor {
    echo: bool,
    emitted: usize,
    failed: usize,
}

/// Print one finished command
#[derive(Debug)]
pub struct Emit(pub CommandRecord);

/// Ask for the totals so far
#[derive(Debug)]
pub struct GetSummary;

/// Totals of emitted records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Reply)]
pub struct OutputSummary {
    pub emitted: usize,
    pub failed: usize,
}

impl Actor for OutputActor {
    type Args = OutputActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(id = %actor_ref.id(), echo = args.echo, "OutputActor starting");

        Ok(Self {
            echo: args.echo,
            emitted: 0,
            failed: 0,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(
            reason = ?reason,
            emitted = self.emitted,
            failed = self.failed,
            "OutputActor stopping"
        );
        Ok(())
    }
}

impl Message<Emit> for OutputActor {
    type Reply = ();

    async fn handle(&mut self, msg: Emit, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let record = msg.0;
        self.emitted += 1;

        if let CommandOutcome::Failed { kind, message } = &record.outcome {
            self.failed += 1;
            // The echoed block already carries the failure
            if self.echo {
                debug!(host = %record.host, command = %record.command, kind = ?kind, "command failed");
            } else {
                error!(
                    host = %record.host,
                    user = %record.user,
                    command = %record.command,
                    kind = ?kind,
                    error = %message,
                    "command failed"
                );
            }
        }

        if !self.echo {
            return;
        }

        let written = if record.succeeded() {
            write!(std::io::stdout().lock(), "{record}")
        } else {
            write!(std::io::stderr().lock(), "{record}")
        };
        if let Err(e) = written {
            warn!(error = %e, "failed to write command output");
        }
    }
}

impl Message<GetSummary> for OutputActor {
    type Reply = OutputSummary;

    async fn handle(
        &mut self,
        _msg: GetSummary,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        OutputSummary {
            emitted: self.emitted,
            failed: self.failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use margo_exec::FailureKind;

    use super::*;

    fn record(outcome: CommandOutcome) -> CommandRecord {
        CommandRecord {
            host: "a".to_string(),
            user: "u".to_string(),
            command: "echo 1".to_string(),
            outcome,
            finished_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_summary_counts_failures() {
        let actor_ref = OutputActor::spawn(OutputActorArgs { echo: false });

        let failed = CommandOutcome::Failed {
            kind: FailureKind::Command,
            message: "exit 1".to_string(),
        };
        actor_ref.ask(Emit(record(failed.clone()))).await.unwrap();
        actor_ref.ask(Emit(record(failed))).await.unwrap();

        let summary = actor_ref.ask(GetSummary).await.unwrap();
        assert_eq!(
            summary,
            OutputSummary {
                emitted: 2,
                failed: 2
            }
        );

        actor_ref.stop_gracefully().await.unwrap();
    }
}
