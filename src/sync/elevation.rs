// Elevation retry - one escalation offer and at most one re-issue per operation
use crate::error::{OperationError, OperationFailure};
use crate::io::ops::{FileOperation, OperationReport};
use crate::io::provider::{PrivilegedChannel, Prompt};
use crate::message::{Choice, Notice};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryState {
    Attempting,
    AwaitingUserElevationChoice,
    Done,
}

/// What happened during one protected run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryRun {
    pub outcome: Result<OperationReport, OperationFailure>,
    /// Number of `run_privileged` invocations.
    pub attempts: usize,
    /// Every state entered, starting with `Attempting` and ending with `Done`.
    pub trace: Vec<RetryState>,
}

impl RetryRun {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

enum Transition {
    Goto(RetryState),
    Finish(Result<OperationReport, OperationFailure>),
}

pub struct ElevationRetry<'a> {
    channel: &'a dyn PrivilegedChannel,
    prompt: &'a dyn Prompt,
}

impl<'a> ElevationRetry<'a> {
    pub fn new(channel: &'a dyn PrivilegedChannel, prompt: &'a dyn Prompt) -> Self {
        Self { channel, prompt }
    }

    pub async fn run(&self, operation: &FileOperation) -> RetryRun {
        let mut state = RetryState::Attempting;
        let mut trace = vec![state];
        let mut attempts = 0;
        let mut retried = false;
        let mut denied_path = PathBuf::new();

        let outcome = loop {
            let next = match state {
                RetryState::Attempting => {
                    attempts += 1;
                    match self.channel.run_privileged(operation).await {
                        Ok(report) => Transition::Finish(Ok(report)),
                        Err(OperationError::AccessDenied(path)) if !retried => {
                            denied_path = path;
                            Transition::Goto(RetryState::AwaitingUserElevationChoice)
                        }
                        Err(err) => Transition::Finish(Err(terminal(err))),
                    }
                }
                RetryState::AwaitingUserElevationChoice => {
                    let notice = Notice::Unauthorized {
                        kind: operation.kind(),
                        path: denied_path.clone(),
                    };
                    match self.prompt.confirm(&notice.dialog()).await {
                        Choice::Primary => match self.channel.elevate().await {
                            Ok(()) => {
                                retried = true;
                                Transition::Goto(RetryState::Attempting)
                            }
                            Err(denied) => {
                                let notice = Notice::DenyElevation(denied.reason.clone());
                                self.prompt.confirm(&notice.dialog()).await;
                                Transition::Finish(Err(OperationFailure::ElevationFailed(denied)))
                            }
                        },
                        Choice::Secondary | Choice::Dismissed => {
                            Transition::Finish(Err(OperationFailure::ElevationDeclined))
                        }
                    }
                }
                RetryState::Done => Transition::Finish(Err(OperationFailure::Unexpected(
                    "retry loop resumed after completion".to_string(),
                ))),
            };

            match next {
                Transition::Goto(next_state) => {
                    debug!(?state, ?next_state, "elevation retry transition");
                    state = next_state;
                    trace.push(state);
                }
                Transition::Finish(result) => {
                    trace.push(RetryState::Done);
                    break result;
                }
            }
        };

        if outcome.is_ok() {
            info!(kind = ?operation.kind(), attempts, "privileged operation completed");
        }
        RetryRun {
            outcome,
            attempts,
            trace,
        }
    }
}

fn terminal(err: OperationError) -> OperationFailure {
    match err {
        OperationError::AccessDenied(path) => OperationFailure::DeniedAfterElevation(path),
        OperationError::InUse(path) => OperationFailure::InUse(path),
        OperationError::NotFound(path) => OperationFailure::NotFound(path),
        OperationError::AlreadyExists(path) => OperationFailure::AlreadyExists(path),
        OperationError::Other(message) => OperationFailure::Unexpected(message),
    }
}
