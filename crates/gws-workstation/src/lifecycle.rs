//! Workstation lifecycle state machine
//!
//! Every command is resolved against the observed [`RemoteState`] through
//! [`plan`], an explicit `(state, command)` transition table. Mutations block
//! on the operation's own completion wait; only a workstation that is already
//! STARTING is watched by polling.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use gws_core::config::LifecycleSettings;
use gws_core::{LifecycleError, RemoteHandle, RemoteState};

use crate::api::WorkstationApi;

/// Requested lifecycle command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
}

/// What to do for a given `(state, command)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Already in the requested state
    AlreadyThere,
    /// Issue the mutation and wait for its operation
    Issue,
    /// A start is already in flight; watch it by polling
    PollUntilRunning,
    /// Leave the workstation alone
    Ignore,
}

/// The lifecycle transition table
pub fn plan(state: RemoteState, command: Command) -> Action {
    use RemoteState::*;

    match (command, state) {
        (Command::Start, Running) => Action::AlreadyThere,
        (Command::Start, Stopped) => Action::Issue,
        (Command::Start, Starting) => Action::PollUntilRunning,
        (Command::Start, Stopping | Unknown) => Action::Ignore,

        (Command::Stop, Stopped) => Action::AlreadyThere,
        (Command::Stop, Running | Starting | Stopping | Unknown) => Action::Issue,
    }
}

/// Terminal result of a lifecycle command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No call was needed
    AlreadyInState(RemoteState),
    /// The workstation moved between states
    Transitioned { from: RemoteState, to: RemoteState },
    /// The observed state does not allow the command; nothing was done
    Ignored(RemoteState),
    /// The workstation was deleted
    Deleted,
    /// The operator declined the deletion
    Aborted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::AlreadyInState(state) => write!(f, "already {}", state),
            Outcome::Transitioned { from, to } => write!(f, "{} -> {}", from, to),
            Outcome::Ignored(state) => write!(f, "nothing to do while {}", state),
            Outcome::Deleted => write!(f, "deleted"),
            Outcome::Aborted => write!(f, "aborted"),
        }
    }
}

/// Bounded polling schedule for a STARTING workstation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    /// Longest time the schedule sleeps in total
    pub fn budget(&self) -> Duration {
        self.interval
            .checked_mul(self.max_attempts)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&LifecycleSettings::default())
    }
}

impl From<&LifecycleSettings> for PollPolicy {
    fn from(settings: &LifecycleSettings) -> Self {
        Self {
            interval: settings.poll_interval,
            max_attempts: settings.max_poll_attempts,
        }
    }
}

/// Source of the typed-back name that authorizes a deletion
#[async_trait]
pub trait Confirm: Send + Sync {
    /// Show `prompt` and return the operator's answer
    async fn ask(&self, prompt: &str) -> std::io::Result<String>;
}

/// Reads the confirmation from the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn ask(&self, prompt: &str) -> std::io::Result<String> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.write_all(b" ").await?;
        stdout.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(line)
    }
}

/// Drives a workstation towards the requested state
pub struct LifecycleController {
    api: Arc<dyn WorkstationApi>,
    poll: PollPolicy,
}

impl LifecycleController {
    pub fn new(api: Arc<dyn WorkstationApi>, poll: PollPolicy) -> Self {
        Self { api, poll }
    }

    /// Bring the workstation to RUNNING
    pub async fn start(
        &self,
        handle: &RemoteHandle,
        cancel: &CancellationToken,
    ) -> Result<Outcome, LifecycleError> {
        let state = cancellable(cancel, self.api.get_state(handle)).await??;
        tracing::debug!("Workstation {} is {}", handle, state);

        match plan(state, Command::Start) {
            Action::AlreadyThere => {
                tracing::info!("Workstation {} is already running", handle);
                Ok(Outcome::AlreadyInState(state))
            }
            Action::Issue => {
                tracing::info!("Starting workstation {}", handle);
                let operation = cancellable(cancel, self.api.start(handle)).await??;
                cancellable(cancel, self.api.wait(&operation)).await??;

                let to = cancellable(cancel, self.api.get_state(handle)).await??;
                tracing::info!("Workstation {} is {}", handle, to);
                Ok(Outcome::Transitioned { from: state, to })
            }
            Action::PollUntilRunning => {
                tracing::info!("Workstation {} is starting, waiting until it is running", handle);
                self.poll_until_running(handle, cancel).await?;
                Ok(Outcome::Transitioned {
                    from: state,
                    to: RemoteState::Running,
                })
            }
            Action::Ignore => {
                tracing::info!("Workstation {} is {}, not starting", handle, state);
                Ok(Outcome::Ignored(state))
            }
        }
    }

    /// Bring the workstation to STOPPED
    pub async fn stop(
        &self,
        handle: &RemoteHandle,
        cancel: &CancellationToken,
    ) -> Result<Outcome, LifecycleError> {
        let state = cancellable(cancel, self.api.get_state(handle)).await??;
        tracing::debug!("Workstation {} is {}", handle, state);

        match plan(state, Command::Stop) {
            Action::AlreadyThere => {
                tracing::info!("Workstation {} is already stopped", handle);
                Ok(Outcome::AlreadyInState(state))
            }
            _ => {
                tracing::info!("Stopping workstation {}", handle);
                let operation = cancellable(cancel, self.api.stop(handle)).await??;
                cancellable(cancel, self.api.wait(&operation)).await??;
                tracing::info!("Workstation {} stopped", handle);
                Ok(Outcome::Transitioned {
                    from: state,
                    to: RemoteState::Stopped,
                })
            }
        }
    }

    /// Stop, then start
    pub async fn restart(
        &self,
        handle: &RemoteHandle,
        cancel: &CancellationToken,
    ) -> Result<Outcome, LifecycleError> {
        self.stop(handle, cancel).await?;
        self.start(handle, cancel).await
    }

    /// Delete after the operator re-types the workstation name exactly.
    ///
    /// A mismatch is not an error: it returns [`Outcome::Aborted`] without
    /// touching the remote.
    pub async fn delete(
        &self,
        handle: &RemoteHandle,
        confirm: &dyn Confirm,
        cancel: &CancellationToken,
    ) -> Result<Outcome, LifecycleError> {
        let prompt = format!(
            "Please confirm the deletion of workstation {:?} by entering the name again:",
            handle.name
        );
        let answer = cancellable(cancel, confirm.ask(&prompt))
            .await?
            .map_err(LifecycleError::Confirm)?;

        if answer.trim_end_matches(&['\r', '\n'][..]) != handle.name {
            tracing::info!("Aborting ...");
            return Ok(Outcome::Aborted);
        }

        tracing::info!("Deleting workstation {}", handle);
        let operation = cancellable(cancel, self.api.delete(handle)).await??;
        cancellable(cancel, self.api.wait(&operation)).await??;
        tracing::info!("Workstation {} deleted", handle);
        Ok(Outcome::Deleted)
    }

    async fn poll_until_running(
        &self,
        handle: &RemoteHandle,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        for attempt in 1..=self.poll.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Err(LifecycleError::Cancelled),
                _ = tokio::time::sleep(self.poll.interval) => {}
            }

            let state = cancellable(cancel, self.api.get_state(handle)).await??;
            tracing::debug!(
                "Poll {}/{}: workstation {} is {}",
                attempt,
                self.poll.max_attempts,
                handle,
                state
            );
            if state == RemoteState::Running {
                tracing::info!("Workstation {} is running", handle);
                return Ok(());
            }
        }

        Err(LifecycleError::Timeout {
            name: handle.name.clone(),
            attempts: self.poll.max_attempts,
            waited: self.poll.budget(),
        })
    }
}

/// Race `future` against `cancel`
async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, LifecycleError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(LifecycleError::Cancelled),
        output = future => Ok(output),
    }
}
