//! Remote control API abstraction

use async_trait::async_trait;
use serde::Deserialize;

use gws_core::{ApiError, RemoteHandle, RemoteState};

/// Snapshot of a workstation as reported by the control API
#[derive(Debug, Clone, Deserialize)]
pub struct Workstation {
    /// Fully qualified resource name
    pub name: String,

    #[serde(default = "unknown_state")]
    pub state: RemoteState,

    /// Public host serving the tunnel endpoint, present once addressable
    #[serde(default)]
    pub host: Option<String>,
}

fn unknown_state() -> RemoteState {
    RemoteState::Unknown
}

/// Error carried by a finished operation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Handle to an asynchronous remote mutation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Operation {
    pub name: String,

    #[serde(default)]
    pub done: bool,

    #[serde(default)]
    pub error: Option<OperationStatus>,
}

impl Operation {
    /// A pending operation with the given name
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            error: None,
        }
    }
}

/// The workstation control plane
#[async_trait]
pub trait WorkstationApi: Send + Sync {
    /// Fetch the workstation's current state and host
    async fn get_workstation(&self, handle: &RemoteHandle) -> Result<Workstation, ApiError>;

    /// Begin starting the workstation
    async fn start(&self, handle: &RemoteHandle) -> Result<Operation, ApiError>;

    /// Begin stopping the workstation
    async fn stop(&self, handle: &RemoteHandle) -> Result<Operation, ApiError>;

    /// Begin deleting the workstation
    async fn delete(&self, handle: &RemoteHandle) -> Result<Operation, ApiError>;

    /// Block until `operation` completes, surfacing its error if it failed
    async fn wait(&self, operation: &Operation) -> Result<(), ApiError>;

    /// Short-lived bearer token accepted by the workstation's tunnel endpoint
    async fn generate_access_token(&self, handle: &RemoteHandle) -> Result<String, ApiError>;

    /// Current state only
    async fn get_state(&self, handle: &RemoteHandle) -> Result<RemoteState, ApiError> {
        Ok(self.get_workstation(handle).await?.state)
    }
}
