//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable identifier of a remote workstation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteHandle {
    pub project: String,
    pub region: String,
    pub cluster: String,
    pub config: String,
    pub name: String,
}

impl RemoteHandle {
    /// Fully qualified resource name used by the control API
    pub fn resource_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/workstationClusters/{}/workstationConfigs/{}/workstations/{}",
            self.project, self.region, self.cluster, self.config, self.name
        )
    }
}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Workstation state as reported by the control API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteState {
    #[serde(rename = "STATE_STOPPED")]
    Stopped,
    #[serde(rename = "STATE_STARTING")]
    Starting,
    #[serde(rename = "STATE_RUNNING")]
    Running,
    #[serde(rename = "STATE_STOPPING")]
    Stopping,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for RemoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteState::Stopped => write!(f, "stopped"),
            RemoteState::Starting => write!(f, "starting"),
            RemoteState::Running => write!(f, "running"),
            RemoteState::Stopping => write!(f, "stopping"),
            RemoteState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Identifier of one relay session, unique within a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Byte-pump direction within a relay session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    LocalToRemote,
    RemoteToLocal,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::LocalToRemote => write!(f, "local->remote"),
            Direction::RemoteToLocal => write!(f, "remote->local"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> RemoteHandle {
        RemoteHandle {
            project: "proj".to_string(),
            region: "europe-west6".to_string(),
            cluster: "cluster-1".to_string(),
            config: "config-1".to_string(),
            name: "dev".to_string(),
        }
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(
            handle().resource_name(),
            "projects/proj/locations/europe-west6/workstationClusters/cluster-1/workstationConfigs/config-1/workstations/dev"
        );
    }

    #[test]
    fn test_remote_state_from_api_names() {
        let state: RemoteState = serde_json::from_str(r#""STATE_RUNNING""#).unwrap();
        assert_eq!(state, RemoteState::Running);

        let state: RemoteState = serde_json::from_str(r#""STATE_REPAIRING""#).unwrap();
        assert_eq!(state, RemoteState::Unknown);
    }

    #[test]
    fn test_remote_state_display() {
        assert_eq!(format!("{}", RemoteState::Starting), "starting");
        assert_eq!(format!("{}", SessionId(7)), "#7");
    }
}
