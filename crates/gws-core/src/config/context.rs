//! Per-context workstation profile

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::types::RemoteHandle;

/// One named context: which workstation to reach and how to expose it locally
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextProfile {
    /// Remote workstation identifier
    pub gcloud: Option<RemoteHandle>,

    /// Local port the tunnel listens on
    pub port: Option<u16>,

    /// SSH user on the workstation
    pub user: Option<String>,

    /// known_hosts file to keep in sync with the tunnelled host key
    pub known_hosts_file: Option<PathBuf>,
}

impl ContextProfile {
    /// The workstation handle, required by every remote operation
    pub fn handle(&self) -> Result<&RemoteHandle, ConfigError> {
        self.gcloud
            .as_ref()
            .ok_or_else(|| ConfigError::MissingField("gcloud".to_string()))
    }

    /// Resolve the port the tunnel should listen on.
    ///
    /// A requested port of 0 defers to the context's configured port.
    pub fn resolve_local_port(&self, requested: u16) -> Result<u16, ConfigError> {
        if requested != 0 {
            return Ok(requested);
        }
        match self.port {
            Some(port) if port != 0 => Ok(port),
            _ => Err(ConfigError::MissingField("port".to_string())),
        }
    }

    /// known_hosts path with `~` expanded
    pub fn known_hosts_path(&self) -> Option<PathBuf> {
        self.known_hosts_file
            .as_deref()
            .map(super::expand_home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_port_wins() {
        let profile = ContextProfile {
            port: Some(2222),
            ..Default::default()
        };
        assert_eq!(profile.resolve_local_port(4000).unwrap(), 4000);
    }

    #[test]
    fn test_zero_defers_to_context_port() {
        let profile = ContextProfile {
            port: Some(2222),
            ..Default::default()
        };
        assert_eq!(profile.resolve_local_port(0).unwrap(), 2222);
    }

    #[test]
    fn test_zero_without_context_port_fails() {
        let profile = ContextProfile::default();
        assert!(matches!(
            profile.resolve_local_port(0),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_missing_handle() {
        assert!(ContextProfile::default().handle().is_err());
    }
}
