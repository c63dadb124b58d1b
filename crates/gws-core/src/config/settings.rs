//! Top-level configuration file

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::serde_utils::duration_secs;
use super::ContextProfile;
use crate::error::ConfigError;

/// Contents of `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the active context
    pub current_context: Option<String>,

    /// Named workstation contexts
    pub contexts: BTreeMap<String, ContextProfile>,

    /// Timeout for SSH handshakes against the local tunnel
    #[serde(with = "duration_secs")]
    pub ssh_timeout: Duration,

    /// OAuth client settings
    pub oauth: OAuthSettings,

    /// Lifecycle polling settings
    pub lifecycle: LifecycleSettings,

    /// Relay settings
    pub tunnel: TunnelSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            current_context: None,
            contexts: BTreeMap::new(),
            ssh_timeout: Duration::from_secs(30),
            oauth: OAuthSettings::default(),
            lifecycle: LifecycleSettings::default(),
            tunnel: TunnelSettings::default(),
        }
    }
}

impl Config {
    /// Resolve the active context.
    ///
    /// Falls back to the only defined context when none is selected.
    pub fn current(&self) -> Result<(&str, &ContextProfile), ConfigError> {
        if let Some(name) = &self.current_context {
            return self
                .contexts
                .get_key_value(name)
                .map(|(k, v)| (k.as_str(), v))
                .ok_or_else(|| ConfigError::UnknownContext(name.clone()));
        }

        if self.contexts.len() == 1 {
            if let Some((name, profile)) = self.contexts.iter().next() {
                return Ok((name.as_str(), profile));
            }
        }

        Err(ConfigError::MissingField("current_context".to_string()))
    }

    /// Make `name` the active context.
    ///
    /// Returns whether the selection changed, so callers only persist when needed.
    pub fn switch_context(&mut self, name: &str) -> Result<bool, ConfigError> {
        if !self.contexts.contains_key(name) {
            return Err(ConfigError::UnknownContext(name.to_string()));
        }

        if self.current_context.as_deref() == Some(name) {
            return Ok(false);
        }
        self.current_context = Some(name.to_string());
        Ok(true)
    }
}

/// OAuth2 installed-application client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            scopes: vec![
                "openid".to_string(),
                "https://www.googleapis.com/auth/userinfo.email".to_string(),
                "https://www.googleapis.com/auth/cloud-platform".to_string(),
            ],
        }
    }
}

/// Settings for start/stop/delete handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    /// Base URL of the workstations control API
    pub api_base_url: String,

    /// Interval between state polls while a workstation is starting
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Number of state polls before giving up
    pub max_poll_attempts: u32,

    /// Interval between polls of a long-running operation
    #[serde(with = "duration_secs")]
    pub operation_poll_interval: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://workstations.googleapis.com".to_string(),
            poll_interval: Duration::from_secs(10),
            max_poll_attempts: 10,
            operation_poll_interval: Duration::from_secs(3),
        }
    }
}

/// Settings for the local TCP relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    /// How often the shared tunnel token is regenerated
    #[serde(with = "duration_secs")]
    pub token_refresh_interval: Duration,

    /// Size of the local read buffer; each read becomes one WebSocket message
    pub buffer_size: usize,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            token_refresh_interval: Duration::from_secs(30 * 60),
            buffer_size: 32 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_contexts() -> Config {
        let mut config = Config::default();
        config
            .contexts
            .insert("dev".to_string(), ContextProfile::default());
        config
            .contexts
            .insert("prod".to_string(), ContextProfile::default());
        config
    }

    #[test]
    fn test_single_context_is_selected_implicitly() {
        let mut config = Config::default();
        config
            .contexts
            .insert("only".to_string(), ContextProfile::default());
        let (name, _) = config.current().unwrap();
        assert_eq!(name, "only");
    }

    #[test]
    fn test_ambiguous_context_requires_selection() {
        let config = two_contexts();
        assert!(matches!(
            config.current(),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_switch_context() {
        let mut config = two_contexts();
        assert!(config.switch_context("prod").unwrap());
        assert!(!config.switch_context("prod").unwrap());
        assert_eq!(config.current().unwrap().0, "prod");
    }

    #[test]
    fn test_switch_to_unknown_context() {
        let mut config = two_contexts();
        assert!(matches!(
            config.switch_context("staging"),
            Err(ConfigError::UnknownContext(_))
        ));
    }

    #[test]
    fn test_parse_minimal_file() {
        let config: Config = toml::from_str(
            r#"
            current_context = "dev"

            [contexts.dev]
            port = 2222
            known_hosts_file = "~/.ssh/known_hosts"

            [contexts.dev.gcloud]
            project = "proj"
            region = "europe-west6"
            cluster = "c1"
            config = "cfg"
            name = "dev-ws"

            [lifecycle]
            max_poll_attempts = 3
            "#,
        )
        .unwrap();

        let (_, profile) = config.current().unwrap();
        assert_eq!(profile.handle().unwrap().name, "dev-ws");
        assert_eq!(config.lifecycle.max_poll_attempts, 3);
        assert_eq!(config.lifecycle.poll_interval, Duration::from_secs(10));
        assert_eq!(config.tunnel.buffer_size, 32 * 1024);
    }
}
