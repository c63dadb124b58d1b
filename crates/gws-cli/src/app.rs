//! Loaded configuration plus lazily established remote access

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use gws_auth::{CredentialBroker, OAuthClient, TOKEN_CHECK_INTERVAL};
use gws_core::config::{self, Config, ContextProfile};
use gws_core::{ConfigError, FileTokenStore};
use gws_workstation::{HttpWorkstationApi, LifecycleController, PollPolicy, WorkstationApi};

/// Configuration file and the context chosen for this invocation
pub struct App {
    pub config_path: PathBuf,
    pub config: Config,
    context_override: Option<String>,
}

impl App {
    /// Load `path` (or the default location); a missing file means defaults
    pub fn load(path: Option<&Path>, context_override: Option<String>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(config::default_config_path);

        let config = match config::load_config::<Config>(&config_path) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => {
                tracing::debug!("No config at {}, using defaults", config_path.display());
                Config::default()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to load config from {}", config_path.display()))
            }
        };

        Ok(Self {
            config_path,
            config,
            context_override,
        })
    }

    /// Persist the configuration
    pub fn save(&self) -> Result<()> {
        config::save_config(&self.config_path, &self.config)
            .with_context(|| format!("Failed to save config to {}", self.config_path.display()))
    }

    /// The context selected by `--ctx` or the config file
    pub fn context(&self) -> Result<(&str, &ContextProfile)> {
        match &self.context_override {
            Some(name) => self
                .config
                .contexts
                .get_key_value(name)
                .map(|(k, v)| (k.as_str(), v))
                .ok_or_else(|| ConfigError::UnknownContext(name.clone()).into()),
            None => Ok(self.config.current()?),
        }
    }

    /// Token file lives next to the config file
    fn token_store(&self) -> FileTokenStore {
        match self.config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => FileTokenStore::new(dir.join("token.toml")),
            _ => FileTokenStore::default_location(),
        }
    }

    /// Log in and build the control API client.
    ///
    /// Also starts the background credential check, bound to `cancel`.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<Arc<dyn WorkstationApi>> {
        let client = OAuthClient::new(self.config.oauth.clone())
            .context("Set oauth.client_id in the config or pass --client-id")?;
        let broker = Arc::new(CredentialBroker::new(client, Arc::new(self.token_store())));
        broker.login(cancel).await.context("Login failed")?;
        broker.spawn_refresh_task(TOKEN_CHECK_INTERVAL, cancel.child_token());

        let lifecycle = &self.config.lifecycle;
        Ok(Arc::new(HttpWorkstationApi::new(
            lifecycle.api_base_url.clone(),
            broker,
            lifecycle.operation_poll_interval,
        )))
    }

    /// Lifecycle controller over `api` with the configured poll policy
    pub fn controller(&self, api: Arc<dyn WorkstationApi>) -> LifecycleController {
        LifecycleController::new(api, PollPolicy::from(&self.config.lifecycle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
current_context = "dev"

[contexts.dev]
port = 2222

[contexts.dev.gcloud]
project = "proj"
region = "europe-west1"
cluster = "cluster"
config = "config"
name = "dev-box"

[contexts.prod]
port = 2223
"#;

    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, CONFIG).unwrap();
        path
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::load(Some(&dir.path().join("absent.toml")), None).unwrap();
        assert!(app.config.contexts.is_empty());
        assert!(app.context().is_err());
    }

    #[test]
    fn test_context_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path());

        let app = App::load(Some(&path), None).unwrap();
        assert_eq!(app.context().unwrap().0, "dev");

        let app = App::load(Some(&path), Some("prod".to_string())).unwrap();
        let (name, profile) = app.context().unwrap();
        assert_eq!(name, "prod");
        assert_eq!(profile.port, Some(2223));

        let app = App::load(Some(&path), Some("nope".to_string())).unwrap();
        assert!(app.context().is_err());
    }

    #[test]
    fn test_token_store_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path());
        let app = App::load(Some(&path), None).unwrap();
        assert_eq!(app.token_store().path(), dir.path().join("token.toml"));
    }
}
