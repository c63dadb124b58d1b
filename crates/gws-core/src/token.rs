//! OAuth credential and its durable storage

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config;
use crate::error::ConfigError;
use crate::time::{current_time_secs, secs_until};

/// Default credential file name inside the config directory
const TOKEN_FILE_NAME: &str = "token.toml";

/// OAuth2 bearer credential
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Expiry as a Unix timestamp in seconds; `None` means no known expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
}

impl Credential {
    /// Build a credential from a token response's `expires_in`
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: Option<u64>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expiry: expires_in.map(|secs| current_time_secs().saturating_add(secs)),
        }
    }

    /// Time left before the access token expires
    pub fn remaining(&self) -> Option<Duration> {
        self.expiry.map(|deadline| Duration::from_secs(secs_until(deadline)))
    }

    /// True when the token expires within `window` (or has expired)
    pub fn expires_within(&self, window: Duration) -> bool {
        match self.remaining() {
            Some(left) => left <= window,
            None => false,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Durable secret store for the credential
pub trait TokenStore: Send + Sync {
    /// Load the stored credential, if any
    fn load(&self) -> Result<Option<Credential>, ConfigError>;

    /// Replace the stored credential
    fn save(&self, credential: &Credential) -> Result<(), ConfigError>;
}

#[derive(Serialize, Deserialize)]
struct TokenFile {
    token: Credential,
}

/// Credential stored as TOML next to the config file
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store at an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<config dir>/token.toml`
    pub fn default_location() -> Self {
        Self::new(config::default_config_dir().join(TOKEN_FILE_NAME))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<Credential>, ConfigError> {
        match config::load_config::<TokenFile>(&self.path) {
            Ok(file) => Ok(Some(file.token)),
            Err(ConfigError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, credential: &Credential) -> Result<(), ConfigError> {
        let file = TokenFile {
            token: credential.clone(),
        };
        config::save_config(&self.path, &file)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| ConfigError::Invalid(format!("Failed to restrict token file: {}", e)))?;
        }

        tracing::debug!("Saved credential to {:?}", self.path);
        Ok(())
    }
}

/// In-memory store, counting writes
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    credential: Mutex<Option<Credential>>,
    saves: AtomicUsize,
}

impl MemoryTokenStore {
    /// Store pre-populated with a credential
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Currently stored credential
    pub fn current(&self) -> Option<Credential> {
        self.credential.lock().ok().and_then(|guard| guard.clone())
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<Credential>, ConfigError> {
        Ok(self.current())
    }

    fn save(&self, credential: &Credential) -> Result<(), ConfigError> {
        let mut guard = self
            .credential
            .lock()
            .map_err(|_| ConfigError::Invalid("token store poisoned".to_string()))?;
        *guard = Some(credential.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("token.toml"));

        assert!(store.load().unwrap().is_none());

        let credential = Credential::new("access", Some("refresh".to_string()), Some(3600));
        store.save(&credential).unwrap();
        assert_eq!(store.load().unwrap(), Some(credential));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("token.toml"));
        store.save(&Credential::new("a", None, None)).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_expiry_window() {
        let credential = Credential::new("a", None, Some(30));
        assert!(credential.expires_within(Duration::from_secs(60)));
        assert!(!credential.expires_within(Duration::from_secs(10)));

        let forever = Credential::new("a", None, None);
        assert!(!forever.expires_within(Duration::from_secs(3600)));
    }

    #[test]
    fn test_huge_expires_in_saturates() {
        let credential = Credential::new("t", None, Some(u64::MAX));
        assert_eq!(credential.expiry, Some(u64::MAX));
        assert!(!credential.expires_within(Duration::from_secs(3600)));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let credential = Credential::new("secret-access", Some("secret-refresh".to_string()), None);
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let store = MemoryTokenStore::default();
        store.save(&Credential::new("a", None, None)).unwrap();
        store.save(&Credential::new("b", None, None)).unwrap();
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.current().unwrap().access_token, "b");
    }
}
