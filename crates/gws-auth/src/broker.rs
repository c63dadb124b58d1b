//! Credential broker: login, transparent refresh, persistence

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use gws_core::{AuthError, Credential, TokenStore};

use crate::callback::CallbackServer;
use crate::oauth::OAuthClient;
use crate::pkce::{random_state, Pkce};

/// How often the background task re-validates and persists the credential
pub const TOKEN_CHECK_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// A stored credential with at least this much validity is reused as-is by `login`
const CACHED_TOKEN_MIN_VALIDITY: Duration = Duration::from_secs(10 * 60);

/// The accessor refreshes once fewer than this many seconds remain
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Anything that can hand out a currently valid bearer token
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// Opens the authorization URL for the operator
pub trait Browser: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Uses the platform's default browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl Browser for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

#[derive(Default)]
struct BrokerState {
    credential: Option<Credential>,
    /// Access token most recently written to the store
    last_persisted: Option<String>,
}

/// Owns the OAuth credential for the lifetime of the process
pub struct CredentialBroker {
    client: OAuthClient,
    store: Arc<dyn TokenStore>,
    browser: Arc<dyn Browser>,
    state: Mutex<BrokerState>,
}

impl CredentialBroker {
    /// Create a broker using the system browser for interactive login
    pub fn new(client: OAuthClient, store: Arc<dyn TokenStore>) -> Self {
        Self {
            client,
            store,
            browser: Arc::new(SystemBrowser),
            state: Mutex::new(BrokerState::default()),
        }
    }

    /// Replace the browser launcher
    pub fn with_browser(mut self, browser: Arc<dyn Browser>) -> Self {
        self.browser = browser;
        self
    }

    /// Obtain a credential.
    ///
    /// Reuses a stored credential that is still comfortably valid, then tries
    /// a silent refresh, and only then runs the interactive PKCE flow. The
    /// interactive wait has no deadline; `cancel` aborts it.
    pub async fn login(&self, cancel: &CancellationToken) -> Result<(), AuthError> {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Ignoring unreadable stored credential: {}", e);
                None
            }
        };

        let mut state = self.state.lock().await;

        if let Some(credential) = stored {
            state.last_persisted = Some(credential.access_token.clone());

            if !credential.expires_within(CACHED_TOKEN_MIN_VALIDITY) {
                tracing::debug!("Using cached credential");
                state.credential = Some(credential);
                return Ok(());
            }

            if let Some(refresh_token) = credential.refresh_token.as_deref() {
                match self.client.refresh(refresh_token).await {
                    Ok(refreshed) => {
                        tracing::info!("Refreshed stored credential");
                        self.install(&mut state, refreshed);
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::warn!("Silent refresh failed, falling back to browser login: {}", e);
                    }
                }
            }
        }

        let credential = self.interactive_login(cancel).await?;
        self.install(&mut state, credential);
        Ok(())
    }

    /// Spawn the periodic check that keeps the stored credential current
    pub fn spawn_refresh_task(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let broker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = broker.access_token().await {
                            tracing::warn!("Background token check failed: {}", e);
                        }
                    }
                }
            }
            tracing::debug!("Token refresh task stopped");
        })
    }

    async fn interactive_login(&self, cancel: &CancellationToken) -> Result<Credential, AuthError> {
        let pkce = Pkce::generate();
        let state = random_state();

        let mut server = CallbackServer::bind().await?;
        let redirect_uri = server.redirect_uri();
        let url = self.client.authorize_url(&redirect_uri, &pkce, &state)?;

        tracing::info!("Opening URL: {}", url);
        if let Err(e) = self.browser.open(url.as_str()) {
            tracing::warn!("Could not open a browser ({}); open the URL manually", e);
        }

        tracing::info!("Waiting for authentication...");
        let result = match server.wait_for_code(&state, cancel).await {
            Ok(code) => self.client.exchange_code(&code, &pkce, &redirect_uri).await,
            Err(e) => Err(e),
        };
        server.shutdown().await;

        if result.is_ok() {
            tracing::info!("Authenticated");
        }
        result
    }

    /// Make `credential` current and persist it if the access token changed
    fn install(&self, state: &mut BrokerState, credential: Credential) {
        if state.last_persisted.as_deref() != Some(credential.access_token.as_str()) {
            match self.store.save(&credential) {
                Ok(()) => {
                    tracing::info!(
                        "Got new access token (expires in {:?})",
                        credential.remaining()
                    );
                    state.last_persisted = Some(credential.access_token.clone());
                }
                Err(e) => tracing::warn!("Failed to persist credential: {}", e),
            }
        }
        state.credential = Some(credential);
    }
}

#[async_trait]
impl TokenSource for CredentialBroker {
    /// Current access token, refreshed first when close to expiry
    async fn access_token(&self) -> Result<String, AuthError> {
        let mut state = self.state.lock().await;

        let current = state.credential.as_ref().ok_or(AuthError::NotLoggedIn)?;
        if !current.expires_within(EXPIRY_SKEW) {
            return Ok(current.access_token.clone());
        }

        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or(AuthError::NoRefreshToken)?;
        let refreshed = self.client.refresh(&refresh_token).await?;
        let token = refreshed.access_token.clone();
        self.install(&mut state, refreshed);
        Ok(token)
    }
}
