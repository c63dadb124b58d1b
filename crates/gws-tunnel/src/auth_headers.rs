//! Shared tunnel bearer, refreshed in the background
//!
//! The current [`AuthHeaderSnapshot`] lives behind a `watch` channel. The
//! refresher replaces it wholesale; dialers clone the `Arc` and never see a
//! half-written value.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use gws_core::{ApiError, EventSink, RelayEvent, RemoteHandle};
use gws_workstation::WorkstationApi;

/// Immutable header set for one token version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaderSnapshot {
    bearer: String,
    version: u64,
}

impl AuthHeaderSnapshot {
    /// `Authorization` header value
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.bearer)
    }

    /// Monotonic version, starting at 1 for the first token
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Produces bearer tokens accepted by the tunnel endpoint
#[async_trait]
pub trait TunnelTokenSource: Send + Sync {
    async fn tunnel_token(&self) -> Result<String, ApiError>;
}

/// Generates tunnel tokens through the workstation control API
pub struct WorkstationTokenSource {
    api: Arc<dyn WorkstationApi>,
    handle: RemoteHandle,
}

impl WorkstationTokenSource {
    pub fn new(api: Arc<dyn WorkstationApi>, handle: RemoteHandle) -> Self {
        Self { api, handle }
    }
}

#[async_trait]
impl TunnelTokenSource for WorkstationTokenSource {
    async fn tunnel_token(&self) -> Result<String, ApiError> {
        self.api.generate_access_token(&self.handle).await
    }
}

/// Holder of the current snapshot
pub struct AuthHeaders {
    current: watch::Sender<Option<Arc<AuthHeaderSnapshot>>>,
}

impl Default for AuthHeaders {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthHeaders {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    /// Snapshot to use for the next dial, if a token was ever obtained
    pub fn current(&self) -> Option<Arc<AuthHeaderSnapshot>> {
        self.current.borrow().clone()
    }

    /// Publish `bearer` as the next version
    pub fn install(&self, bearer: String) -> u64 {
        let version = self.current.borrow().as_ref().map_or(0, |s| s.version) + 1;
        self.current
            .send_replace(Some(Arc::new(AuthHeaderSnapshot { bearer, version })));
        version
    }

    /// Fetch a fresh token and publish it
    pub async fn refresh(&self, source: &dyn TunnelTokenSource) -> Result<u64, ApiError> {
        let bearer = source.tunnel_token().await?;
        Ok(self.install(bearer))
    }

    /// Refresh every `period` until `cancel` fires.
    ///
    /// A failed refresh keeps the previous snapshot; live sessions are never
    /// told to reconnect.
    pub async fn run_refresher(
        self: Arc<Self>,
        source: Arc<dyn TunnelTokenSource>,
        period: Duration,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let refreshed = tokio::select! {
                        _ = cancel.cancelled() => break,
                        refreshed = self.refresh(source.as_ref()) => refreshed,
                    };
                    match refreshed {
                        Ok(version) => sink.emit(RelayEvent::TokenRefreshed { version }),
                        Err(e) => sink.emit(RelayEvent::TokenRefreshFailed {
                            error: e.to_string(),
                        }),
                    }
                }
            }
        }
        tracing::debug!("Tunnel token refresher stopped");
    }
}
