//! Local listener and accept loop
//!
//! Sessions, the token refresher and the optional known_hosts task all hang
//! off one cancellation token and one task tracker, so shutdown closes every
//! live session before `run` returns.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use gws_core::config::TunnelSettings;
use gws_core::{ApiError, EventSink, RelayEvent, RemoteHandle, SessionId};
use gws_workstation::WorkstationApi;

use crate::auth_headers::{AuthHeaders, TunnelTokenSource, WorkstationTokenSource};
use crate::known_hosts;
use crate::session::Session;

/// Pause after a transient accept failure
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Relay failures that end the whole relay
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Workstation {0} has no reachable host; is it running?")]
    NotAddressable(String),

    #[error("Failed to obtain tunnel token: {0}")]
    Token(#[from] ApiError),

    #[error("Listener failed: {0}")]
    Accept(#[source] std::io::Error),
}

/// known_hosts maintenance settings
#[derive(Debug, Clone)]
pub struct KnownHostsOptions {
    pub path: PathBuf,
    pub timeout: Duration,
}

/// Relay tuning
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub buffer_size: usize,
    pub token_refresh_interval: Duration,
    pub known_hosts: Option<KnownHostsOptions>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self::from(&TunnelSettings::default())
    }
}

impl From<&TunnelSettings> for RelayOptions {
    fn from(settings: &TunnelSettings) -> Self {
        Self {
            buffer_size: settings.buffer_size,
            token_refresh_interval: settings.token_refresh_interval,
            known_hosts: None,
        }
    }
}

/// WebSocket URL of a workstation's SSH port
pub fn tunnel_url(host: &str) -> String {
    format!("wss://{}/_workstation/tcp/22", host)
}

/// `127.0.0.1:{port}`
pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Bridges local TCP connections to the workstation, one WebSocket each
pub struct TunnelRelay {
    listener: TcpListener,
    local_addr: SocketAddr,
    endpoint: String,
    tokens: Arc<dyn TunnelTokenSource>,
    sink: Arc<dyn EventSink>,
    options: RelayOptions,
}

impl TunnelRelay {
    /// Bind the local listener
    pub async fn bind(
        addr: SocketAddr,
        endpoint: impl Into<String>,
        tokens: Arc<dyn TunnelTokenSource>,
        sink: Arc<dyn EventSink>,
        options: RelayOptions,
    ) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| RelayError::Bind { addr, source })?;

        Ok(Self {
            listener,
            local_addr,
            endpoint: endpoint.into(),
            tokens,
            sink,
            options,
        })
    }

    /// Resolve the workstation's host and bind `127.0.0.1:{port}` for it.
    ///
    /// The workstation must already be running; this does not start it.
    pub async fn for_workstation(
        api: Arc<dyn WorkstationApi>,
        handle: &RemoteHandle,
        port: u16,
        sink: Arc<dyn EventSink>,
        options: RelayOptions,
    ) -> Result<Self, RelayError> {
        let workstation = api.get_workstation(handle).await?;
        let host = workstation
            .host
            .filter(|h| !h.is_empty())
            .ok_or_else(|| RelayError::NotAddressable(handle.name.clone()))?;

        let tokens = Arc::new(WorkstationTokenSource::new(api, handle.clone()));
        Self::bind(loopback(port), tunnel_url(&host), tokens, sink, options).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Accept and relay until `cancel` fires or the listener fails.
    ///
    /// Failing to obtain the first tunnel token is fatal. Everything after
    /// that is session-scoped and only reported through the sink.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), RelayError> {
        let TunnelRelay {
            listener,
            local_addr,
            endpoint,
            tokens,
            sink,
            options,
        } = self;

        let headers = Arc::new(AuthHeaders::new());
        let version = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            version = headers.refresh(tokens.as_ref()) => version?,
        };
        sink.emit(RelayEvent::TokenRefreshed { version });

        // Also fires on a fatal listener error
        let shutdown = cancel.child_token();
        let tracker = TaskTracker::new();

        tracker.spawn(Arc::clone(&headers).run_refresher(
            Arc::clone(&tokens),
            options.token_refresh_interval,
            Arc::clone(&sink),
            shutdown.clone(),
        ));

        sink.emit(RelayEvent::Listening {
            local_addr,
            remote: endpoint.clone(),
        });

        if let Some(known) = options.known_hosts.clone() {
            tracker.spawn(sync_known_hosts(
                known,
                local_addr,
                Arc::clone(&sink),
                shutdown.clone(),
            ));
        }

        let mut next_id = 0u64;
        let result = loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    next_id += 1;
                    let id = SessionId(next_id);
                    sink.emit(RelayEvent::ConnectionAccepted { session: id, peer });

                    let session = Session {
                        id,
                        stream,
                        endpoint: endpoint.clone(),
                        headers: Arc::clone(&headers),
                        buffer_size: options.buffer_size,
                        sink: Arc::clone(&sink),
                    };
                    tracker.spawn(session.run(shutdown.child_token()));
                }
                Err(e) if is_fatal(&e) => break Err(RelayError::Accept(e)),
                Err(e) => {
                    sink.emit(RelayEvent::AcceptFailed {
                        error: e.to_string(),
                    });
                    tokio::select! {
                        _ = shutdown.cancelled() => break Ok(()),
                        _ = tokio::time::sleep(ACCEPT_ERROR_PAUSE) => {}
                    }
                }
            }
        };

        drop(listener);
        shutdown.cancel();
        tracker.close();
        tracker.wait().await;
        tracing::debug!("Relay on {} stopped", local_addr);

        result
    }
}

/// Accept errors that mean the listener itself is gone
fn is_fatal(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::InvalidInput | std::io::ErrorKind::NotConnected
    )
}

async fn sync_known_hosts(
    options: KnownHostsOptions,
    local_addr: SocketAddr,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
) {
    let result = tokio::select! {
        _ = cancel.cancelled() => return,
        result = known_hosts::sync(&options.path, local_addr, options.timeout) => result,
    };

    match result {
        Ok(true) => sink.emit(RelayEvent::KnownHostsUpdated {
            path: options.path,
            host: known_hosts::host_pattern(local_addr.port()),
        }),
        Ok(false) => tracing::debug!("{} already trusts the tunnel host key", options.path.display()),
        Err(e) => sink.emit(RelayEvent::KnownHostsFailed {
            error: e.to_string(),
        }),
    }
}
