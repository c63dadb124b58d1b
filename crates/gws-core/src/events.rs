//! Relay event reporting
//!
//! The relay never prints. It emits [`RelayEvent`]s into an injected
//! [`EventSink`], so a plain CLI, a TUI or a test can each render them.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::error::SessionError;
use crate::types::SessionId;

/// Structured events produced by the tunnel relay
#[derive(Debug)]
pub enum RelayEvent {
    /// The local listener is up
    Listening {
        local_addr: SocketAddr,
        remote: String,
    },
    /// A local connection was accepted and a session spawned for it
    ConnectionAccepted { session: SessionId, peer: SocketAddr },
    /// A session ended; both sides are closed
    SessionClosed {
        session: SessionId,
        bytes_up: u64,
        bytes_down: u64,
    },
    /// A session failed to dial or hit a read/write error
    SessionFailed {
        session: SessionId,
        error: SessionError,
    },
    /// Accepting a local connection failed; the relay keeps running
    AcceptFailed { error: String },
    /// A fresh tunnel token is in place for new sessions
    TokenRefreshed { version: u64 },
    /// Generating a tunnel token failed; the previous one stays in use
    TokenRefreshFailed { error: String },
    /// The known_hosts file was rewritten
    KnownHostsUpdated { path: PathBuf, host: String },
    /// Host key capture or known_hosts update failed
    KnownHostsFailed { error: String },
}

impl RelayEvent {
    /// Whether the event reports a failure
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            RelayEvent::SessionFailed { .. }
                | RelayEvent::AcceptFailed { .. }
                | RelayEvent::TokenRefreshFailed { .. }
                | RelayEvent::KnownHostsFailed { .. }
        )
    }
}

impl fmt::Display for RelayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayEvent::Listening { local_addr, remote } => {
                write!(f, "Tunnel to {} listening on {}", remote, local_addr)
            }
            RelayEvent::ConnectionAccepted { session, peer } => {
                write!(f, "Accepted connection {} from {}", session, peer)
            }
            RelayEvent::SessionClosed {
                session,
                bytes_up,
                bytes_down,
            } => write!(
                f,
                "Connection {} closed ({} bytes up, {} bytes down)",
                session, bytes_up, bytes_down
            ),
            RelayEvent::SessionFailed { session, error } => {
                write!(f, "Connection {} failed: {}", session, error)
            }
            RelayEvent::AcceptFailed { error } => {
                write!(f, "Failed to accept connection: {}", error)
            }
            RelayEvent::TokenRefreshed { version } => {
                write!(f, "Got new tunnel auth token (v{})", version)
            }
            RelayEvent::TokenRefreshFailed { error } => {
                write!(f, "Error generating tunnel token: {}", error)
            }
            RelayEvent::KnownHostsUpdated { path, host } => {
                write!(f, "known_hosts {} updated for {}", path.display(), host)
            }
            RelayEvent::KnownHostsFailed { error } => {
                write!(f, "known_hosts update failed: {}", error)
            }
        }
    }
}

/// Consumer of relay events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RelayEvent);
}

/// Forwards events to a channel; a closed receiver drops them
impl EventSink for mpsc::UnboundedSender<RelayEvent> {
    fn emit(&self, event: RelayEvent) {
        let _ = self.send(event);
    }
}

/// Logs events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: RelayEvent) {
        if event.is_error() {
            tracing::warn!("{}", event);
        } else {
            tracing::info!("{}", event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;

    #[tokio::test]
    async fn test_channel_sink_delivers_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(RelayEvent::TokenRefreshed { version: 3 });

        match rx.recv().await {
            Some(RelayEvent::TokenRefreshed { version }) => assert_eq!(version, 3),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_channel_sink_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.emit(RelayEvent::AcceptFailed {
            error: "boom".to_string(),
        });
    }

    #[test]
    fn test_error_classification() {
        let failed = RelayEvent::SessionFailed {
            session: SessionId(1),
            error: SessionError::Io {
                direction: Direction::RemoteToLocal,
                message: "reset".to_string(),
            },
        };
        assert!(failed.is_error());
        assert_eq!(
            failed.to_string(),
            "Connection #1 failed: remote->local: reset"
        );
        assert!(!RelayEvent::TokenRefreshed { version: 1 }.is_error());
    }
}
