//! One local connection bridged over its own WebSocket
//!
//! A session dials exactly once. After the handshake two pumps run inside a
//! single `select!`: whichever finishes first ends the session, and dropping
//! the halves closes both sides together.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use gws_core::{Direction, EventSink, RelayEvent, SessionError, SessionId};

use crate::auth_headers::AuthHeaders;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Time allowed for the closing handshake once a session ends
const CLOSE_GRACE: Duration = Duration::from_secs(1);

pub(crate) struct Session {
    pub id: SessionId,
    pub stream: TcpStream,
    pub endpoint: String,
    pub headers: Arc<AuthHeaders>,
    pub buffer_size: usize,
    pub sink: Arc<dyn EventSink>,
}

impl Session {
    pub async fn run(self, cancel: CancellationToken) {
        let Session {
            id,
            stream,
            endpoint,
            headers,
            buffer_size,
            sink,
        } = self;

        let dialed = tokio::select! {
            _ = cancel.cancelled() => return,
            dialed = dial(&endpoint, &headers) => dialed,
        };
        let ws = match dialed {
            Ok(ws) => ws,
            Err(error) => {
                sink.emit(RelayEvent::SessionFailed { session: id, error });
                return;
            }
        };
        tracing::debug!("Session {} connected to {}", id, endpoint);

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (mut tcp_rx, mut tcp_tx) = stream.into_split();
        let bytes_up = AtomicU64::new(0);
        let bytes_down = AtomicU64::new(0);

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Session {} cancelled", id);
                Ok(())
            }
            result = local_to_remote(&mut tcp_rx, &mut ws_tx, buffer_size, &bytes_up) => result,
            result = remote_to_local(&mut ws_rx, &mut tcp_tx, &bytes_down) => result,
        };

        // Close both sides together; no half-close
        let _ = tokio::time::timeout(CLOSE_GRACE, ws_tx.close()).await;
        let _ = tcp_tx.shutdown().await;
        drop(tcp_rx);
        drop(ws_rx);

        match result {
            Ok(()) => sink.emit(RelayEvent::SessionClosed {
                session: id,
                bytes_up: bytes_up.load(Ordering::Relaxed),
                bytes_down: bytes_down.load(Ordering::Relaxed),
            }),
            Err(error) => sink.emit(RelayEvent::SessionFailed { session: id, error }),
        }
    }
}

/// Open the WebSocket with the current tunnel bearer
async fn dial(endpoint: &str, headers: &AuthHeaders) -> Result<WsStream, SessionError> {
    let snapshot = headers.current().ok_or(SessionError::NoToken)?;

    let mut request = endpoint
        .into_client_request()
        .map_err(|e| dial_error(endpoint, e))?;
    let value = HeaderValue::from_str(&snapshot.authorization()).map_err(|e| SessionError::Dial {
        url: endpoint.to_string(),
        status: None,
        body: None,
        message: format!("invalid authorization header: {}", e),
    })?;
    request.headers_mut().insert(AUTHORIZATION, value);

    let (ws, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| dial_error(endpoint, e))?;
    Ok(ws)
}

/// Map a handshake failure, keeping the response body as a diagnostic
fn dial_error(url: &str, error: WsError) -> SessionError {
    match error {
        WsError::Http(response) => {
            let status = response.status();
            let body = response
                .body()
                .as_deref()
                .map(|b| String::from_utf8_lossy(b).trim().to_string())
                .filter(|b| !b.is_empty());
            let message = match &body {
                Some(body) => format!("{}: {}", status, body),
                None => status.to_string(),
            };
            SessionError::Dial {
                url: url.to_string(),
                status: Some(status.as_u16()),
                body,
                message,
            }
        }
        other => SessionError::Dial {
            url: url.to_string(),
            status: None,
            body: None,
            message: other.to_string(),
        },
    }
}

fn io_error(direction: Direction, error: impl std::fmt::Display) -> SessionError {
    SessionError::Io {
        direction,
        message: error.to_string(),
    }
}

/// Each local read becomes one binary message
async fn local_to_remote(
    tcp: &mut OwnedReadHalf,
    ws: &mut SplitSink<WsStream, Message>,
    buffer_size: usize,
    counter: &AtomicU64,
) -> Result<(), SessionError> {
    let mut buf = vec![0u8; buffer_size.max(1)];
    loop {
        let n = tcp
            .read(&mut buf)
            .await
            .map_err(|e| io_error(Direction::LocalToRemote, e))?;
        if n == 0 {
            return Ok(());
        }

        ws.send(Message::Binary(buf[..n].to_vec()))
            .await
            .map_err(|e| io_error(Direction::LocalToRemote, e))?;
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Each message payload is written verbatim to the local socket
async fn remote_to_local(
    ws: &mut SplitStream<WsStream>,
    tcp: &mut OwnedWriteHalf,
    counter: &AtomicU64,
) -> Result<(), SessionError> {
    while let Some(message) = ws.next().await {
        let payload = match message {
            Ok(Message::Binary(data)) => data,
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Close(_)) => return Ok(()),
            Ok(_) => continue,
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return Ok(()),
            Err(e) => return Err(io_error(Direction::RemoteToLocal, e)),
        };

        tcp.write_all(&payload)
            .await
            .map_err(|e| io_error(Direction::RemoteToLocal, e))?;
        counter.fetch_add(payload.len() as u64, Ordering::Relaxed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::http::Response;

    #[test]
    fn test_http_dial_error_keeps_body() {
        let response = Response::builder()
            .status(401)
            .body(Some(b"invalid token\n".to_vec()))
            .unwrap();
        match dial_error("wss://host/_workstation/tcp/22", WsError::Http(response)) {
            SessionError::Dial { status, body, message, .. } => {
                assert_eq!(status, Some(401));
                assert_eq!(body.as_deref(), Some("invalid token"));
                assert!(message.contains("invalid token"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dial_without_token() {
        let headers = AuthHeaders::new();
        assert!(matches!(
            dial("ws://127.0.0.1:9/_workstation/tcp/22", &headers).await,
            Err(SessionError::NoToken)
        ));
    }
}
