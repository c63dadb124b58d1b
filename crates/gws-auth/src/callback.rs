//! Single-route local HTTP listener receiving the OAuth redirect

use std::net::SocketAddr;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use gws_core::AuthError;

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// What the browser delivered to `/callback`
#[derive(Debug)]
enum CallbackOutcome {
    Code { code: String, state: Option<String> },
    Denied(String),
}

/// Local listener on an ephemeral port serving `/callback`
pub struct CallbackServer {
    local_addr: SocketAddr,
    outcomes: mpsc::Receiver<CallbackOutcome>,
    shutdown: CancellationToken,
    server: JoinHandle<std::io::Result<()>>,
}

impl CallbackServer {
    /// Bind `127.0.0.1:0` and start serving
    pub async fn bind() -> Result<Self, AuthError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let local_addr = listener.local_addr()?;

        let (tx, outcomes) = mpsc::channel(4);
        let app = Router::new()
            .route("/callback", get(handle_callback))
            .with_state(tx);

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        tracing::debug!("OAuth callback listener on {}", local_addr);

        Ok(Self {
            local_addr,
            outcomes,
            shutdown,
            server,
        })
    }

    /// Port the listener is bound to
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Redirect URI to register in the authorization request
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.port())
    }

    /// Wait for the browser to deliver a code.
    ///
    /// Blocks until the operator finishes in the browser or `cancel` fires.
    pub async fn wait_for_code(
        &mut self,
        expected_state: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AuthError> {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            outcome = self.outcomes.recv() => outcome,
        };

        match outcome {
            Some(CallbackOutcome::Code { code, state }) => {
                if state.as_deref() != Some(expected_state) {
                    return Err(AuthError::StateMismatch);
                }
                Ok(code)
            }
            Some(CallbackOutcome::Denied(error)) => Err(AuthError::Callback(error)),
            None => Err(AuthError::Callback(
                "callback listener stopped".to_string(),
            )),
        }
    }

    /// Stop the listener and wait for it to exit
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        match self.server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("OAuth callback listener failed: {}", e),
            Err(e) => tracing::warn!("OAuth callback listener panicked: {}", e),
        }
    }
}

async fn handle_callback(
    State(tx): State<mpsc::Sender<CallbackOutcome>>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, &'static str) {
    if let Some(error) = params.error {
        deliver(&tx, CallbackOutcome::Denied(error));
        return (
            StatusCode::BAD_REQUEST,
            "Authentication failed. You can close this window.",
        );
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing code");
    };

    deliver(
        &tx,
        CallbackOutcome::Code {
            code,
            state: params.state,
        },
    );
    (
        StatusCode::OK,
        "Authentication successful! You can close this window.",
    )
}

/// Hand an outcome to the waiter without holding the request open
fn deliver(tx: &mpsc::Sender<CallbackOutcome>, outcome: CallbackOutcome) {
    if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(outcome) {
        tracing::debug!("Dropping OAuth callback, earlier ones are still pending");
    }
}
