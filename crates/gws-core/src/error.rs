//! Core error types for gws

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::Direction;

/// Login and refresh failures
#[derive(Error, Debug)]
pub enum AuthError {
    /// OAuth client settings are incomplete
    #[error("OAuth client not configured: {0}")]
    NotConfigured(String),

    /// The token endpoint could not be reached
    #[error("Token request failed: {0}")]
    Http(String),

    /// The token endpoint answered with a non-success status
    #[error("Token endpoint rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The browser callback reported an error or was malformed
    #[error("Authorization callback failed: {0}")]
    Callback(String),

    /// The callback carried a state value we did not issue
    #[error("Authorization callback state mismatch")]
    StateMismatch,

    /// The credential expired and cannot be refreshed
    #[error("Access token expired and no refresh token is available")]
    NoRefreshToken,

    /// Login was cancelled before a code arrived
    #[error("Login cancelled")]
    Cancelled,

    /// The token accessor was used before `login`
    #[error("Not logged in")]
    NotLoggedIn,

    /// Persisting or loading the credential failed
    #[error("Credential store error: {0}")]
    Store(#[from] ConfigError),

    /// Local listener I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote control API failures, always carrying the operation that failed
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport-level failure
    #[error("{operation}: request failed: {message}")]
    Request { operation: String, message: String },

    /// Non-success HTTP status
    #[error("{operation}: remote returned {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    /// A long-running operation finished with an error
    #[error("{operation}: operation failed ({code}): {message}")]
    Operation {
        operation: String,
        code: i32,
        message: String,
    },

    /// Response body could not be decoded
    #[error("{operation}: invalid response: {message}")]
    Decode { operation: String, message: String },

    /// No bearer token could be obtained for the call
    #[error("{operation}: {source}")]
    Auth {
        operation: String,
        #[source]
        source: AuthError,
    },
}

/// Lifecycle controller failures
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Control-plane failure
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The workstation did not reach RUNNING within the poll budget
    #[error("Timeout waiting for workstation {name} to start ({attempts} polls over {waited:?})")]
    Timeout {
        name: String,
        attempts: u32,
        waited: Duration,
    },

    /// The caller cancelled the operation
    #[error("Cancelled")]
    Cancelled,

    /// Reading the delete confirmation failed
    #[error("Failed to read confirmation: {0}")]
    Confirm(#[source] std::io::Error),
}

/// Failures scoped to a single relay session
#[derive(Error, Debug)]
pub enum SessionError {
    /// WebSocket handshake failed
    #[error("Failed to connect to WebSocket {url}: {message}")]
    Dial {
        url: String,
        status: Option<u16>,
        body: Option<String>,
        message: String,
    },

    /// No tunnel token has been obtained yet
    #[error("No tunnel token available")]
    NoToken,

    /// Read or write failure on one side of the session
    #[error("{direction}: {message}")]
    Io {
        direction: Direction,
        message: String,
    },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Context name not present in the config
    #[error("Context with name {0:?} not defined")]
    UnknownContext(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_distinct_kind() {
        let err = LifecycleError::Timeout {
            name: "dev".to_string(),
            attempts: 10,
            waited: Duration::from_secs(100),
        };
        assert!(matches!(err, LifecycleError::Timeout { .. }));
        assert!(err.to_string().contains("dev"));
    }

    #[test]
    fn test_api_error_carries_operation() {
        let err = ApiError::Status {
            operation: "start workstation".to_string(),
            status: 403,
            body: "denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "start workstation: remote returned 403: denied"
        );
    }
}
