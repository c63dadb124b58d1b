//! gws-core: Core abstractions and configuration for gws
//!
//! This crate provides the shared types, configuration structures, credential
//! storage and event plumbing used by the auth, workstation, tunnel and CLI
//! crates.

pub mod config;
pub mod error;
pub mod events;
pub mod time;
pub mod token;
pub mod types;

pub use error::{ApiError, AuthError, ConfigError, LifecycleError, SessionError};
pub use events::{EventSink, RelayEvent, TracingSink};
pub use token::{Credential, FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{Direction, RemoteHandle, RemoteState, SessionId};
