//! gws-tunnel: TCP to WebSocket relay
//!
//! [`TunnelRelay`] listens on loopback and bridges every accepted connection,
//! one to one, onto a freshly authenticated WebSocket to the workstation's
//! SSH port. Events go to an injected [`gws_core::EventSink`].

pub mod auth_headers;
pub mod known_hosts;
pub mod relay;
mod session;

pub use auth_headers::{AuthHeaderSnapshot, AuthHeaders, TunnelTokenSource, WorkstationTokenSource};
pub use known_hosts::KnownHostsError;
pub use relay::{loopback, tunnel_url, KnownHostsOptions, RelayError, RelayOptions, TunnelRelay};
