//! gws-cli: Command-line interface for gws
//!
//! Wires the credential broker, the workstation API, the lifecycle
//! controller and the tunnel relay behind the `gws` binary.

pub mod app;
pub mod commands;
pub mod output;
