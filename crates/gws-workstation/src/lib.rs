//! gws-workstation: Remote workstation control
//!
//! [`WorkstationApi`] abstracts the remote control plane (state queries,
//! start/stop/delete operations, tunnel access tokens). [`LifecycleController`]
//! drives a workstation towards the requested state on top of it.

pub mod api;
pub mod lifecycle;
mod rest;

pub use api::{Operation, OperationStatus, Workstation, WorkstationApi};
pub use lifecycle::{
    plan, Action, Command, Confirm, LifecycleController, Outcome, PollPolicy, StdinConfirm,
};
pub use rest::HttpWorkstationApi;
