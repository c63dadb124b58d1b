//! CLI command implementations

mod ctx;
mod lifecycle;
mod tunnel;

pub use ctx::ctx_command;
pub use lifecycle::{delete_command, restart_command, start_command, stop_command};
pub use tunnel::tunnel_command;
