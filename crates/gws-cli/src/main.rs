//! gws CLI
//!
//! Controls a cloud workstation's lifecycle and exposes its SSH port on
//! loopback through an authenticated WebSocket tunnel.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gws::app::App;
use gws::commands;
use gws::output::{print_error, print_warning};
use gws_core::LifecycleError;

#[derive(Parser)]
#[command(name = "gws")]
#[command(author, version, about = "Cloud workstation lifecycle and SSH tunnel")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use this context instead of the current one
    #[arg(long, global = true)]
    ctx: Option<String>,

    /// OAuth client id (overrides config)
    #[arg(long, global = true, env = "GWS_OAUTH_CLIENT_ID", hide_env_values = true)]
    client_id: Option<String>,

    /// OAuth client secret (overrides config)
    #[arg(long, global = true, env = "GWS_OAUTH_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the workstation and wait until it is running
    Start,

    /// Stop the workstation
    Stop,

    /// Stop, then start the workstation
    Restart,

    /// Delete the workstation after typed confirmation
    Delete,

    /// Expose the workstation's SSH port on localhost
    Tunnel {
        /// Local port (0 uses the context's port)
        #[arg(short, long, default_value_t = 0)]
        port: u16,
    },

    /// List contexts, or switch to NAME
    Ctx {
        /// Context to make current
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(e) = run(cli).await {
        if matches!(e.downcast_ref::<LifecycleError>(), Some(LifecycleError::Cancelled)) {
            print_warning("Cancelled");
        } else {
            print_error(&format!("{:#}", e));
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut app = App::load(cli.config.as_deref(), cli.ctx)?;
    if let Some(id) = cli.client_id {
        app.config.oauth.client_id = id;
    }
    if let Some(secret) = cli.client_secret {
        app.config.oauth.client_secret = secret;
    }

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let result = match cli.command {
        Commands::Start => commands::start_command(&app, &cancel).await,
        Commands::Stop => commands::stop_command(&app, &cancel).await,
        Commands::Restart => commands::restart_command(&app, &cancel).await,
        Commands::Delete => commands::delete_command(&app, &cancel).await,
        Commands::Tunnel { port } => commands::tunnel_command(&app, port, cli.quiet, &cancel).await,
        Commands::Ctx { name } => commands::ctx_command(&mut app, name.as_deref()),
    };

    // Stops the background credential check
    cancel.cancel();
    result
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
        }

        cancel.cancel();
    });
}
