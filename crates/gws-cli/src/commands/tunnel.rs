//! Local SSH tunnel

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use gws_core::{EventSink, TracingSink};
use gws_tunnel::{KnownHostsOptions, RelayOptions, TunnelRelay};

use crate::app::App;
use crate::output::{print_info, TerminalSink};

/// Relay `127.0.0.1:{port}` to the workstation until cancelled.
///
/// A `port` of 0 uses the context's configured port. With `quiet`, relay
/// events only go to the log.
pub async fn tunnel_command(
    app: &App,
    port: u16,
    quiet: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let (name, profile) = app.context()?;
    let handle = profile.handle()?;
    let port = profile
        .resolve_local_port(port)
        .with_context(|| format!("No local port given and context {:?} has none", name))?;

    let mut options = RelayOptions::from(&app.config.tunnel);
    options.known_hosts = profile.known_hosts_path().map(|path| KnownHostsOptions {
        path,
        timeout: app.config.ssh_timeout,
    });

    let sink: Arc<dyn EventSink> = if quiet {
        Arc::new(TracingSink)
    } else {
        Arc::new(TerminalSink)
    };

    let api = app.connect(cancel).await?;
    let relay = TunnelRelay::for_workstation(api, handle, port, sink, options)
        .await
        .with_context(|| format!("Failed to open tunnel to {}", handle))?;

    let user = profile.user.as_deref().unwrap_or("user");
    print_info(&ssh_hint(relay.local_addr().port(), user));

    relay.run(cancel.clone()).await?;
    print_info("Tunnel closed");
    Ok(())
}

/// Matches the `[127.0.0.1]:{port}` known_hosts line, which `localhost` would not
fn ssh_hint(port: u16, user: &str) -> String {
    format!("Connect with: ssh -p {} {}@127.0.0.1", port, user)
}
