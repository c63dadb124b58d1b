//! start / stop / restart / delete

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use gws_workstation::{Outcome, StdinConfirm};

use crate::app::App;
use crate::output::{print_info, print_success, print_warning};

fn report(name: &str, outcome: &Outcome) {
    match outcome {
        Outcome::AlreadyInState(_) | Outcome::Ignored(_) => {
            print_info(&format!("Workstation {}: {}", name, outcome))
        }
        Outcome::Aborted => print_warning("Aborting ..."),
        _ => print_success(&format!("Workstation {}: {}", name, outcome)),
    }
}

pub async fn start_command(app: &App, cancel: &CancellationToken) -> Result<()> {
    let (_, profile) = app.context()?;
    let handle = profile.handle()?;

    let controller = app.controller(app.connect(cancel).await?);
    let outcome = controller.start(handle, cancel).await?;
    report(&handle.name, &outcome);
    Ok(())
}

pub async fn stop_command(app: &App, cancel: &CancellationToken) -> Result<()> {
    let (_, profile) = app.context()?;
    let handle = profile.handle()?;

    let controller = app.controller(app.connect(cancel).await?);
    let outcome = controller.stop(handle, cancel).await?;
    report(&handle.name, &outcome);
    Ok(())
}

pub async fn restart_command(app: &App, cancel: &CancellationToken) -> Result<()> {
    let (_, profile) = app.context()?;
    let handle = profile.handle()?;

    let controller = app.controller(app.connect(cancel).await?);
    let outcome = controller.restart(handle, cancel).await?;
    report(&handle.name, &outcome);
    Ok(())
}

pub async fn delete_command(app: &App, cancel: &CancellationToken) -> Result<()> {
    let (_, profile) = app.context()?;
    let handle = profile.handle()?;

    let controller = app.controller(app.connect(cancel).await?);
    let outcome = controller.delete(handle, &StdinConfirm, cancel).await?;
    report(&handle.name, &outcome);
    Ok(())
}
