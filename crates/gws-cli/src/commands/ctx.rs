//! Context listing and switching

use anyhow::Result;

use crate::app::App;
use crate::output::{format_contexts, print_info, print_success};

/// List contexts, or switch to `name` and persist the choice
pub fn ctx_command(app: &mut App, name: Option<&str>) -> Result<()> {
    let Some(name) = name else {
        print!("{}", format_contexts(&app.config));
        return Ok(());
    };

    if app.config.switch_context(name)? {
        app.save()?;
        print_success(&format!("Switched to context {:?}", name));
    } else {
        print_info(&format!("Context {:?} is already active", name));
    }
    Ok(())
}
