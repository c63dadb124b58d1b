//! Terminal output for the CLI
//!
//! Coloured status lines plus an [`EventSink`] that renders relay events
//! with them.

use tabled::{settings::Style, Table, Tabled};

use gws_core::config::Config;
use gws_core::{EventSink, RelayEvent};

/// Renders relay events as status lines
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalSink;

impl EventSink for TerminalSink {
    fn emit(&self, event: RelayEvent) {
        let line = event.to_string();
        match &event {
            RelayEvent::Listening { .. } | RelayEvent::KnownHostsUpdated { .. } => {
                print_success(&line)
            }
            RelayEvent::ConnectionAccepted { .. } | RelayEvent::SessionClosed { .. } => {
                print_info(&line)
            }
            RelayEvent::TokenRefreshed { .. } => tracing::debug!("{}", line),
            RelayEvent::AcceptFailed { .. } | RelayEvent::TokenRefreshFailed { .. } => {
                print_warning(&line)
            }
            RelayEvent::SessionFailed { .. } | RelayEvent::KnownHostsFailed { .. } => {
                print_error(&line)
            }
        }
    }
}

/// Context listing as a table, current one marked with `*`
pub fn format_contexts(config: &Config) -> String {
    if config.contexts.is_empty() {
        return "No contexts defined".to_string();
    }

    #[derive(Tabled)]
    struct ContextRow {
        #[tabled(rename = "CURRENT")]
        current: &'static str,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "WORKSTATION")]
        workstation: String,
        #[tabled(rename = "PORT")]
        port: String,
    }

    let current = config.current().ok().map(|(name, _)| name);
    let rows: Vec<ContextRow> = config
        .contexts
        .iter()
        .map(|(name, profile)| ContextRow {
            current: if Some(name.as_str()) == current { "*" } else { "" },
            name: name.clone(),
            workstation: profile
                .gcloud
                .as_ref()
                .map(|h| format!("{}/{}", h.project, h.name))
                .unwrap_or_else(|| "-".to_string()),
            port: profile
                .port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use gws_core::config::ContextProfile;

    #[test]
    fn test_format_contexts_marks_current() {
        let mut config = Config::default();
        config.contexts.insert(
            "dev".to_string(),
            ContextProfile {
                port: Some(2222),
                ..Default::default()
            },
        );
        config
            .contexts
            .insert("prod".to_string(), ContextProfile::default());
        config.current_context = Some("prod".to_string());

        let listing = format_contexts(&config);
        assert!(listing.contains("CURRENT"));
        assert!(listing.contains("WORKSTATION"));

        let dev = listing.lines().find(|l| l.contains("dev")).unwrap();
        assert!(dev.contains("2222"));
        assert!(!dev.contains('*'));

        let prod = listing.lines().find(|l| l.contains("prod")).unwrap();
        let cells: Vec<&str> = prod.split('│').map(str::trim).collect();
        assert_eq!(cells[1], "*");
        assert_eq!(cells[2], "prod");
        assert_eq!(cells[4], "-");
    }

    #[test]
    fn test_format_no_contexts() {
        assert_eq!(format_contexts(&Config::default()), "No contexts defined");
    }
}
