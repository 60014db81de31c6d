//! Event handling and progress display

use console::{style, Style};
use sideload_catalog::Catalog;
use sideload_events::{EventMessage, SyncEventType};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Prints sync events as they arrive
pub struct EventHandler {
    colors_enabled: bool,
    json_output: bool,
    labels: HashMap<String, String>,
}

impl EventHandler {
    pub fn new(catalog: &Catalog, colors_enabled: bool, json_output: bool) -> Self {
        let labels = catalog
            .items()
            .map(|item| (item.id.to_string(), item.display_label.clone()))
            .collect();
        Self {
            colors_enabled,
            json_output,
            labels,
        }
    }

    /// Handle a sync event
    pub fn handle_event(&self, message: &EventMessage) {
        log_event(message);

        if self.json_output {
            match serde_json::to_string(message) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "could not serialize event"),
            }
            return;
        }

        let item_id = message.event.item_id.as_str();
        let label = self.labels.get(item_id).map_or(item_id, String::as_str);
        let kind = message.meta.label("kind");
        let (symbol, text) = match message.event.kind {
            SyncEventType::Installing => {
                let verb = if kind == Some("upgrade") {
                    "Updating"
                } else {
                    "Installing"
                };
                ("->", format!("{verb} {label}"))
            }
            SyncEventType::InstallSuccess => {
                let verb = if kind == Some("upgrade") {
                    "Updated"
                } else {
                    "Installed"
                };
                ("ok", format!("{verb} {label}"))
            }
            SyncEventType::InstallFailure => (
                "!!",
                format!("Failed to install {label}: {}", diagnostic(message)),
            ),
            SyncEventType::UninstallSuccess => ("ok", format!("Uninstalled {label}")),
            SyncEventType::UninstallFailure => (
                "!!",
                format!("Failed to uninstall {label}: {}", diagnostic(message)),
            ),
        };

        let line_style = if !self.colors_enabled {
            Style::new()
        } else if message.event.is_failure() {
            Style::new().red().bold()
        } else if message.event.kind == SyncEventType::Installing {
            Style::new().cyan()
        } else {
            Style::new().green()
        };
        eprintln!("{} {text}", line_style.apply_to(symbol));
        if let Some(status) = message.meta.label("status_message") {
            eprintln!("   {}", style(status).dim());
        }
    }
}

/// Human-readable reason for a failure event
pub fn diagnostic(message: &EventMessage) -> String {
    message
        .meta
        .label("diagnostic")
        .or_else(|| message.meta.label("failure_kind"))
        .unwrap_or("unknown failure")
        .to_string()
}

fn log_event(message: &EventMessage) {
    let meta = &message.meta;
    match message.event.kind {
        SyncEventType::Installing => debug!(
            source = meta.source.as_str(),
            event_id = %meta.event_id,
            item = %message.event.item_id,
            "session started"
        ),
        SyncEventType::InstallSuccess | SyncEventType::UninstallSuccess => info!(
            source = meta.source.as_str(),
            event_id = %meta.event_id,
            item = %message.event.item_id,
            kind = message.event.kind.as_str(),
            "operation succeeded"
        ),
        SyncEventType::InstallFailure | SyncEventType::UninstallFailure => warn!(
            source = meta.source.as_str(),
            event_id = %meta.event_id,
            item = %message.event.item_id,
            kind = message.event.kind.as_str(),
            failure = meta.label("failure_kind").unwrap_or_default(),
            "operation failed"
        ),
    }
}
