//! Output rendering and formatting

use chrono::{DateTime, Local};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use console::{Style, Term};
use serde::Serialize;
use sideload_catalog::LibrarySnapshot;
use sideload_install::ReconcileReport;
use sideload_types::{ColorChoice, ItemState, ItemStatus, SessionRecord};
use std::io;

/// Final result of a command, rendered once it completes
pub enum CommandOutput {
    Library(LibrarySnapshot),
    Reconcile(ReconcileReport),
    Success(String),
}

#[derive(Serialize)]
struct ReconcileJson<'a> {
    purged: &'a [SessionRecord],
    dropped: &'a [SessionRecord],
    adopted: &'a [SessionRecord],
    foreign: Vec<i32>,
}

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    json_output: bool,
    color_choice: ColorChoice,
    term: Term,
}

impl OutputRenderer {
    pub fn new(json_output: bool, color_choice: ColorChoice) -> Self {
        Self {
            json_output,
            color_choice,
            term: Term::stdout(),
        }
    }

    /// Whether styled output should be used
    pub fn colors_enabled(&self) -> bool {
        match self.color_choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.term.features().colors_supported(),
        }
    }

    pub fn render(&self, output: &CommandOutput) -> io::Result<()> {
        match output {
            CommandOutput::Library(snapshot) => self.render_library(snapshot),
            CommandOutput::Reconcile(report) => self.render_reconcile(report),
            CommandOutput::Success(message) => self.render_success_message(message),
        }
    }

    fn render_library(&self, snapshot: &LibrarySnapshot) -> io::Result<()> {
        if self.json_output {
            let json = serde_json::to_string_pretty(snapshot).map_err(io::Error::other)?;
            println!("{json}");
            return Ok(());
        }

        if snapshot.is_empty() {
            println!("The catalog is empty.");
            return Ok(());
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("App").add_attribute(Attribute::Bold),
                Cell::new("Id").add_attribute(Attribute::Bold),
                Cell::new("Publisher").add_attribute(Attribute::Bold),
                Cell::new("Status").add_attribute(Attribute::Bold),
                Cell::new("Last update").add_attribute(Attribute::Bold),
                Cell::new("Update").add_attribute(Attribute::Bold),
            ]);

        for entry in snapshot.entries() {
            table.add_row(vec![
                Cell::new(&entry.item.display_label),
                Cell::new(entry.item.id.as_str()),
                Cell::new(&entry.item.publisher),
                self.status_cell(entry.state.status),
                Cell::new(last_update(&entry.state)),
                Cell::new(if entry.state.update_available { "available" } else { "" }),
            ]);
        }

        println!("{table}");
        Ok(())
    }

    fn status_cell(&self, status: ItemStatus) -> Cell {
        let cell = Cell::new(status.as_str());
        if !self.colors_enabled() {
            return cell;
        }
        match status {
            ItemStatus::Installed => cell.fg(Color::Green),
            ItemStatus::Installing | ItemStatus::Upgrading => cell.fg(Color::Cyan),
            ItemStatus::Uninstalled => cell.fg(Color::DarkGrey),
        }
    }

    fn render_reconcile(&self, report: &ReconcileReport) -> io::Result<()> {
        if self.json_output {
            let json = ReconcileJson {
                purged: &report.purged,
                dropped: &report.dropped,
                adopted: &report.adopted,
                foreign: report.foreign.iter().map(|session| session.0).collect(),
            };
            let json = serde_json::to_string_pretty(&json).map_err(io::Error::other)?;
            println!("{json}");
            return Ok(());
        }

        if report.is_clean() {
            return self.render_success_message("Session store matches the installer");
        }

        let heading = if self.colors_enabled() {
            Style::new().bold()
        } else {
            Style::new()
        };
        for (title, records) in [
            ("Expired", &report.purged),
            ("Dropped", &report.dropped),
            ("Adopted", &report.adopted),
        ] {
            if records.is_empty() {
                continue;
            }
            println!("{}", heading.apply_to(format!("{title} sessions:")));
            for record in records {
                println!(
                    "  {} session {} ({})",
                    record.item_id, record.session_id, record.kind
                );
            }
        }
        if !report.foreign.is_empty() {
            println!(
                "{}",
                heading.apply_to(format!(
                    "Ignored {} session(s) owned by other installers",
                    report.foreign.len()
                ))
            );
        }
        Ok(())
    }

    fn render_success_message(&self, message: &str) -> io::Result<()> {
        if self.json_output {
            let json = serde_json::json!({ "success": true, "message": message });
            println!("{json}");
        } else if self.colors_enabled() {
            println!("{}", Style::new().green().apply_to(message));
        } else {
            println!("{message}");
        }
        Ok(())
    }
}

fn last_update(state: &ItemState) -> String {
    if state.last_update_timestamp == ItemState::NEVER_INSTALLED {
        return "never".to_string();
    }
    DateTime::from_timestamp_millis(state.last_update_timestamp).map_or_else(
        || "unknown".to_string(),
        |at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    )
}
