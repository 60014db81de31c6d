#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for sideload
//!
//! This crate provides the data model shared by every other crate: catalog
//! items and their derived state, durable session records, the status codes
//! reported by the platform installer, and the update settings.

pub mod installer;
pub mod item;
pub mod session;
pub mod settings;

// Re-export commonly used types
pub use installer::{
    CallbackTarget, ConfirmationAction, FailureKind, InstalledPackage, InstallerCallback,
    InstallerStatus, PlatformSession,
};
pub use item::{Item, ItemId, ItemState, ItemStatus};
pub use session::{OperationKind, SessionId, SessionRecord, DEFAULT_SESSION_TTL_HOURS};
pub use settings::UpdateSettings;

use serde::{Deserialize, Serialize};

/// Current wall-clock time as epoch milliseconds
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Plain,
    Tty,
    Json,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Tty
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    Always,
    Auto,
    Never,
}

// Implement clap::ValueEnum for ColorChoice
impl clap::ValueEnum for ColorChoice {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Always, Self::Auto, Self::Never]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Always => clap::builder::PossibleValue::new("always"),
            Self::Auto => clap::builder::PossibleValue::new("auto"),
            Self::Never => clap::builder::PossibleValue::new("never"),
        })
    }
}

impl Default for ColorChoice {
    fn default() -> Self {
        Self::Auto
    }
}
