//! Command line interface definition

use clap::{Parser, Subcommand};
use sideload_types::ColorChoice;
use std::path::PathBuf;

/// sideload - install and upgrade sideloaded apps
#[derive(Parser)]
#[command(name = "sideload")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Install and upgrade sideloaded apps through the platform installer")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging to the state directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorChoice>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the state directory
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Auto-update period in minutes (0 = manual)
    #[arg(long, global = true, value_name = "MINUTES")]
    pub schedule_minutes: Option<u32>,

    /// Age in minutes after which an installed app has an update (0 = never)
    #[arg(long, global = true, value_name = "MINUTES")]
    pub staleness_minutes: Option<u32>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show every catalog app with its install state
    #[command(alias = "ls")]
    Library,

    /// Install an app, or upgrade it when an update is available
    #[command(alias = "i")]
    Install {
        /// Catalog id, e.g. com.acme.spaceshooter
        item: String,

        /// Package file to stream instead of the payload directory entry
        #[arg(long, value_name = "FILE")]
        payload: Option<PathBuf>,
    },

    /// Uninstall an app
    #[command(alias = "rm")]
    Uninstall {
        /// Catalog id
        item: String,
    },

    /// Launch an installed app
    Open {
        /// Catalog id
        item: String,
    },

    /// Reconcile tracked sessions with the platform and report changes
    Reconcile,

    /// Run the installer runtime and print sync events until interrupted
    Watch,
}
