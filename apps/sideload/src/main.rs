//! sideload - install and upgrade sideloaded apps
//!
//! Wires configuration, the session store and the platform installer into a
//! session coordinator and drives it from the command line.

mod cli;
mod display;
mod error;
mod events;
mod prompts;
mod setup;

use crate::cli::{Cli, Commands, GlobalArgs};
use crate::display::{CommandOutput, OutputRenderer};
use crate::error::CliError;
use crate::events::{diagnostic, EventHandler};
use crate::setup::SystemSetup;
use clap::Parser;
use sideload_config::{constants, Config};
use sideload_events::Subscription;
use sideload_install::{CommitOutcome, InstallOutcome, InstallerRuntime, RuntimeOptions};
use sideload_platform::PayloadStream;
use sideload_types::{ItemId, OutputFormat};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tokio::select;
use tracing::{error, info};

/// Longest wait for the installer to report back on one operation
const OPERATION_TIMEOUT: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() {
    // Parse command line arguments first to check for JSON mode
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    init_tracing(json_mode, cli.global.debug);

    if let Err(e) = run(cli).await {
        error!("Application error: {}", e);
        if !json_mode {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<(), CliError> {
    info!("Starting sideload v{}", env!("CARGO_PKG_VERSION"));

    // File config (or defaults), then environment, then CLI flags
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.global)?;

    let json = cli.global.json || config.general.default_output == OutputFormat::Json;
    let interactive = !json && console::Term::stderr().is_term();
    let mut setup = SystemSetup::initialize(config.clone(), interactive).await?;

    let renderer = OutputRenderer::new(json, cli.global.color.unwrap_or(config.general.color));
    let handler = EventHandler::new(
        setup.coordinator().catalog(),
        renderer.colors_enabled(),
        json,
    );

    let output = execute_command(cli.command, &mut setup, &handler).await?;
    if let Some(output) = output {
        renderer.render(&output)?;
    }

    info!("Command completed successfully");
    Ok(())
}

async fn execute_command(
    command: Commands,
    setup: &mut SystemSetup,
    handler: &EventHandler,
) -> Result<Option<CommandOutput>, CliError> {
    match command {
        Commands::Library => {
            setup.coordinator().reconcile_on_startup().await?;
            let snapshot = setup.coordinator().library().snapshot().await?;
            Ok(Some(CommandOutput::Library(snapshot)))
        }

        Commands::Reconcile => {
            let report = setup.coordinator().reconcile_on_startup().await?;
            Ok(Some(CommandOutput::Reconcile(report)))
        }

        Commands::Open { item } => {
            let item = ItemId::from(item);
            setup.coordinator().open_app(&item).await?;
            Ok(Some(CommandOutput::Success(format!("Opened {item}"))))
        }

        Commands::Install { item, payload } => {
            let item = ItemId::from(item);
            setup.ensure_can_confirm()?;
            let runtime = start_runtime(setup, false).await?;
            let mut events = runtime.subscribe();

            let operation = async {
                match payload {
                    Some(path) => install_from_file(&runtime, &item, &path).await,
                    None => {
                        let outcome = runtime
                            .coordinator()
                            .install_from(&item, setup.payloads().as_ref())
                            .await?;
                        if let InstallOutcome::AlreadyInProgress { handle } = &outcome {
                            info!(session = %handle.session_id, "waiting for the committed session");
                        }
                        Ok(())
                    }
                }
            };
            let result = run_until_settled(operation, &mut events, &item, handler).await;
            runtime.shutdown();
            result?;
            Ok(Some(CommandOutput::Success(format!("{item} is installed"))))
        }

        Commands::Uninstall { item } => {
            let item = ItemId::from(item);
            setup.ensure_can_confirm()?;
            let runtime = start_runtime(setup, false).await?;
            let mut events = runtime.subscribe();

            let operation = async {
                runtime.coordinator().uninstall(&item).await?;
                Ok::<(), CliError>(())
            };
            let result = run_until_settled(operation, &mut events, &item, handler).await;
            runtime.shutdown();
            result?;
            Ok(Some(CommandOutput::Success(format!("{item} was uninstalled"))))
        }

        Commands::Watch => {
            let runtime = start_runtime(setup, true).await?;
            let mut events = runtime.subscribe();
            info!(adopted = runtime.report().adopted.len(), "watching for installer events");
            loop {
                select! {
                    _ = tokio::signal::ctrl_c() => break,
                    message = events.recv() => match message {
                        Some(message) => handler.handle_event(&message),
                        None => break,
                    },
                }
            }
            runtime.shutdown();
            Ok(None)
        }
    }
}

/// Start the runtime; only long-running commands want the update timers
async fn start_runtime(setup: &mut SystemSetup, timers: bool) -> Result<InstallerRuntime, CliError> {
    let signals = setup.take_signals()?;
    let mut options = RuntimeOptions::from_config(setup.config());
    if !timers {
        options = options.without_timers();
    }
    let runtime = InstallerRuntime::start(
        setup.coordinator().clone(),
        signals,
        setup.payloads(),
        options,
    )
    .await?;
    Ok(runtime)
}

/// Stream a local package file into a fresh or reused session
async fn install_from_file(
    runtime: &InstallerRuntime,
    item: &ItemId,
    path: &Path,
) -> Result<(), CliError> {
    let coordinator = runtime.coordinator();
    let handle = coordinator.begin_install(item).await?;
    let file = tokio::fs::File::open(path).await?;
    let payload: PayloadStream = Box::new(file);
    match coordinator.write_and_commit(&handle, payload).await? {
        CommitOutcome::Committed { bytes } => {
            info!(item = %item, bytes, path = %path.display(), "package committed");
        }
        CommitOutcome::AlreadyInProgress => {
            info!(session = %handle.session_id, "waiting for the committed session");
        }
    }
    Ok(())
}

/// Run `operation`, printing events until `item` reaches a terminal state
async fn run_until_settled<F>(
    operation: F,
    events: &mut Subscription,
    item: &ItemId,
    handler: &EventHandler,
) -> Result<(), CliError>
where
    F: std::future::Future<Output = Result<(), CliError>>,
{
    let mut operation = Box::pin(operation);
    let mut started = false;
    let deadline = tokio::time::sleep(OPERATION_TIMEOUT);
    tokio::pin!(deadline);

    loop {
        select! {
            result = &mut operation, if !started => {
                result?;
                started = true;
            }
            message = events.recv() => {
                let Some(message) = message else {
                    return Err(CliError::Setup("event bus closed".to_string()));
                };
                handler.handle_event(&message);
                if message.event.item_id != *item || !message.event.is_terminal() {
                    continue;
                }
                if message.event.is_failure() {
                    return Err(CliError::Failed(format!(
                        "{} failed: {}",
                        message.event.item_id,
                        diagnostic(&message)
                    )));
                }
                return Ok(());
            }
            () = &mut deadline => {
                return Err(CliError::Timeout(format!(
                    "no result for {item} after {} seconds",
                    OPERATION_TIMEOUT.as_secs()
                )));
            }
        }
    }
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &GlobalArgs) -> Result<(), CliError> {
    if let Some(color) = global.color {
        config.general.color = color;
    }
    if global.json {
        config.general.default_output = OutputFormat::Json;
    }
    if let Some(dir) = &global.state_dir {
        config.paths.state_dir = Some(dir.clone());
    }
    if let Some(minutes) = global.schedule_minutes {
        config.updates.schedule_minutes = minutes;
    }
    if let Some(minutes) = global.staleness_minutes {
        config.updates.staleness_minutes = minutes;
    }
    config.validate()?;
    Ok(())
}

/// Log files go under the state directory, which is known before config loads
fn log_dir() -> PathBuf {
    std::env::var_os("SIDELOAD_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| Config::default().state_dir())
        .join(constants::LOG_DIR_NAME)
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled_flag: bool) {
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;
    let default_filter = "info,sideload=debug,sideload_install=debug";

    if json_mode {
        // JSON mode: keep stdout clean for the JSON output
        if debug_enabled {
            let log_dir = log_dir();
            if std::fs::create_dir_all(&log_dir).is_ok() {
                let log_file = log_dir.join(format!(
                    "sideload-{}.log",
                    chrono::Utc::now().format("%Y%m%d-%H%M%S")
                ));

                if let Ok(file) = std::fs::File::create(&log_file) {
                    tracing_subscriber::fmt()
                        .json()
                        .with_writer(file)
                        .with_env_filter(
                            tracing_subscriber::EnvFilter::try_from_default_env()
                                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
                        )
                        .init();
                    return;
                }
            }
        }
        tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .with_env_filter("off")
            .init();
    } else if debug_enabled {
        // Debug mode: structured JSON logs to file
        let log_dir = log_dir();
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            eprintln!("Warning: Failed to create log directory: {e}");
        }

        let log_file = log_dir.join(format!(
            "sideload-{}.log",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ));

        match std::fs::File::create(&log_file) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env()
                            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
                    )
                    .init();

                eprintln!("Debug logging enabled: {}", log_file.display());
            }
            Err(e) => {
                eprintln!("Warning: Failed to create log file: {e}");
                tracing_subscriber::fmt()
                    .with_writer(std::io::stderr)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env()
                            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                    )
                    .init();
            }
        }
    } else {
        // Normal mode: only warnings and errors, on stderr
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .init();
    }
}
