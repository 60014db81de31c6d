#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for sideload
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/sideload/config.toml)
//! - Environment variables
//! - CLI flags

pub mod constants;
pub mod settings;

pub use settings::SettingsHandle;

use serde::{Deserialize, Serialize};
use sideload_errors::{ConfigError, Error};
use sideload_types::{ColorChoice, OutputFormat, UpdateSettings, DEFAULT_SESSION_TTL_HOURS};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub updates: UpdatesConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    #[serde(default = "default_color_choice")]
    pub color: ColorChoice,
    /// Identity this client reports to the platform; sessions opened under
    /// another identity are foreign
    #[serde(default = "default_installer_id")]
    pub installer_id: String,
}

/// Update scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatesConfig {
    /// Auto-update period, 0 = manual
    #[serde(default)]
    pub schedule_minutes: u32,
    /// Update-availability threshold, 0 = none
    #[serde(default)]
    pub staleness_minutes: u32,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_dedupe_window_secs")]
    pub dedupe_window_secs: u64,
}

/// Session state configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u32,
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    pub state_dir: Option<PathBuf>,
    pub payload_dir: Option<PathBuf>,
    pub catalog_file: Option<PathBuf>,
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

/// Outcome the simulated installer reports for committed sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedOutcome {
    Success,
    Failure,
    Aborted,
    Blocked,
    Conflict,
    Incompatible,
    Invalid,
    Storage,
}

/// Simulated installer behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_require_user_action")]
    pub require_user_action: bool,
    #[serde(default = "default_outcome")]
    pub outcome: SimulatedOutcome,
    #[serde(default = "default_callback_delay_ms")]
    pub callback_delay_ms: u64,
}

// Default implementations

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: OutputFormat::Tty,
            color: ColorChoice::Auto,
            installer_id: default_installer_id(),
        }
    }
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            schedule_minutes: 0,
            staleness_minutes: 0,
            check_interval_secs: default_check_interval_secs(),
            dedupe_window_secs: default_dedupe_window_secs(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            bus_capacity: default_bus_capacity(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            require_user_action: true,
            outcome: SimulatedOutcome::Success,
            callback_delay_ms: default_callback_delay_ms(),
        }
    }
}

// Default value functions for serde
fn default_output_format() -> OutputFormat {
    OutputFormat::Tty
}

fn default_color_choice() -> ColorChoice {
    ColorChoice::Auto
}

fn default_installer_id() -> String {
    constants::INSTALLER_ID.to_string()
}

fn default_check_interval_secs() -> u64 {
    30
}

fn default_dedupe_window_secs() -> u64 {
    60
}

fn default_session_ttl_hours() -> u32 {
    u32::try_from(DEFAULT_SESSION_TTL_HOURS).unwrap_or(24)
}

fn default_bus_capacity() -> usize {
    64
}

fn default_require_user_action() -> bool {
    true
}

fn default_outcome() -> SimulatedOutcome {
    SimulatedOutcome::Success
}

fn default_callback_delay_ms() -> u64 {
    250
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("sideload").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::from(ConfigError::NotFound {
                    path: path.display().to_string(),
                })
            } else {
                Error::io_with_path(&e, path)
            }
        })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Reject values that would make timers or the event bus unusable
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.updates.check_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "updates.check_interval_secs".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if self.events.bus_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "events.bus_capacity".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if self.state.session_ttl_hours == 0 {
            return Err(ConfigError::InvalidValue {
                field: "state.session_ttl_hours".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // SIDELOAD_OUTPUT
        if let Ok(output) = std::env::var("SIDELOAD_OUTPUT") {
            self.general.default_output = match output.as_str() {
                "plain" => OutputFormat::Plain,
                "tty" => OutputFormat::Tty,
                "json" => OutputFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "SIDELOAD_OUTPUT".to_string(),
                        value: output,
                    }
                    .into())
                }
            };
        }

        // SIDELOAD_COLOR
        if let Ok(color) = std::env::var("SIDELOAD_COLOR") {
            self.general.color = match color.as_str() {
                "always" => ColorChoice::Always,
                "auto" => ColorChoice::Auto,
                "never" => ColorChoice::Never,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "SIDELOAD_COLOR".to_string(),
                        value: color,
                    }
                    .into())
                }
            };
        }

        if let Ok(minutes) = std::env::var("SIDELOAD_SCHEDULE_MINUTES") {
            self.updates.schedule_minutes = parse_env("SIDELOAD_SCHEDULE_MINUTES", minutes)?;
        }

        if let Ok(minutes) = std::env::var("SIDELOAD_STALENESS_MINUTES") {
            self.updates.staleness_minutes = parse_env("SIDELOAD_STALENESS_MINUTES", minutes)?;
        }

        if let Ok(secs) = std::env::var("SIDELOAD_CHECK_INTERVAL_SECS") {
            self.updates.check_interval_secs = parse_env("SIDELOAD_CHECK_INTERVAL_SECS", secs)?;
        }

        if let Ok(dir) = std::env::var("SIDELOAD_STATE_DIR") {
            self.paths.state_dir = Some(PathBuf::from(dir));
        }

        if let Ok(dir) = std::env::var("SIDELOAD_PAYLOAD_DIR") {
            self.paths.payload_dir = Some(PathBuf::from(dir));
        }

        // SIDELOAD_REQUIRE_USER_ACTION
        if let Ok(flag) = std::env::var("SIDELOAD_REQUIRE_USER_ACTION") {
            self.simulator.require_user_action = match flag.as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "SIDELOAD_REQUIRE_USER_ACTION".to_string(),
                        value: flag,
                    }
                    .into())
                }
            };
        }

        self.validate()
    }

    /// Current update settings as a single immutable value
    #[must_use]
    pub fn update_settings(&self) -> UpdateSettings {
        UpdateSettings::new(self.updates.schedule_minutes, self.updates.staleness_minutes)
    }

    /// Get the state directory (with default)
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.paths.state_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|dir| dir.join("sideload"))
                .unwrap_or_else(|| PathBuf::from(constants::FALLBACK_STATE_DIR))
        })
    }

    /// Get the payload directory (with default)
    #[must_use]
    pub fn payload_dir(&self) -> PathBuf {
        self.paths
            .payload_dir
            .clone()
            .unwrap_or_else(|| self.state_dir().join(constants::PAYLOAD_DIR_NAME))
    }

    /// Get the session database path
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.state_dir().join(constants::DB_FILE_NAME)
    }

    /// Get the simulated platform state file
    #[must_use]
    pub fn platform_state_path(&self) -> PathBuf {
        self.state_dir().join(constants::PLATFORM_FILE_NAME)
    }

    #[must_use]
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.state.session_ttl_hours))
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.updates.check_interval_secs)
    }

    #[must_use]
    pub fn dedupe_window(&self) -> Duration {
        Duration::from_secs(self.updates.dedupe_window_secs)
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String) -> Result<T, Error> {
    value.parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        }
        .into()
    })
}
