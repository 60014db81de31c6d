//! CLI error handling

use std::fmt;

use sideload_errors::UserFacingError;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Configuration error
    Config(sideload_errors::ConfigError),
    /// Coordinator, gateway or storage error
    Ops(sideload_errors::Error),
    /// System setup error
    Setup(String),
    /// The installer reported a failed operation
    Failed(String),
    /// No terminal event arrived in time
    Timeout(String),
    /// The installer wants a confirmation nobody can give
    ConfirmationRequired(String),
    /// I/O error
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {e}"),
            CliError::Ops(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::Setup(msg) => write!(f, "System setup error: {msg}"),
            CliError::Failed(msg) => write!(f, "{msg}"),
            CliError::Timeout(msg) => write!(f, "Timed out: {msg}"),
            CliError::ConfirmationRequired(msg) => write!(f, "Confirmation required: {msg}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Ops(e) => Some(e),
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sideload_errors::ConfigError> for CliError {
    fn from(e: sideload_errors::ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<sideload_errors::Error> for CliError {
    fn from(e: sideload_errors::Error) -> Self {
        CliError::Ops(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
