//! Fixed names used under the state directory

/// Installer identity reported to the platform by default
pub const INSTALLER_ID: &str = "com.sideload.client";

pub const DB_FILE_NAME: &str = "sessions.sqlite";
pub const PLATFORM_FILE_NAME: &str = "platform.json";
pub const PAYLOAD_DIR_NAME: &str = "payloads";
pub const LOG_DIR_NAME: &str = "logs";

pub const FALLBACK_STATE_DIR: &str = ".sideload";
