//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! # Environment Overrides
//!
//! - `AUTOHOMEWORK_CONFIG_DIR` overrides [`config_dir`]
//! - `AUTOHOMEWORK_LOG_DIR` overrides [`logs_dir`]

use std::path::PathBuf;

const APP_DIR: &str = "autohomework";

/// Application config directory, holding `client.toml`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("AUTOHOMEWORK_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| std::env::temp_dir().join("autohomework-config"))
}

/// Directory for rolling log files.
#[must_use]
pub fn logs_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("AUTOHOMEWORK_LOG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR).join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("autohomework-logs"))
}
