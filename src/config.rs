//! Configuration types for the client core.
//!
//! [`ClientConfig`] is the on-disk TOML file for this client. [`HomeworkSettings`]
//! is the typed view of the settings object owned by the backend and moved
//! through the get/save config operations.

use crate::error::{ClientError, Result};
use crate::policy::{PollingPolicy, ReadinessPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Well-known REST base of the local backend.
pub const DEFAULT_REST_BASE: &str = "http://127.0.0.1:58701";

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Local REST backend settings.
    pub rest: RestConfig,
    /// Transport readiness timing.
    pub readiness: ReadinessPolicy,
    /// Poll cadences.
    pub polling: PollingPolicy,
    /// Application identity and startup behaviour.
    pub app: AppConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Local REST backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    /// REST base address. Empty means bridge-only.
    pub base_url: String,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Overall timeout for the update-apply request, in seconds.
    pub apply_timeout_secs: u64,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REST_BASE.to_owned(),
            connect_timeout_ms: 2_000,
            apply_timeout_secs: 600,
            user_agent: format!("autohomework/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RestConfig {
    /// Returns the configured base with any trailing slash removed, or `None`
    /// when REST is disabled.
    #[must_use]
    pub fn base(&self) -> Option<String> {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    }
}

/// Application identity and startup behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Version compared against the latest release.
    pub version: String,
    /// Run one update check shortly after startup.
    pub startup_update_check: bool,
    /// Delay before the startup update check, in milliseconds.
    pub startup_update_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            startup_update_check: true,
            startup_update_delay_ms: 3_000,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Also write a daily-rolling log file.
    pub file_enabled: bool,
    /// Log directory override (defaults to [`crate::dirs::logs_dir`]).
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "autohomework=info".to_owned(),
            file_enabled: false,
            directory: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Load configuration from `path` if it exists, otherwise defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ClientError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        crate::dirs::config_dir().join("client.toml")
    }
}

/// Typed view of the backend settings object.
///
/// Unknown keys are preserved so a round trip through this type never drops
/// settings added by a newer backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeworkSettings {
    /// Webhook access token.
    pub access_token: String,
    /// Last selected slide deck.
    pub ppt_file_path: String,
    /// Whether scheduled auto-sends are enabled.
    pub auto_send_enabled: bool,
    /// Legacy single send time, kept for older backends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_send_time: Option<String>,
    /// Send time Monday to Thursday.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekday_send_time: Option<String>,
    /// Send time on Friday.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friday_send_time: Option<String>,
    /// UI theme name.
    pub theme: String,
    /// Start the UI at login.
    pub auto_start_ui: bool,
    /// Glass blur radius in pixels.
    pub glass_blur: f64,
    /// Glass opacity.
    pub glass_opacity: f64,
    /// Keys this client does not model.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for HomeworkSettings {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            ppt_file_path: String::new(),
            auto_send_enabled: false,
            auto_send_time: None,
            weekday_send_time: None,
            friday_send_time: None,
            theme: "dark".to_owned(),
            auto_start_ui: true,
            glass_blur: 20.0,
            glass_opacity: 0.15,
            extra: serde_json::Map::new(),
        }
    }
}

const DEFAULT_WEEKDAY_TIME: &str = "05:00";
const DEFAULT_FRIDAY_TIME: &str = "15:00";

impl HomeworkSettings {
    /// Parse settings from a backend payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a settings object.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Serialize for a save-config call, mirroring the weekday time into the
    /// legacy field.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        let mut out = self.clone();
        out.normalize_access_token();
        out.auto_send_time = Some(out.weekday_time().to_owned());
        serde_json::to_value(out).unwrap_or(serde_json::Value::Null)
    }

    /// The saved deck path, if one is set.
    #[must_use]
    pub fn saved_deck(&self) -> Option<&str> {
        let path = self.ppt_file_path.trim();
        (!path.is_empty()).then_some(path)
    }

    /// Effective Monday to Thursday send time.
    #[must_use]
    pub fn weekday_time(&self) -> &str {
        self.weekday_send_time
            .as_deref()
            .or(self.auto_send_time.as_deref())
            .unwrap_or(DEFAULT_WEEKDAY_TIME)
    }

    /// Effective Friday send time.
    #[must_use]
    pub fn friday_time(&self) -> &str {
        self.friday_send_time
            .as_deref()
            .or(self.auto_send_time.as_deref())
            .unwrap_or(DEFAULT_FRIDAY_TIME)
    }

    /// Replace a pasted webhook URL with just its `access_token` parameter.
    pub fn normalize_access_token(&mut self) {
        if !self.access_token.contains("access_token=") {
            return;
        }
        let Ok(parsed) = url::Url::parse(self.access_token.trim()) else {
            return;
        };
        if let Some((_, token)) = parsed
            .query_pairs()
            .find(|(k, v)| k == "access_token" && !v.is_empty())
        {
            self.access_token = token.into_owned();
        }
    }
}

/// Login-item state reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutostartStatus {
    /// The UI starts at login.
    pub ui_autostart: bool,
    /// Command registered for the UI login item, if any.
    pub ui_path: Option<String>,
}

impl AutostartStatus {
    /// Parse the status from a backend payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a status object.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// One-line description for the status line.
    #[must_use]
    pub fn label(&self) -> &'static str {
        if self.ui_autostart {
            "Start at login: enabled"
        } else {
            "Start at login: disabled"
        }
    }
}
