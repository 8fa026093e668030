//! Update availability check against the backend's release feed.

use crate::dispatch::Dispatcher;
use crate::operation::{Operation, OperationResult};
use crate::update::version::{is_newer, normalize_version};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Release information reported by `GET /api/update/check`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    /// Latest published version, without any `v` prefix.
    pub latest: String,
    /// Primary download page.
    pub download: Option<String>,
    /// Mirror download pages, most preferred first.
    pub mirrors: Vec<String>,
}

impl UpdateInfo {
    /// Read the release fields out of a check payload. Fields of the wrong
    /// type are treated as absent.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Self {
        let latest = payload
            .get("latest")
            .and_then(Value::as_str)
            .map(normalize_version)
            .filter(|v| !v.is_empty())
            .unwrap_or("0.0.0")
            .to_owned();
        let download = payload
            .get("download")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_owned);
        let mirrors = payload
            .get("mirrors")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            latest,
            download,
            mirrors,
        }
    }

    /// First mirror if any, else the primary download page.
    #[must_use]
    pub fn preferred_url(&self) -> Option<&str> {
        self.mirrors
            .first()
            .map(String::as_str)
            .or(self.download.as_deref())
    }

    /// Compare against the running version.
    #[must_use]
    pub fn evaluate(&self, current: &str) -> UpdateStatus {
        if is_newer(&self.latest, current) {
            UpdateStatus::Available {
                latest: self.latest.clone(),
                url: self.preferred_url().map(str::to_owned),
            }
        } else {
            UpdateStatus::UpToDate {
                current: normalize_version(current).to_owned(),
            }
        }
    }
}

/// Outcome of an update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    /// A newer release exists.
    Available { latest: String, url: Option<String> },
    /// The running version is current (or newer).
    UpToDate { current: String },
}

impl UpdateStatus {
    /// One-line message for the status area.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Available { latest, .. } => format!("New version {latest} available"),
            Self::UpToDate { .. } => "Already up to date".to_owned(),
        }
    }
}

/// Ask the backend for the latest release and compare with `current`.
///
/// `force` bypasses the backend's release cache.
///
/// # Errors
///
/// Returns the failed [`OperationResult`] when the check itself failed.
pub async fn check_for_update(
    dispatcher: &Dispatcher,
    current: &str,
    force: bool,
) -> Result<UpdateStatus, OperationResult> {
    let args = if force {
        json!({ "force": true })
    } else {
        Value::Null
    };
    let result = dispatcher.call(Operation::UpdateCheck, args).await;
    if !result.success {
        return Err(result);
    }
    let info = UpdateInfo::from_payload(result.data.as_ref().unwrap_or(&Value::Null));
    let status = info.evaluate(current);
    tracing::info!(latest = %info.latest, current, ?status, "update check complete");
    Ok(status)
}
