//! Backend operations and the single result contract every call resolves to.

use crate::error::error_codes;
use crate::transport::bridge::BridgeMethod;
use crate::transport::rest::RestRoute;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical backend operations.
///
/// "Send content" is split by argument shape: [`Operation::SendInline`]
/// carries the previewed text, [`Operation::SendByReference`] carries the deck
/// path for the backend to re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetConfig,
    SaveConfig,
    SelectFile,
    PreviewFile,
    SendInline,
    SendByReference,
    SchedulerStatus,
    UpdateCheck,
    UpdateApply,
    UpdateProgress,
    UpdateCancel,
    Exit,
    Ping,
    WindowMinimize,
    WindowClose,
    AutostartStatus,
    AutostartApply,
}

impl Operation {
    /// Stable name used in logs and "not available" messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetConfig => "get_config",
            Self::SaveConfig => "save_config",
            Self::SelectFile => "select_file",
            Self::PreviewFile => "preview_file",
            Self::SendInline => "send_content",
            Self::SendByReference => "send_homework",
            Self::SchedulerStatus => "scheduler_status",
            Self::UpdateCheck => "update_check",
            Self::UpdateApply => "update_apply",
            Self::UpdateProgress => "update_progress",
            Self::UpdateCancel => "update_cancel",
            Self::Exit => "exit",
            Self::Ping => "ping",
            Self::WindowMinimize => "window_minimize",
            Self::WindowClose => "window_close",
            Self::AutostartStatus => "autostart_status",
            Self::AutostartApply => "autostart_apply",
        }
    }

    /// REST path and method, if the operation exists on REST.
    #[must_use]
    pub fn rest_route(self) -> Option<RestRoute> {
        Some(match self {
            Self::GetConfig => RestRoute::get("/api/config"),
            Self::SaveConfig => RestRoute::post("/api/config"),
            Self::SelectFile => RestRoute::post("/api/select_ppt_file"),
            Self::PreviewFile => RestRoute::post("/api/preview_homework"),
            Self::SendInline => RestRoute::post("/api/send_content"),
            Self::SendByReference => RestRoute::post("/api/send_homework"),
            Self::SchedulerStatus => RestRoute::get("/api/scheduler/status"),
            Self::UpdateCheck => RestRoute::get("/api/update/check"),
            Self::UpdateApply => RestRoute::post("/api/update/apply"),
            Self::UpdateProgress => RestRoute::get("/api/update/progress"),
            Self::UpdateCancel => RestRoute::post("/api/update/cancel"),
            Self::Exit => RestRoute::post("/api/exit"),
            Self::Ping => RestRoute::get("/api/ping"),
            Self::WindowMinimize => RestRoute::post("/api/window/minimize"),
            Self::WindowClose => RestRoute::post("/api/window/close"),
            Self::AutostartStatus => RestRoute::get("/api/autostart/status"),
            Self::AutostartApply => RestRoute::post("/api/autostart/apply"),
        })
    }

    /// Bridge method, if the operation exists on the bridge.
    #[must_use]
    pub fn bridge_method(self) -> Option<BridgeMethod> {
        match self {
            Self::GetConfig => Some(BridgeMethod::GetConfig),
            Self::SaveConfig => Some(BridgeMethod::SaveConfig),
            Self::SelectFile => Some(BridgeMethod::SelectPptFile),
            Self::PreviewFile => Some(BridgeMethod::PreviewHomework),
            Self::SendByReference => Some(BridgeMethod::SendHomework),
            Self::SchedulerStatus => Some(BridgeMethod::GetSchedulerStatus),
            Self::Exit => Some(BridgeMethod::ExitApp),
            Self::Ping => Some(BridgeMethod::Ping),
            Self::WindowMinimize => Some(BridgeMethod::Minimize),
            Self::WindowClose => Some(BridgeMethod::Close),
            Self::AutostartStatus => Some(BridgeMethod::GetAutostartStatus),
            Self::AutostartApply => Some(BridgeMethod::ApplyAutostartConfig),
            Self::SendInline
            | Self::UpdateCheck
            | Self::UpdateApply
            | Self::UpdateProgress
            | Self::UpdateCancel => None,
        }
    }

    /// Whether the bridge is tried before REST. These act on the host
    /// window or process, which the shell owns.
    #[must_use]
    pub fn prefers_bridge(self) -> bool {
        matches!(self, Self::Exit | Self::WindowMinimize | Self::WindowClose)
    }

    /// Whether repeating the operation on another transport is harmless.
    ///
    /// Non-idempotent operations fall back only when REST provably never
    /// received the request.
    #[must_use]
    pub fn is_idempotent(self) -> bool {
        matches!(
            self,
            Self::GetConfig
                | Self::SaveConfig
                | Self::PreviewFile
                | Self::SchedulerStatus
                | Self::UpdateCheck
                | Self::UpdateProgress
                | Self::Ping
                | Self::WindowMinimize
                | Self::WindowClose
                | Self::AutostartStatus
                | Self::AutostartApply
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy attached to every unsuccessful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Neither transport was usable within the policy window.
    TransportUnavailable,
    /// REST answered with a failure carrying no detail.
    SoftTransportFailure,
    /// A transport rejected the operation with a message.
    OperationRejected,
}

impl FailureKind {
    /// Stable error code for this kind.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::TransportUnavailable => error_codes::TRANSPORT_UNAVAILABLE,
            Self::SoftTransportFailure => error_codes::SOFT_TRANSPORT_FAILURE,
            Self::OperationRejected => error_codes::OPERATION_REJECTED,
        }
    }
}

/// Normalised outcome of one dispatched call.
///
/// `success == false` always comes with a non-empty `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

impl OperationResult {
    /// Successful result with optional payload.
    #[must_use]
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            kind: None,
        }
    }

    /// Failure of `kind` with `message`. Blank messages are replaced so the
    /// non-empty-error invariant holds.
    #[must_use]
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = kind.code().to_owned();
        }
        Self {
            success: false,
            data: None,
            error: Some(message),
            kind: Some(kind),
        }
    }

    /// Explicit rejection with a user-visible message.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::failure(FailureKind::OperationRejected, message)
    }

    /// Neither transport could serve `op`.
    #[must_use]
    pub fn unavailable(op: Operation) -> Self {
        Self::failure(
            FailureKind::TransportUnavailable,
            format!("{op} not available"),
        )
    }

    /// Payload field as a string, if present and non-empty.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data
            .as_ref()?
            .get(key)?
            .as_str()
            .filter(|s| !s.is_empty())
    }

    /// Error message, or an empty string on success.
    #[must_use]
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }
}

/// How a raw transport reply reads once normalised.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A definite answer: success, or rejection with a message.
    Completed(OperationResult),
    /// Failure without any detail.
    SoftFailure,
}

/// Normalise a raw REST or bridge reply for `op`.
///
/// Objects carrying `success` use it; objects without it are the payload
/// itself (e.g. the settings object). The `success` and `error` keys are
/// stripped from the payload.
#[must_use]
pub fn normalize(raw: Value) -> Reply {
    let Value::Object(mut map) = raw else {
        return match raw {
            Value::Null => Reply::Completed(OperationResult::ok(None)),
            other => Reply::Completed(OperationResult::ok(Some(other))),
        };
    };

    let success = map.remove("success").map(|v| v.as_bool().unwrap_or(false));
    let error = map
        .remove("error")
        .and_then(|v| match v {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|s| !s.trim().is_empty());

    match (success, error) {
        (Some(false), Some(message)) => Reply::Completed(OperationResult::rejected(message)),
        (Some(false), None) => Reply::SoftFailure,
        (None, Some(message)) if map.is_empty() => {
            Reply::Completed(OperationResult::rejected(message))
        }
        _ => {
            let data = (!map.is_empty()).then_some(Value::Object(map));
            Reply::Completed(OperationResult::ok(data))
        }
    }
}

/// Whether a REST get-config reply is a failure without an `access_token`.
///
/// Older backends answer this way while their settings store is still
/// loading, so the bridge is worth asking. Applies to REST replies only; a
/// bridge reply is taken as it reads.
#[must_use]
pub fn config_not_loaded(op: Operation, raw: &Value) -> bool {
    op == Operation::GetConfig
        && raw.get("success").and_then(Value::as_bool) == Some(false)
        && raw.get("access_token").is_none()
}

/// Which transport a [`CallAttempt`] used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Rest,
    Bridge,
}

/// What happened on one transport attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// The attempt produced the final result.
    Completed(OperationResult),
    /// Reachable, but failed without detail.
    SoftFailure,
    /// The transport itself failed.
    TransportFailed { error: String, delivered: bool },
    /// The capability gate failed: the bridge never exposed the method.
    Skipped,
}

/// Record of one transport attempt within a single dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct CallAttempt {
    pub transport: TransportKind,
    /// A capability or readiness wait preceded the attempt.
    pub gated: bool,
    pub outcome: AttemptOutcome,
}
