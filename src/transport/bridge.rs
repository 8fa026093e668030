//! Typed surface of the in-process bridge injected by the host shell.
//!
//! The shell may inject its bridge object at any time after startup and may
//! grow its surface incrementally, so presence of a method is checked per
//! call through [`HostBridge::exposes`] rather than assumed once.

use crate::error::BridgeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Methods a host bridge can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeMethod {
    GetConfig,
    SaveConfig,
    SelectPptFile,
    PreviewHomework,
    SendHomework,
    GetSchedulerStatus,
    ExitApp,
    GetRestBase,
    Ping,
    Minimize,
    Close,
    GetAutostartStatus,
    ApplyAutostartConfig,
}

impl BridgeMethod {
    /// Every method, in declaration order.
    pub const ALL: [BridgeMethod; 13] = [
        Self::GetConfig,
        Self::SaveConfig,
        Self::SelectPptFile,
        Self::PreviewHomework,
        Self::SendHomework,
        Self::GetSchedulerStatus,
        Self::ExitApp,
        Self::GetRestBase,
        Self::Ping,
        Self::Minimize,
        Self::Close,
        Self::GetAutostartStatus,
        Self::ApplyAutostartConfig,
    ];

    /// Render the method name as the host shell spells it.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetConfig => "get_config",
            Self::SaveConfig => "save_config",
            Self::SelectPptFile => "select_ppt_file",
            Self::PreviewHomework => "preview_homework",
            Self::SendHomework => "send_homework",
            Self::GetSchedulerStatus => "get_scheduler_status",
            Self::ExitApp => "exit_app",
            Self::GetRestBase => "get_rest_base",
            Self::Ping => "ping",
            Self::Minimize => "minimize",
            Self::Close => "close",
            Self::GetAutostartStatus => "get_autostart_status",
            Self::ApplyAutostartConfig => "apply_autostart_config",
        }
    }

    /// Parse a method from its host-shell name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == raw)
    }
}

impl std::fmt::Display for BridgeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bridge object exposing backend operations as directly callable members.
///
/// Responses use the same field names as the REST backend. Arguments are a
/// JSON object whose keys match the REST request body for the same operation.
#[async_trait]
pub trait HostBridge: Send + Sync {
    /// Whether `method` is currently callable on this bridge.
    fn exposes(&self, method: BridgeMethod) -> bool;

    /// Invoke `method` with `args`.
    async fn invoke(
        &self,
        method: BridgeMethod,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, BridgeError>;
}
