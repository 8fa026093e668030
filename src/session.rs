//! User-facing homework flows: select and preview a slide deck, confirm the
//! send, and load or save settings.

use crate::config::{AutostartStatus, HomeworkSettings};
use crate::dispatch::Dispatcher;
use crate::operation::{FailureKind, Operation, OperationResult};
use crate::ui::UiSink;
use serde::Serialize;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// A parsed slide deck ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub file_path: String,
    pub file_name: String,
    /// Markdown rendering of the deck.
    pub content: String,
}

/// How a select-and-preview run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Another run was already in flight; nothing was done.
    Skipped,
    /// No transport became ready in time.
    NotReady,
    Previewed(Preview),
    /// The user dismissed the file dialog.
    NoSelection,
    /// The flow failed; the message was already shown.
    Failed(String),
}

/// Clears the busy flag when the flow ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Stateful homework flows over a shared dispatcher.
pub struct HomeworkSession {
    dispatcher: Arc<Dispatcher>,
    ui: Arc<dyn UiSink>,
    busy: AtomicBool,
    current: Mutex<Option<Preview>>,
}

impl std::fmt::Debug for HomeworkSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeworkSession")
            .field("busy", &self.is_busy())
            .field("current", &*self.current())
            .finish()
    }
}

impl HomeworkSession {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, ui: Arc<dyn UiSink>) -> Self {
        Self {
            dispatcher,
            ui,
            busy: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    /// Whether a select-and-preview run is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// The preview awaiting confirmation, if any.
    #[must_use]
    pub fn current_preview(&self) -> Option<Preview> {
        self.current().clone()
    }

    /// Forget the pending preview.
    pub fn clear(&self) {
        *self.current() = None;
    }

    fn current(&self) -> MutexGuard<'_, Option<Preview>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_begin(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(&self.busy))
    }

    /// Preview the saved deck, or ask for one and preview it.
    ///
    /// A call made while another is in flight returns
    /// [`FlowOutcome::Skipped`] without touching the network.
    pub async fn select_and_preview(&self) -> FlowOutcome {
        let Some(_guard) = self.try_begin() else {
            debug!("select-and-preview already running");
            return FlowOutcome::Skipped;
        };

        let resolver = self.dispatcher.resolver();
        resolver.backfill_rest_base().await;
        if !resolver.is_ready() && !resolver.wait_ready(resolver.policy().initial_wait()).await {
            self.ui
                .show_error("Backend interface not ready, please try again later");
            return FlowOutcome::NotReady;
        }
        self.ping_bridge().await;

        if let Some(preview) = self.preview_saved_deck().await {
            return FlowOutcome::Previewed(preview);
        }

        self.ui.show_loading("Selecting slide deck...");
        let outcome = self.select_new_deck().await;
        self.ui.hide_loading();
        outcome
    }

    /// Check the bridge answers before relying on it. Never fatal.
    async fn ping_bridge(&self) {
        match self.dispatcher.ping_bridge().await {
            Some(reply) if reply.success => debug!("bridge answered ping"),
            Some(reply) => warn!(error = reply.error_message(), "bridge ping failed, continuing"),
            None => {}
        }
    }

    async fn preview_saved_deck(&self) -> Option<Preview> {
        let settings = match self.load_settings().await {
            Ok(settings) => settings,
            Err(result) => {
                debug!(error = result.error_message(), "saved settings unavailable");
                return None;
            }
        };
        let path = settings.saved_deck()?.to_owned();

        self.ui.show_loading("Loading saved slide deck...");
        let preview = self.preview(&path).await;
        self.ui.hide_loading();
        match preview {
            Ok(preview) => {
                self.accept(&preview);
                Some(preview)
            }
            Err(message) => {
                self.ui
                    .show_error(&format!("Failed to parse slide deck: {message}"));
                None
            }
        }
    }

    async fn select_new_deck(&self) -> FlowOutcome {
        let selected = self.dispatcher.call(Operation::SelectFile, Value::Null).await;
        if !selected.success && selected.kind != Some(FailureKind::SoftTransportFailure) {
            let message = selected.error_message().to_owned();
            self.ui.show_error(&format!("Operation failed: {message}"));
            return FlowOutcome::Failed(message);
        }
        let Some(path) = selected.str_field("file_path").map(str::to_owned) else {
            self.ui.update_status("No file selected");
            return FlowOutcome::NoSelection;
        };

        info!(path = %path, "slide deck selected");
        self.ui.update_status("Parsing slide deck...");
        match self.preview(&path).await {
            Ok(preview) => {
                self.accept(&preview);
                FlowOutcome::Previewed(preview)
            }
            Err(message) => {
                self.ui
                    .show_error(&format!("Failed to parse slide deck: {message}"));
                FlowOutcome::Failed(message)
            }
        }
    }

    /// Ask the backend to render `path` as Markdown.
    async fn preview(&self, path: &str) -> Result<Preview, String> {
        let result = self
            .dispatcher
            .call(Operation::PreviewFile, json!({ "file_path": path }))
            .await;
        if !result.success {
            return Err(result.error_message().to_owned());
        }
        let content = result
            .data
            .as_ref()
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let file_name = result
            .str_field("file_name")
            .map(str::to_owned)
            .or_else(|| {
                Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| path.to_owned());
        Ok(Preview {
            file_path: path.to_owned(),
            file_name,
            content,
        })
    }

    fn accept(&self, preview: &Preview) {
        *self.current() = Some(preview.clone());
        self.ui.show_preview(preview);
    }

    /// Send the pending preview: content inline over REST, or the deck path
    /// over the bridge.
    pub async fn confirm_send(&self) -> OperationResult {
        let Some(preview) = self.current_preview() else {
            self.ui.show_error("Nothing to send");
            return OperationResult::rejected("nothing to send");
        };
        if preview.content.trim().is_empty() {
            self.ui.show_error("Nothing to send");
            return OperationResult::rejected("nothing to send");
        }

        self.ui.show_loading("Sending homework...");
        let result = self
            .dispatcher
            .send_content(&preview.content, Some(&preview.file_path))
            .await;
        self.ui.hide_loading();

        if result.success {
            info!(file = %preview.file_name, "homework sent");
            self.ui.show_success("Sent successfully");
            self.ui.update_status("Send complete");
            self.clear();
        } else {
            warn!(error = result.error_message(), "homework send failed");
            self.ui
                .show_error(&format!("Send failed: {}", result.error_message()));
        }
        result
    }

    /// Load the backend settings.
    ///
    /// # Errors
    ///
    /// Returns the failed result when the call fails or the payload is not a
    /// settings object.
    pub async fn load_settings(&self) -> Result<HomeworkSettings, OperationResult> {
        let result = self.dispatcher.call(Operation::GetConfig, Value::Null).await;
        if !result.success {
            return Err(result);
        }
        let payload = result.data.unwrap_or_else(|| json!({}));
        HomeworkSettings::from_value(payload)
            .map_err(|e| OperationResult::rejected(format!("invalid settings: {e}")))
    }

    /// Save `settings`, normalising a pasted webhook URL to its token.
    pub async fn save_settings(&self, settings: &HomeworkSettings) -> OperationResult {
        let result = self
            .dispatcher
            .call(Operation::SaveConfig, settings.to_value())
            .await;
        if result.success {
            self.ui.show_success("Settings saved");
            self.refresh_autostart().await;
        } else {
            self.ui
                .show_error(&format!("Failed to save settings: {}", result.error_message()));
        }
        result
    }

    /// Query whether the UI starts at login.
    ///
    /// # Errors
    ///
    /// Returns the failed result when the call fails or the payload is not a
    /// status object.
    pub async fn autostart_status(&self) -> Result<AutostartStatus, OperationResult> {
        let result = self
            .dispatcher
            .call(Operation::AutostartStatus, Value::Null)
            .await;
        if !result.success {
            return Err(result);
        }
        AutostartStatus::from_value(result.data.unwrap_or_else(|| json!({})))
            .map_err(|e| OperationResult::rejected(format!("invalid autostart status: {e}")))
    }

    /// Register or remove the UI login item to match `settings`.
    pub async fn apply_autostart(&self, settings: &HomeworkSettings) -> OperationResult {
        let result = self
            .dispatcher
            .call(
                Operation::AutostartApply,
                json!({ "auto_start_ui": settings.auto_start_ui }),
            )
            .await;
        if !result.success {
            self.ui.show_error(&format!(
                "Failed to update start at login: {}",
                result.error_message()
            ));
        }
        result
    }

    /// Show the current login-item state. Failures are only logged.
    async fn refresh_autostart(&self) {
        match self.autostart_status().await {
            Ok(status) => self.ui.update_status(status.label()),
            Err(result) => debug!(error = result.error_message(), "autostart status unavailable"),
        }
    }
}
