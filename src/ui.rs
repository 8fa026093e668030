//! Presentation sink.
//!
//! The client core never renders anything itself. Flows report through a
//! [`UiSink`], whose default methods write to the log so a headless front end
//! only overrides what it can display.

use crate::session::Preview;
use crate::update::UpdateStatus;
use tracing::{error, info};

/// Receives user-visible events from the client flows.
pub trait UiSink: Send + Sync {
    fn show_loading(&self, message: &str) {
        info!(target: "autohomework::ui", "{message}");
    }

    fn hide_loading(&self) {}

    /// Surface a failure verbatim.
    fn show_error(&self, message: &str) {
        error!(target: "autohomework::ui", "{message}");
    }

    fn show_success(&self, message: &str) {
        info!(target: "autohomework::ui", "{message}");
    }

    /// One-line status area.
    fn update_status(&self, text: &str) {
        info!(target: "autohomework::ui", status = text);
    }

    fn show_preview(&self, preview: &Preview) {
        info!(
            target: "autohomework::ui",
            file = %preview.file_name,
            chars = preview.content.chars().count(),
            "preview ready"
        );
    }

    fn update_progress(&self, percent: u8, label: &str) {
        info!(target: "autohomework::ui", percent, "{label}");
    }

    fn update_scheduler(&self, line: &str) {
        info!(target: "autohomework::ui", scheduler = line);
    }

    /// Result of an update check. The default announces it and logs the
    /// download link.
    fn show_update(&self, status: &UpdateStatus) {
        self.show_success(&status.message());
        if let UpdateStatus::Available { url: Some(url), .. } = status {
            info!(target: "autohomework::ui", url = %url, "download available");
        }
    }
}

/// Headless sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogUi;

impl UiSink for LogUi {}
