//! The assembled client: one owned context in place of page-level globals.
//!
//! Construction order is resolver, then dispatcher, then poller, each
//! depending only on what came before.

use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::operation::{Operation, OperationResult};
use crate::scheduler::SchedulerMonitor;
use crate::session::HomeworkSession;
use crate::transport::bridge::HostBridge;
use crate::transport::rest::RestTransport;
use crate::transport::state::TransportResolver;
use crate::ui::UiSink;
use crate::update::{ApplyOutcome, Poller, ProgressFn, UpdateApplier, UpdateStatus};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Client core bound to one UI sink.
pub struct Client {
    config: ClientConfig,
    dispatcher: Arc<Dispatcher>,
    poller: Arc<Poller>,
    updates: UpdateApplier,
    session: HomeworkSession,
    ui: Arc<dyn UiSink>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("dispatcher", &self.dispatcher)
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Build the client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, ui: Arc<dyn UiSink>) -> Result<Self> {
        let resolver = TransportResolver::new(config.rest.base(), config.readiness.clone());
        let rest = RestTransport::new(&config.rest)?;
        let dispatcher = Arc::new(Dispatcher::new(resolver, rest));
        let poller = Arc::new(Poller::new(Arc::clone(&dispatcher), &config.polling));
        let updates = UpdateApplier::new(Arc::clone(&dispatcher), Arc::clone(&poller));
        let session = HomeworkSession::new(Arc::clone(&dispatcher), Arc::clone(&ui));
        info!(
            rest_base = ?config.rest.base(),
            version = %config.app.version,
            "client constructed"
        );
        Ok(Self {
            config,
            dispatcher,
            poller,
            updates,
            session,
            ui,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn resolver(&self) -> &TransportResolver {
        self.dispatcher.resolver()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    #[must_use]
    pub fn session(&self) -> &HomeworkSession {
        &self.session
    }

    /// Install the host shell's bridge. This is the readiness signal.
    pub fn install_bridge(&self, bridge: Arc<dyn HostBridge>) {
        self.resolver().install_bridge(bridge);
    }

    /// Wait for the initial readiness window.
    pub async fn wait_ready(&self) -> bool {
        let resolver = self.resolver();
        resolver.wait_ready(resolver.policy().initial_wait()).await
    }

    /// Round-trip check against the backend.
    pub async fn ping(&self) -> OperationResult {
        self.dispatcher.call(Operation::Ping, Value::Null).await
    }

    /// Check for a newer release and report it to the UI.
    ///
    /// # Errors
    ///
    /// Returns the failed result when the check could not be made.
    pub async fn check_update(&self, force: bool) -> std::result::Result<UpdateStatus, OperationResult> {
        check_and_report(&self.dispatcher, self.ui.as_ref(), &self.config.app.version, force).await
    }

    /// Apply the available update, reporting progress to the UI.
    pub async fn apply_update(&self) -> ApplyOutcome {
        let ui = Arc::clone(&self.ui);
        let on_progress: ProgressFn =
            Arc::new(move |percent: u8, label: &str| ui.update_progress(percent, label));
        let outcome = self.updates.apply(on_progress).await;
        match &outcome {
            ApplyOutcome::Accepted { last } => {
                self.ui.update_progress(last.percent, "Update accepted");
            }
            ApplyOutcome::Cancelled => self.ui.update_status("Update cancelled"),
            ApplyOutcome::Failed(result) => self
                .ui
                .show_error(&format!("Update failed: {}", result.error_message())),
        }
        outcome
    }

    /// Cancel a running update. Always honoured locally.
    pub async fn cancel_update(&self) {
        self.updates.cancel().await;
        self.ui.update_status("Update cancelled");
    }

    /// Start the scheduler status monitor.
    #[must_use]
    pub fn spawn_scheduler_monitor(&self) -> SchedulerMonitor {
        SchedulerMonitor::spawn(
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.ui),
            &self.config.polling,
        )
    }

    /// Run one update check after the configured startup delay, if enabled.
    #[must_use]
    pub fn spawn_startup_update_check(&self) -> Option<JoinHandle<()>> {
        if !self.config.app.startup_update_check {
            return None;
        }
        let dispatcher = Arc::clone(&self.dispatcher);
        let ui = Arc::clone(&self.ui);
        let version = self.config.app.version.clone();
        let delay = Duration::from_millis(self.config.app.startup_update_delay_ms);
        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(result) = check_and_report(&dispatcher, ui.as_ref(), &version, false).await {
                debug!(error = result.error_message(), "startup update check failed");
            }
        }))
    }

    /// Minimize the host window: bridge first, REST as fallback.
    pub async fn minimize_window(&self) -> OperationResult {
        self.dispatcher
            .call(Operation::WindowMinimize, Value::Null)
            .await
    }

    /// Hide the host window to the tray: bridge first, REST as fallback.
    pub async fn close_window(&self) -> OperationResult {
        self.dispatcher.call(Operation::WindowClose, Value::Null).await
    }

    /// Ask the host to exit: bridge first, REST as fallback.
    pub async fn exit(&self) -> OperationResult {
        self.poller.stop_all();
        self.dispatcher.call(Operation::Exit, Value::Null).await
    }
}

async fn check_and_report(
    dispatcher: &Dispatcher,
    ui: &dyn UiSink,
    version: &str,
    force: bool,
) -> std::result::Result<UpdateStatus, OperationResult> {
    match crate::update::check_for_update(dispatcher, version, force).await {
        Ok(status) => {
            ui.show_update(&status);
            Ok(status)
        }
        Err(result) => {
            ui.show_error(&format!("Update check failed: {}", result.error_message()));
            Err(result)
        }
    }
}
