//! Backend auto-send scheduler status and its monitor.
//!
//! The monitor is independent of the update poller: it runs its own timer,
//! reports through [`UiSink::update_scheduler`], and retries a failed check
//! once after a short delay.

use crate::dispatch::Dispatcher;
use crate::operation::{Operation, OperationResult};
use crate::policy::PollingPolicy;
use crate::ui::UiSink;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Status line shown when a check fails.
pub const CHECK_FAILED_LINE: &str = "Scheduler status check failed";

/// Snapshot of the backend's auto-send scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerStatus {
    pub auto_send_enabled: bool,
    pub scheduler_running: bool,
    pub scheduled_time: Option<String>,
    pub current_time: Option<String>,
    pub current_weekday: Option<String>,
    pub weekday_send_time: Option<String>,
    pub friday_send_time: Option<String>,
    pub next_run: Option<String>,
}

impl SchedulerStatus {
    /// Parse a status payload.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the payload does not have the status shape.
    pub fn from_payload(payload: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload)
    }

    /// Next run as `MM-DD HH:MM`, when the backend reported a parseable time.
    #[must_use]
    pub fn next_run_display(&self) -> Option<String> {
        let raw = self.next_run.as_deref()?.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("none") || raw.eq_ignore_ascii_case("unknown")
        {
            return None;
        }
        let naive = DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.naive_local())
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M"))
            .ok()?;
        Some(naive.format("%m-%d %H:%M").to_string())
    }

    /// Human summary for the scheduler line.
    #[must_use]
    pub fn summary(&self) -> String {
        if !self.auto_send_enabled {
            return "Auto-send disabled".to_owned();
        }
        if !self.scheduler_running {
            return "Auto-send enabled but scheduler not running".to_owned();
        }

        let mut line = String::from("Auto-send running");
        let now: Vec<&str> = [self.current_weekday.as_deref(), self.current_time.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        if !now.is_empty() {
            line.push_str(" - ");
            line.push_str(&now.join(" "));
        }
        if let Some(next) = self.next_run_display() {
            line.push_str(" | next: ");
            line.push_str(&next);
        }
        if let (Some(weekday), Some(friday)) = (
            self.weekday_send_time.as_deref(),
            self.friday_send_time.as_deref(),
        ) {
            line.push_str(&format!("\nMon-Thu: {weekday} | Fri: {friday}"));
        }
        line
    }
}

/// Fetch the scheduler status once.
///
/// # Errors
///
/// Returns a failed [`OperationResult`] when the call fails or the payload is
/// not a status object.
pub async fn fetch_status(dispatcher: &Dispatcher) -> Result<SchedulerStatus, OperationResult> {
    let result = dispatcher
        .call(Operation::SchedulerStatus, Value::Null)
        .await;
    if !result.success {
        return Err(result);
    }
    let payload = result.data.unwrap_or(Value::Null);
    if payload.is_null() {
        return Ok(SchedulerStatus::default());
    }
    SchedulerStatus::from_payload(payload)
        .map_err(|e| OperationResult::rejected(format!("invalid scheduler status: {e}")))
}

/// Background task polling the scheduler status.
#[derive(Debug)]
pub struct SchedulerMonitor {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl SchedulerMonitor {
    /// Check immediately, then on the policy interval until stopped.
    #[must_use]
    pub fn spawn(
        dispatcher: Arc<Dispatcher>,
        ui: Arc<dyn UiSink>,
        policy: &PollingPolicy,
    ) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(monitor_loop(
            dispatcher,
            ui,
            policy.scheduler_interval(),
            policy.scheduler_retry(),
            token.clone(),
        ));
        info!("scheduler monitor started");
        Self { token, handle }
    }

    /// Stop the monitor and wait for its task to end.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Err(e) = (&mut self.handle).await {
            debug!(error = %e, "scheduler monitor task ended abnormally");
        }
    }
}

impl Drop for SchedulerMonitor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn monitor_loop(
    dispatcher: Arc<Dispatcher>,
    ui: Arc<dyn UiSink>,
    interval: Duration,
    retry: Duration,
    token: CancellationToken,
) {
    loop {
        if !check_once(&dispatcher, ui.as_ref(), &token).await {
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(retry) => {}
            }
            check_once(&dispatcher, ui.as_ref(), &token).await;
        }

        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
    debug!("scheduler monitor stopped");
}

/// Returns `false` when the check failed.
async fn check_once(dispatcher: &Dispatcher, ui: &dyn UiSink, token: &CancellationToken) -> bool {
    let outcome = fetch_status(dispatcher).await;
    if token.is_cancelled() {
        return true;
    }
    match outcome {
        Ok(status) => {
            ui.update_scheduler(&status.summary());
            true
        }
        Err(result) => {
            warn!(error = result.error_message(), "scheduler status check failed");
            ui.update_scheduler(CHECK_FAILED_LINE);
            false
        }
    }
}
