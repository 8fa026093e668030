//! Progress poller for long-running backend operations.
//!
//! One session per [`PollKind`]. A session polls the progress endpoint on a
//! fixed interval, forwards `(percent, label)` to a callback, and ends when
//! the backend reports `installing` or the session is cancelled. Starting a
//! session for a kind that already has one retires the old one first.
//!
//! Cancellation is cooperative: each session owns a [`CancellationToken`]
//! that the loop checks before every tick and again after every poll
//! resolves, so a reply arriving after cancellation is discarded.

use crate::dispatch::Dispatcher;
use crate::error::error_codes;
use crate::operation::{Operation, OperationResult};
use crate::policy::PollingPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Progress callback: `(percent, label)`.
pub type ProgressFn = Arc<dyn Fn(u8, &str) + Send + Sync>;

/// Kinds of long-running operation that can be polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollKind {
    Update,
}

impl PollKind {
    fn progress_operation(self) -> Operation {
        match self {
            Self::Update => Operation::UpdateProgress,
        }
    }

    fn cancel_operation(self) -> Operation {
        match self {
            Self::Update => Operation::UpdateCancel,
        }
    }
}

/// Poll stage as reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    Downloading,
    Installing,
}

impl Stage {
    /// Parse a backend stage name. Unknown names read as idle.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "downloading" => Self::Downloading,
            "installing" => Self::Installing,
            _ => Self::Idle,
        }
    }
}

/// One decoded progress reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub stage: Stage,
    /// Clamped to 0..=100.
    pub percent: u8,
    pub source: Option<String>,
}

impl ProgressReport {
    /// Decode a progress result. Returns `None` for failed results or
    /// payloads without a `stage`.
    #[must_use]
    pub fn from_result(result: &OperationResult) -> Option<Self> {
        if !result.success {
            return None;
        }
        let data = result.data.as_ref()?;
        let stage = Stage::parse(data.get("stage")?.as_str()?);
        let percent = data
            .get("percent")
            .and_then(Value::as_f64)
            .map_or(0, |p| p.clamp(0.0, 100.0).round() as u8);
        let source = data
            .get("source")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_owned);
        Some(Self {
            stage,
            percent,
            source,
        })
    }

    /// Human label for the progress line.
    #[must_use]
    pub fn label(&self) -> String {
        match (self.stage, self.source.as_deref()) {
            (Stage::Downloading, Some(source)) => format!("Downloading update from {source}"),
            (Stage::Downloading, None) => "Downloading update".to_owned(),
            (Stage::Installing, _) => "Installing update".to_owned(),
            (Stage::Idle, _) => "Preparing update".to_owned(),
        }
    }
}

/// Last known state of a poll kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSnapshot {
    pub stage: Stage,
    pub percent: u8,
    pub source: Option<String>,
    /// A session is currently polling.
    pub active: bool,
}

struct SessionEntry {
    id: u64,
    token: CancellationToken,
    /// Cleared exactly once, by whoever retires the session first.
    live: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct PollerState {
    sessions: HashMap<PollKind, SessionEntry>,
    last: HashMap<PollKind, PollSnapshot>,
}

fn lock(state: &Mutex<PollerState>) -> MutexGuard<'_, PollerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns every poll session. Sessions are spawned on the current tokio runtime.
pub struct Poller {
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    max_consecutive_errors: Option<u32>,
    state: Arc<Mutex<PollerState>>,
    active_timers: Arc<AtomicUsize>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("interval", &self.interval)
            .field("active_timers", &self.active_timer_count())
            .finish()
    }
}

impl Poller {
    /// Create a poller issuing its polls through `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, policy: &PollingPolicy) -> Self {
        Self {
            dispatcher,
            interval: policy.update_interval(),
            max_consecutive_errors: policy.max_consecutive_poll_errors,
            state: Arc::new(Mutex::new(PollerState::default())),
            active_timers: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of live poll timers across all kinds.
    #[must_use]
    pub fn active_timer_count(&self) -> usize {
        self.active_timers.load(Ordering::SeqCst)
    }

    /// Last known state for `kind`.
    #[must_use]
    pub fn snapshot(&self, kind: PollKind) -> PollSnapshot {
        lock(&self.state).last.get(&kind).cloned().unwrap_or_default()
    }

    /// Whether `kind` has a running session.
    #[must_use]
    pub fn is_active(&self, kind: PollKind) -> bool {
        lock(&self.state).sessions.contains_key(&kind)
    }

    /// Start polling `kind`, reporting through `on_progress`.
    ///
    /// Any existing session for `kind` is retired first. Returns `true` if a
    /// session was superseded. Must be called from within a tokio runtime.
    pub fn start(&self, kind: PollKind, on_progress: ProgressFn) -> bool {
        let mut state = lock(&self.state);
        let superseded = match state.sessions.remove(&kind) {
            Some(previous) => {
                debug!(?kind, session = previous.id, "superseding poll session");
                self.retire(previous);
                true
            }
            None => false,
        };

        state.last.insert(
            kind,
            PollSnapshot {
                stage: Stage::Downloading,
                percent: 0,
                source: None,
                active: true,
            },
        );

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let live = Arc::new(AtomicBool::new(true));
        self.active_timers.fetch_add(1, Ordering::SeqCst);

        let session = Session {
            id,
            kind,
            interval: self.interval,
            max_consecutive_errors: self.max_consecutive_errors,
            dispatcher: Arc::clone(&self.dispatcher),
            state: Arc::clone(&self.state),
            active_timers: Arc::clone(&self.active_timers),
            token: token.clone(),
            live: Arc::clone(&live),
            on_progress,
        };
        let handle = tokio::spawn(session.run());
        state.sessions.insert(
            kind,
            SessionEntry {
                id,
                token,
                live,
                handle,
            },
        );
        info!(?kind, session = id, "poll session started");
        superseded
    }

    /// Stop polling `kind` locally and reset it to idle, without telling
    /// the backend.
    pub fn stop(&self, kind: PollKind) -> bool {
        let mut state = lock(&self.state);
        state.last.insert(kind, PollSnapshot::default());
        match state.sessions.remove(&kind) {
            Some(entry) => {
                debug!(?kind, session = entry.id, "poll session stopped");
                self.retire(entry);
                true
            }
            None => false,
        }
    }

    /// Cancel `kind`: stop locally, then ask the backend to cancel.
    ///
    /// The local stop is authoritative. The backend request is best-effort
    /// and its failure is only logged.
    pub async fn cancel(&self, kind: PollKind) {
        self.stop(kind);
        let result = self
            .dispatcher
            .call(kind.cancel_operation(), Value::Null)
            .await;
        if result.success {
            info!(?kind, "backend acknowledged cancellation");
        } else {
            debug!(?kind, error = result.error_message(), "backend cancel not acknowledged");
        }
    }

    /// Stop every session locally, e.g. when the UI is torn down.
    pub fn stop_all(&self) {
        let mut state = lock(&self.state);
        let kinds: Vec<PollKind> = state.sessions.keys().copied().collect();
        for kind in kinds {
            if let Some(entry) = state.sessions.remove(&kind) {
                self.retire(entry);
            }
            state.last.insert(kind, PollSnapshot::default());
        }
    }

    fn retire(&self, entry: SessionEntry) {
        entry.token.cancel();
        release_timer(&entry.live, &self.active_timers);
        entry.handle.abort();
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn release_timer(live: &AtomicBool, active_timers: &AtomicUsize) {
    if live
        .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        active_timers.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Session {
    id: u64,
    kind: PollKind,
    interval: Duration,
    max_consecutive_errors: Option<u32>,
    dispatcher: Arc<Dispatcher>,
    state: Arc<Mutex<PollerState>>,
    active_timers: Arc<AtomicUsize>,
    token: CancellationToken,
    live: Arc<AtomicBool>,
    on_progress: ProgressFn,
}

impl Session {
    async fn run(self) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut consecutive_errors: u32 = 0;

        loop {
            tokio::select! {
                biased;
                () = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.token.is_cancelled() {
                break;
            }

            let result = self
                .dispatcher
                .call(self.kind.progress_operation(), Value::Null)
                .await;
            if self.token.is_cancelled() {
                debug!(kind = ?self.kind, session = self.id, "discarding poll resolved after cancel");
                break;
            }

            let Some(report) = ProgressReport::from_result(&result) else {
                consecutive_errors += 1;
                warn!(
                    code = error_codes::POLL_TRANSIENT,
                    kind = ?self.kind,
                    consecutive_errors,
                    error = result.error_message(),
                    "progress poll failed"
                );
                if self
                    .max_consecutive_errors
                    .is_some_and(|max| consecutive_errors >= max)
                {
                    warn!(kind = ?self.kind, "giving up on progress polling");
                    let percent = self.record(None).map_or(0, |s| s.percent);
                    (self.on_progress)(percent, "Update progress unavailable");
                    break;
                }
                continue;
            };
            consecutive_errors = 0;

            let Some(snapshot) = self.record(Some(&report)) else {
                break;
            };
            (self.on_progress)(snapshot.percent, &report.label());
            if report.stage == Stage::Installing {
                info!(kind = ?self.kind, session = self.id, "installing; polling stops");
                break;
            }
        }

        self.finish();
    }

    /// Store `report` as the latest snapshot. `None` marks the session
    /// finished without a new report. Returns `None` if this session has been
    /// retired in the meantime.
    fn record(&self, report: Option<&ProgressReport>) -> Option<PollSnapshot> {
        let mut state = lock(&self.state);
        if self.token.is_cancelled()
            || state.sessions.get(&self.kind).map(|s| s.id) != Some(self.id)
        {
            return None;
        }
        let snapshot = state.last.entry(self.kind).or_default();
        if let Some(report) = report {
            snapshot.stage = report.stage;
            snapshot.percent = report.percent;
            snapshot.source.clone_from(&report.source);
        }
        Some(snapshot.clone())
    }

    fn finish(&self) {
        let mut state = lock(&self.state);
        if state.sessions.get(&self.kind).map(|s| s.id) == Some(self.id) {
            state.sessions.remove(&self.kind);
            if let Some(snapshot) = state.last.get_mut(&self.kind) {
                snapshot.active = false;
            }
        }
        drop(state);
        release_timer(&self.live, &self.active_timers);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    fn ok(data: Value) -> OperationResult {
        OperationResult::ok(Some(data))
    }

    #[test]
    fn report_decodes_stage_percent_and_source() {
        let report = ProgressReport::from_result(&ok(json!({
            "stage": "downloading",
            "percent": 42.4,
            "source": "mirror-1",
        })))
        .unwrap();
        assert_eq!(report.stage, Stage::Downloading);
        assert_eq!(report.percent, 42);
        assert_eq!(report.label(), "Downloading update from mirror-1");
    }

    #[test]
    fn report_clamps_percent() {
        let report =
            ProgressReport::from_result(&ok(json!({"stage": "installing", "percent": 140})))
                .unwrap();
        assert_eq!(report.percent, 100);
        assert_eq!(report.label(), "Installing update");
    }

    #[test]
    fn failed_or_stageless_result_is_not_a_report() {
        assert!(ProgressReport::from_result(&OperationResult::rejected("offline")).is_none());
        assert!(ProgressReport::from_result(&ok(json!({"percent": 5}))).is_none());
    }

    #[test]
    fn unknown_stage_reads_as_idle() {
        assert_eq!(Stage::parse("queued"), Stage::Idle);
        assert_eq!(Stage::parse(" Installing "), Stage::Installing);
    }
}
