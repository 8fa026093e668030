//! Update apply flow: the apply request and the progress poller run side by
//! side, not in sequence.

use crate::dispatch::Dispatcher;
use crate::operation::{Operation, OperationResult};
use crate::update::poller::{PollKind, PollSnapshot, Poller, ProgressFn};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How an apply attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The backend accepted the update. `last` is whatever the poller saw
    /// most recently, which may still be `downloading`.
    Accepted { last: PollSnapshot },
    /// The user cancelled before the apply request returned.
    Cancelled,
    /// The backend or transport reported a failure.
    Failed(OperationResult),
}

/// Runs update apply with its paired progress poller.
#[derive(Debug)]
pub struct UpdateApplier {
    dispatcher: Arc<Dispatcher>,
    poller: Arc<Poller>,
    /// Abort handle of the in-flight apply, tagged with its attempt number.
    abort: Mutex<Option<(u64, CancellationToken)>>,
    attempts: AtomicU64,
}

impl UpdateApplier {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, poller: Arc<Poller>) -> Self {
        Self {
            dispatcher,
            poller,
            abort: Mutex::new(None),
            attempts: AtomicU64::new(0),
        }
    }

    /// Start polling, then issue the apply request with an abort handle.
    pub async fn apply(&self, on_progress: ProgressFn) -> ApplyOutcome {
        let token = CancellationToken::new();
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);
        if let Some((_, previous)) = self
            .abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((attempt, token.clone()))
        {
            previous.cancel();
        }

        self.poller.start(PollKind::Update, on_progress);
        info!("update apply requested");
        let result = self
            .dispatcher
            .call_abortable(Operation::UpdateApply, Value::Null, &token)
            .await;

        {
            let mut slot = self.abort.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|(id, _)| *id == attempt) {
                *slot = None;
            }
        }

        if token.is_cancelled() {
            info!("update apply cancelled");
            return ApplyOutcome::Cancelled;
        }
        if result.success {
            ApplyOutcome::Accepted {
                last: self.poller.snapshot(PollKind::Update),
            }
        } else {
            warn!(error = result.error_message(), "update apply failed");
            self.poller.stop(PollKind::Update);
            ApplyOutcome::Failed(result)
        }
    }

    /// Abort the in-flight apply request (if any) and cancel polling.
    ///
    /// Never fails; the local teardown happens whether or not the backend
    /// acknowledges.
    pub async fn cancel(&self) {
        if let Some((_, token)) = self
            .abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
        self.poller.cancel(PollKind::Update).await;
    }
}
