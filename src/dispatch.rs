//! Dual-transport call dispatcher.
//!
//! Every backend operation goes through [`Dispatcher::call`], which tries REST
//! first and falls back to the host bridge, strictly in sequence. The
//! dispatcher holds no per-call state besides the [`TransportResolver`] it
//! reads, and every path resolves to an [`OperationResult`].

use crate::error::BridgeError;
use crate::operation::{
    AttemptOutcome, CallAttempt, FailureKind, Operation, OperationResult, Reply, TransportKind,
    config_not_loaded, normalize,
};
use crate::transport::bridge::BridgeMethod;
use crate::transport::rest::RestTransport;
use crate::transport::state::TransportResolver;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Routes operations to REST or the bridge.
pub struct Dispatcher {
    resolver: TransportResolver,
    rest: RestTransport,
    /// Count of REST -> bridge fallbacks (for observability).
    fallback_count: AtomicU32,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("resolver", &self.resolver)
            .field("fallback_count", &self.fallback_count())
            .finish()
    }
}

/// What the REST step left behind for the bridge step.
enum RestStep {
    Done(OperationResult),
    /// Try the bridge. A REST answer worth reporting if the bridge cannot
    /// serve the call is kept here.
    FallThrough(Option<OperationResult>),
}

impl Dispatcher {
    /// Create a dispatcher over `resolver`, issuing HTTP through `rest`.
    #[must_use]
    pub fn new(resolver: TransportResolver, rest: RestTransport) -> Self {
        Self {
            resolver,
            rest,
            fallback_count: AtomicU32::new(0),
        }
    }

    /// The resolver this dispatcher reads.
    #[must_use]
    pub fn resolver(&self) -> &TransportResolver {
        &self.resolver
    }

    /// Number of times a call fell back from REST to the bridge.
    pub fn fallback_count(&self) -> u32 {
        self.fallback_count.load(Ordering::Relaxed)
    }

    /// Dispatch `op` with `args`. Never fails; see [`OperationResult`].
    pub async fn call(&self, op: Operation, args: Value) -> OperationResult {
        self.call_with_trace(op, args).await.0
    }

    /// Like [`Dispatcher::call`], also returning the attempts made.
    pub async fn call_with_trace(
        &self,
        op: Operation,
        args: Value,
    ) -> (OperationResult, Vec<CallAttempt>) {
        self.dispatch(op, args, None).await
    }

    /// Dispatch `op` with its REST request interruptible through `cancel`.
    ///
    /// Used for update apply, the only request allowed to be aborted.
    pub async fn call_abortable(
        &self,
        op: Operation,
        args: Value,
        cancel: &CancellationToken,
    ) -> OperationResult {
        self.dispatch(op, args, Some(cancel)).await.0
    }

    /// Send the previewed homework.
    ///
    /// With a REST base the content goes inline; the deck path is sent by
    /// reference when REST is absent or could not take the inline form.
    pub async fn send_content(&self, content: &str, file_path: Option<&str>) -> OperationResult {
        if self.resolver.resolve().rest_base.is_some() {
            let inline = self
                .call(Operation::SendInline, json!({ "content": content }))
                .await;
            if inline.kind != Some(FailureKind::TransportUnavailable) {
                return inline;
            }
            debug!("inline send unavailable, trying by reference");
        }

        match file_path.filter(|p| !p.trim().is_empty()) {
            Some(path) => {
                self.call(Operation::SendByReference, json!({ "file_path": path }))
                    .await
            }
            None => OperationResult::unavailable(Operation::SendByReference),
        }
    }

    /// Ping the bridge if it exposes `ping` right now, without waiting.
    ///
    /// Returns `None` when no bridge can take the ping.
    pub async fn ping_bridge(&self) -> Option<OperationResult> {
        let mut attempts = Vec::new();
        self.attempt_bridge(Operation::Ping, &json!({}), false, &mut attempts)
            .await
    }

    async fn dispatch(
        &self,
        op: Operation,
        args: Value,
        cancel: Option<&CancellationToken>,
    ) -> (OperationResult, Vec<CallAttempt>) {
        let mut attempts = Vec::new();

        if op.prefers_bridge() {
            if let Some(result) = self.attempt_bridge(op, &args, false, &mut attempts).await {
                return (result, attempts);
            }
        }

        let (rest_tried, held) = match self.attempt_rest(op, &args, cancel, &mut attempts).await {
            Some(RestStep::Done(result)) => return (result, attempts),
            Some(RestStep::FallThrough(held)) => (true, held),
            None => (false, None),
        };

        if let Some(result) = self.attempt_bridge(op, &args, true, &mut attempts).await {
            if rest_tried {
                self.fallback_count.fetch_add(1, Ordering::Relaxed);
                debug!(op = %op, "served by bridge after REST fallback");
            }
            return (result, attempts);
        }

        if let Some(result) = held {
            debug!(op = %op, error = result.error_message(), "bridge unavailable, keeping REST answer");
            return (result, attempts);
        }
        warn!(op = %op, attempts = attempts.len(), "no transport available");
        (OperationResult::unavailable(op), attempts)
    }

    /// Returns `None` when REST is not configured or has no such route.
    async fn attempt_rest(
        &self,
        op: Operation,
        args: &Value,
        cancel: Option<&CancellationToken>,
        attempts: &mut Vec<CallAttempt>,
    ) -> Option<RestStep> {
        let base = self.resolver.resolve().rest_base?;
        let route = op.rest_route()?;

        let reply = match cancel {
            Some(token) => self.rest.send_abortable(&base, route, args, token).await,
            None => self.rest.send(&base, route, args).await,
        };

        let step = match reply {
            Ok(raw) if config_not_loaded(op, &raw) => {
                attempts.push(CallAttempt {
                    transport: TransportKind::Rest,
                    gated: false,
                    outcome: AttemptOutcome::SoftFailure,
                });
                debug!(op = %op, "REST settings not loaded, falling back");
                match normalize(raw) {
                    Reply::Completed(result) => RestStep::FallThrough(Some(result)),
                    Reply::SoftFailure => RestStep::FallThrough(None),
                }
            }
            Ok(raw) => match normalize(raw) {
                Reply::Completed(result) => {
                    attempts.push(CallAttempt {
                        transport: TransportKind::Rest,
                        gated: false,
                        outcome: AttemptOutcome::Completed(result.clone()),
                    });
                    RestStep::Done(result)
                }
                Reply::SoftFailure => {
                    attempts.push(CallAttempt {
                        transport: TransportKind::Rest,
                        gated: false,
                        outcome: AttemptOutcome::SoftFailure,
                    });
                    if op.is_idempotent() {
                        debug!(op = %op, "REST soft failure, falling back");
                        RestStep::FallThrough(None)
                    } else {
                        RestStep::Done(OperationResult::failure(
                            FailureKind::SoftTransportFailure,
                            format!("{op} failed"),
                        ))
                    }
                }
            },
            Err(e) => {
                let delivered = !e.request_not_delivered();
                debug!(op = %op, error = %e, delivered, "REST transport failure");
                attempts.push(CallAttempt {
                    transport: TransportKind::Rest,
                    gated: false,
                    outcome: AttemptOutcome::TransportFailed {
                        error: e.to_string(),
                        delivered,
                    },
                });
                match (delivered, op.is_idempotent()) {
                    (true, false) => RestStep::Done(OperationResult::rejected(e.to_string())),
                    (true, true) => {
                        RestStep::FallThrough(Some(OperationResult::rejected(e.to_string())))
                    }
                    (false, _) => RestStep::FallThrough(None),
                }
            }
        };
        Some(step)
    }

    /// Returns `None` when the bridge cannot serve `op`.
    async fn attempt_bridge(
        &self,
        op: Operation,
        args: &Value,
        gated: bool,
        attempts: &mut Vec<CallAttempt>,
    ) -> Option<OperationResult> {
        let method = op.bridge_method()?;
        let exposed = if gated {
            self.probe(method).await
        } else {
            self.resolver.exposes(method)
        };
        let bridge = self.resolver.bridge().filter(|_| exposed);
        let Some(bridge) = bridge else {
            attempts.push(CallAttempt {
                transport: TransportKind::Bridge,
                gated,
                outcome: AttemptOutcome::Skipped,
            });
            return None;
        };

        let result = match bridge.invoke(method, args.clone()).await {
            Ok(raw) => match normalize(raw) {
                Reply::Completed(result) => result,
                Reply::SoftFailure => OperationResult::failure(
                    FailureKind::SoftTransportFailure,
                    format!("{op} failed"),
                ),
            },
            Err(e @ (BridgeError::Missing(_) | BridgeError::Closed)) => {
                warn!(op = %op, error = %e, "bridge vanished mid-call");
                if e == BridgeError::Closed {
                    self.resolver.remove_bridge();
                }
                attempts.push(CallAttempt {
                    transport: TransportKind::Bridge,
                    gated,
                    outcome: AttemptOutcome::TransportFailed {
                        error: e.to_string(),
                        delivered: false,
                    },
                });
                return None;
            }
            Err(BridgeError::Call(message)) => OperationResult::rejected(message),
        };

        attempts.push(CallAttempt {
            transport: TransportKind::Bridge,
            gated,
            outcome: AttemptOutcome::Completed(result.clone()),
        });
        Some(result)
    }

    /// Capability gate with bounded re-probes.
    ///
    /// Never waits longer than [`ReadinessPolicy::bridge_budget`].
    ///
    /// [`ReadinessPolicy::bridge_budget`]: crate::policy::ReadinessPolicy::bridge_budget
    async fn probe(&self, method: BridgeMethod) -> bool {
        if self.resolver.exposes(method) {
            return true;
        }
        let policy = self.resolver.policy();
        let reprobe = async {
            for attempt in 1..=policy.bridge_probe_retries {
                if self
                    .resolver
                    .wait_for_capability(method, policy.bridge_probe_window())
                    .await
                {
                    return true;
                }
                debug!(method = %method, attempt, "bridge capability still missing");
            }
            false
        };
        tokio::time::timeout(policy.bridge_budget(), reprobe)
            .await
            .unwrap_or_else(|_| self.resolver.exposes(method))
    }
}
