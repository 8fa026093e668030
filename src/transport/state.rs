//! Transport resolution: which of REST and the bridge is usable right now.

use crate::policy::ReadinessPolicy;
use crate::transport::bridge::{BridgeMethod, HostBridge};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Snapshot of the transports known to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportState {
    /// REST base address, when known.
    pub rest_base: Option<String>,
    /// Whether the host shell has injected its bridge object.
    pub bridge_available: bool,
}

impl TransportState {
    /// At least one transport is usable.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.rest_base.is_some() || self.bridge_available
    }
}

struct Inner {
    rest_base: RwLock<Option<String>>,
    bridge: RwLock<Option<Arc<dyn HostBridge>>>,
    policy: ReadinessPolicy,
}

/// Owns the [`TransportState`] and is the only component that mutates it.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TransportResolver {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TransportResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResolver")
            .field("state", &self.resolve())
            .finish()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl TransportResolver {
    /// Create a resolver with an optional initial REST base.
    #[must_use]
    pub fn new(rest_base: Option<String>, policy: ReadinessPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                rest_base: RwLock::new(rest_base),
                bridge: RwLock::new(None),
                policy,
            }),
        }
    }

    /// Current transport snapshot. Never blocks on I/O.
    #[must_use]
    pub fn resolve(&self) -> TransportState {
        TransportState {
            rest_base: read(&self.inner.rest_base).clone(),
            bridge_available: read(&self.inner.bridge).is_some(),
        }
    }

    /// Whether any transport is usable.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.resolve().is_ready()
    }

    /// Readiness timing in effect.
    #[must_use]
    pub fn policy(&self) -> &ReadinessPolicy {
        &self.inner.policy
    }

    /// Replace the REST base.
    pub fn set_rest_base(&self, base: Option<String>) {
        let base = base
            .map(|b| b.trim().trim_end_matches('/').to_owned())
            .filter(|b| !b.is_empty());
        info!(rest_base = ?base, "REST base updated");
        *write(&self.inner.rest_base) = base;
    }

    /// Install the bridge object injected by the host shell.
    ///
    /// This is the host's readiness signal; the bridge's surface may still be
    /// partial and is probed per call.
    pub fn install_bridge(&self, bridge: Arc<dyn HostBridge>) {
        *write(&self.inner.bridge) = Some(bridge);
        info!("host bridge installed");
    }

    /// Forget the bridge object, e.g. when the host shell is torn down.
    pub fn remove_bridge(&self) {
        *write(&self.inner.bridge) = None;
        info!("host bridge removed");
    }

    /// The installed bridge, if any.
    #[must_use]
    pub fn bridge(&self) -> Option<Arc<dyn HostBridge>> {
        read(&self.inner.bridge).clone()
    }

    /// Capability probe: true only if a bridge is installed and currently
    /// exposes `method`. Not cached, since the surface can grow between checks.
    #[must_use]
    pub fn exposes(&self, method: BridgeMethod) -> bool {
        read(&self.inner.bridge)
            .as_ref()
            .is_some_and(|b| b.exposes(method))
    }

    /// Capability probe by host-shell method name.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        BridgeMethod::parse(name).is_some_and(|m| self.exposes(m))
    }

    /// Wait until a REST base is set or a bridge is installed.
    ///
    /// Checks on the policy step (never faster than 10 Hz). Returns `false`
    /// on timeout. When readiness is first observed through the bridge alone,
    /// the REST base is backfilled from the bridge if it can provide one.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        if self.is_ready() {
            return true;
        }

        let started = Instant::now();
        let deadline = started + timeout;
        let step = self.inner.policy.step();
        let mut checks: u32 = 0;
        debug!(timeout_ms = timeout.as_millis() as u64, "waiting for transports");

        loop {
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    elapsed_ms = now.duration_since(started).as_millis() as u64,
                    "timed out waiting for transports"
                );
                return false;
            }
            tokio::time::sleep(step.min(deadline - now)).await;
            checks += 1;

            if self.is_ready() {
                debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    checks, "transport became ready"
                );
                if self.resolve().rest_base.is_none() {
                    self.backfill_rest_base().await;
                }
                return true;
            }
            if checks % 10 == 0 {
                debug!(checks, "still waiting for transports");
            }
        }
    }

    /// Wait up to `window` for the bridge to expose `method`.
    pub async fn wait_for_capability(&self, method: BridgeMethod, window: Duration) -> bool {
        if self.exposes(method) {
            return true;
        }
        let deadline = Instant::now() + window;
        let step = self.inner.policy.step();
        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(step.min(deadline - now)).await;
            if self.exposes(method) {
                return true;
            }
        }
    }

    /// Ask the bridge for the REST base when none is set.
    ///
    /// Returns `true` when a REST base is known afterwards.
    pub async fn backfill_rest_base(&self) -> bool {
        if read(&self.inner.rest_base).is_some() {
            return true;
        }
        let Some(bridge) = self.bridge() else {
            return false;
        };
        if !bridge.exposes(BridgeMethod::GetRestBase) {
            return false;
        }

        match bridge
            .invoke(BridgeMethod::GetRestBase, serde_json::json!({}))
            .await
        {
            Ok(reply) => {
                let accepted = reply.get("success").and_then(|v| v.as_bool()) != Some(false);
                let base = reply
                    .get("base")
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|b| !b.is_empty());
                match (accepted, base) {
                    (true, Some(base)) => {
                        self.set_rest_base(Some(base.to_owned()));
                        true
                    }
                    _ => {
                        debug!("bridge did not report a REST base");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "get_rest_base failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::BridgeError;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct StubBridge {
        surface: Mutex<HashSet<BridgeMethod>>,
        rest_base: Option<&'static str>,
    }

    impl StubBridge {
        fn new(methods: &[BridgeMethod], rest_base: Option<&'static str>) -> Self {
            Self {
                surface: Mutex::new(methods.iter().copied().collect()),
                rest_base,
            }
        }
    }

    #[async_trait]
    impl HostBridge for StubBridge {
        fn exposes(&self, method: BridgeMethod) -> bool {
            self.surface.lock().unwrap().contains(&method)
        }

        async fn invoke(&self, method: BridgeMethod, _args: Value) -> Result<Value, BridgeError> {
            match (method, self.rest_base) {
                (BridgeMethod::GetRestBase, Some(base)) => Ok(json!({"success": true, "base": base})),
                (BridgeMethod::GetRestBase, None) => Ok(json!({"success": true, "base": ""})),
                _ => Err(BridgeError::Missing(method.as_str())),
            }
        }
    }

    fn resolver(rest: Option<&str>) -> TransportResolver {
        TransportResolver::new(rest.map(str::to_owned), ReadinessPolicy::default())
    }

    #[test]
    fn default_state_reflects_rest_base() {
        let r = resolver(Some("http://127.0.0.1:58701"));
        let state = r.resolve();
        assert_eq!(state.rest_base.as_deref(), Some("http://127.0.0.1:58701"));
        assert!(!state.bridge_available);
        assert!(state.is_ready());
    }

    #[test]
    fn empty_resolver_is_not_ready() {
        assert!(!resolver(None).is_ready());
    }

    #[test]
    fn capability_requires_bridge_and_member() {
        let r = resolver(None);
        assert!(!r.has_capability("get_config"));

        r.install_bridge(Arc::new(StubBridge::new(&[BridgeMethod::GetConfig], None)));
        assert!(r.has_capability("get_config"));
        assert!(!r.has_capability("save_config"));
        assert!(!r.has_capability("no_such_method"));
    }

    #[test]
    fn set_rest_base_normalises_blank_to_none() {
        let r = resolver(Some("http://a"));
        r.set_rest_base(Some("  ".into()));
        assert!(r.resolve().rest_base.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_ready_is_immediate_when_already_ready() {
        let r = resolver(Some("http://127.0.0.1:58701"));
        let before = Instant::now();
        assert!(r.wait_ready(Duration::from_secs(5)).await);
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_ready_times_out_without_transports() {
        let r = resolver(None);
        let before = Instant::now();
        assert!(!r.wait_ready(Duration::from_millis(500)).await);
        assert!(before.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_ready_sees_late_bridge_and_backfills() {
        let r = resolver(None);
        let injector = r.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            injector.install_bridge(Arc::new(StubBridge::new(
                &[BridgeMethod::GetRestBase],
                Some("http://127.0.0.1:58701"),
            )));
        });

        assert!(r.wait_ready(Duration::from_secs(5)).await);
        assert_eq!(
            r.resolve().rest_base.as_deref(),
            Some("http://127.0.0.1:58701")
        );
    }

    #[tokio::test]
    async fn backfill_ignores_empty_base() {
        let r = resolver(None);
        r.install_bridge(Arc::new(StubBridge::new(&[BridgeMethod::GetRestBase], None)));
        assert!(!r.backfill_rest_base().await);
        assert!(r.resolve().rest_base.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_capability_sees_growing_surface() {
        let r = resolver(None);
        let bridge = Arc::new(StubBridge::new(&[], None));
        r.install_bridge(bridge.clone());

        let grower = bridge.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            grower.surface.lock().unwrap().insert(BridgeMethod::Ping);
        });

        assert!(
            r.wait_for_capability(BridgeMethod::Ping, Duration::from_secs(1))
                .await
        );
        assert!(
            !r.wait_for_capability(BridgeMethod::ExitApp, Duration::from_millis(300))
                .await
        );
    }
}
