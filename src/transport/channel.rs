//! In-process bridge built on tokio channels.
//!
//! A host shell embeds the client by creating a [`bridge_channel`], running
//! the [`BridgeServer`] on its side, and installing the [`ChannelBridge`] into
//! the transport resolver. Calls travel as versioned request/response
//! envelopes. The shell can expose methods one at a time through the shared
//! [`BridgeSurface`] as its own initialisation progresses.

use crate::error::BridgeError;
use crate::transport::bridge::{BridgeMethod, HostBridge};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, oneshot};

/// Contract version for bridge envelopes.
pub const BRIDGE_CONTRACT_VERSION: u32 = 1;

/// A versioned call from client -> host shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub v: u32,
    pub request_id: String,
    pub method: BridgeMethod,
    pub args: Value,
}

impl BridgeRequest {
    /// Build a v1 request with a fresh request id.
    #[must_use]
    pub fn new(method: BridgeMethod, args: Value) -> Self {
        Self {
            v: BRIDGE_CONTRACT_VERSION,
            request_id: uuid::Uuid::new_v4().to_string(),
            method,
            args,
        }
    }

    /// Validate envelope version and request id.
    pub fn validate(&self) -> Result<(), String> {
        if self.v != BRIDGE_CONTRACT_VERSION {
            return Err(format!(
                "unsupported bridge contract version {}; expected {}",
                self.v, BRIDGE_CONTRACT_VERSION
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err("request_id cannot be empty".to_owned());
        }
        Ok(())
    }
}

/// A versioned reply from host shell -> client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: Value,
    pub error: Option<String>,
}

impl BridgeResponse {
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: Value) -> Self {
        Self {
            v: BRIDGE_CONTRACT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: BRIDGE_CONTRACT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: Value::Null,
            error: Some(message.into()),
        }
    }
}

/// Host-side implementation of the bridge methods.
///
/// An `Err` means the method threw; an `Ok` payload may itself be a
/// `{success:false, error}` result.
pub trait BridgeHandler: Send + Sync + 'static {
    fn handle(&self, method: BridgeMethod, args: &Value) -> Result<Value, String>;
}

impl<F> BridgeHandler for F
where
    F: Fn(BridgeMethod, &Value) -> Result<Value, String> + Send + Sync + 'static,
{
    fn handle(&self, method: BridgeMethod, args: &Value) -> Result<Value, String> {
        self(method, args)
    }
}

/// The set of methods the host shell currently exposes. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct BridgeSurface {
    methods: Arc<RwLock<HashSet<BridgeMethod>>>,
}

impl BridgeSurface {
    /// A surface exposing every method.
    #[must_use]
    pub fn full() -> Self {
        let surface = Self::default();
        surface.expose_all(BridgeMethod::ALL);
        surface
    }

    pub fn expose(&self, method: BridgeMethod) {
        self.methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method);
    }

    pub fn expose_all(&self, methods: impl IntoIterator<Item = BridgeMethod>) {
        let mut guard = self.methods.write().unwrap_or_else(PoisonError::into_inner);
        guard.extend(methods);
    }

    pub fn withdraw(&self, method: BridgeMethod) {
        self.methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&method);
    }

    #[must_use]
    pub fn contains(&self, method: BridgeMethod) -> bool {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&method)
    }
}

struct PendingCall {
    request: BridgeRequest,
    reply_tx: oneshot::Sender<BridgeResponse>,
}

/// Client half of the channel bridge; install this into the resolver.
#[derive(Clone)]
pub struct ChannelBridge {
    request_tx: mpsc::Sender<PendingCall>,
    surface: BridgeSurface,
}

impl std::fmt::Debug for ChannelBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBridge")
            .field("surface", &self.surface)
            .finish()
    }
}

#[async_trait]
impl HostBridge for ChannelBridge {
    fn exposes(&self, method: BridgeMethod) -> bool {
        self.surface.contains(method)
    }

    async fn invoke(&self, method: BridgeMethod, args: Value) -> Result<Value, BridgeError> {
        if !self.exposes(method) {
            return Err(BridgeError::Missing(method.as_str()));
        }

        let request = BridgeRequest::new(method, args);
        let request_id = request.request_id.clone();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(PendingCall { request, reply_tx })
            .await
            .map_err(|_| BridgeError::Closed)?;

        let response = reply_rx.await.map_err(|_| BridgeError::Closed)?;
        if response.request_id != request_id {
            return Err(BridgeError::Call(format!(
                "mismatched reply {} for request {request_id}",
                response.request_id
            )));
        }
        if response.ok {
            Ok(response.payload)
        } else {
            Err(BridgeError::Call(
                response
                    .error
                    .unwrap_or_else(|| format!("{method} failed")),
            ))
        }
    }
}

/// Host half of the channel bridge; run it on the shell's side.
pub struct BridgeServer<H: BridgeHandler> {
    request_rx: mpsc::Receiver<PendingCall>,
    handler: H,
}

impl<H: BridgeHandler> BridgeServer<H> {
    /// Serve calls until every [`ChannelBridge`] clone is dropped.
    pub async fn run(mut self) {
        while let Some(call) = self.request_rx.recv().await {
            let response = self.route(&call.request);
            let _ = call.reply_tx.send(response);
        }
        tracing::debug!("bridge server stopped: all clients dropped");
    }

    /// Route one request to the handler.
    pub fn route(&self, request: &BridgeRequest) -> BridgeResponse {
        if let Err(e) = request.validate() {
            return BridgeResponse::error(request.request_id.clone(), e);
        }
        match self.handler.handle(request.method, &request.args) {
            Ok(payload) => BridgeResponse::ok(request.request_id.clone(), payload),
            Err(e) => BridgeResponse::error(request.request_id.clone(), e),
        }
    }
}

/// Create a bridge client/server pair sharing `surface`.
#[must_use]
pub fn bridge_channel<H: BridgeHandler>(
    capacity: usize,
    surface: BridgeSurface,
    handler: H,
) -> (ChannelBridge, BridgeServer<H>) {
    let (request_tx, request_rx) = mpsc::channel(capacity.max(1));
    (
        ChannelBridge {
            request_tx,
            surface,
        },
        BridgeServer {
            request_rx,
            handler,
        },
    )
}
