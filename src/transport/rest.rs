//! HTTP transport to the local REST backend.
//!
//! Requests carry JSON bodies and every response is JSON. Failures of the
//! transport itself come back as [`TransportError`]; backend rejections come
//! back as ordinary `{success:false, error}` payloads so the dispatcher can
//! tell "REST unreachable" from "operation rejected".

use crate::config::RestConfig;
use crate::error::{ClientError, TransportError};
use reqwest::header::ACCEPT;
use serde_json::{Value, json};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// HTTP verb of a REST route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Fixed path and method for one backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestRoute {
    pub method: HttpMethod,
    pub path: &'static str,
}

impl RestRoute {
    #[must_use]
    pub const fn get(path: &'static str) -> Self {
        Self {
            method: HttpMethod::Get,
            path,
        }
    }

    #[must_use]
    pub const fn post(path: &'static str) -> Self {
        Self {
            method: HttpMethod::Post,
            path,
        }
    }
}

/// Client for the local REST backend.
#[derive(Debug, Clone)]
pub struct RestTransport {
    client: reqwest::Client,
    apply_timeout: Duration,
}

impl RestTransport {
    /// Build the HTTP client.
    ///
    /// Only a connect timeout is set: in-flight requests are never cut off
    /// except through [`RestTransport::send_abortable`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the client cannot be constructed.
    pub fn new(config: &RestConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(config.user_agent.as_str())
            .no_proxy()
            .build()
            .map_err(|e| ClientError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            apply_timeout: Duration::from_secs(config.apply_timeout_secs),
        })
    }

    /// Issue `route` against `base` with `args` as query (GET) or JSON body (POST).
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the backend could not be reached or
    /// its response could not be understood.
    pub async fn send(
        &self,
        base: &str,
        route: RestRoute,
        args: &Value,
    ) -> Result<Value, TransportError> {
        let url = format!("{base}{}", route.path);
        let request = match route.method {
            HttpMethod::Get => self.client.get(&url).query(&query_pairs(args)),
            HttpMethod::Post if args.is_null() => self.client.post(&url),
            HttpMethod::Post => self.client.post(&url).json(args),
        };

        let response = request.header(ACCEPT, "application/json").send().await?;
        let status = response.status();
        if matches!(status.as_u16(), 404 | 405 | 501) {
            return Err(TransportError::NotImplemented(status.as_u16()));
        }

        let body = response.bytes().await?;
        let parsed = serde_json::from_slice::<Value>(&body);

        if status.is_success() {
            return match parsed {
                Ok(value) => Ok(value),
                Err(_) if route.method == HttpMethod::Post && body.trim_ascii().is_empty() => {
                    Ok(json!({"success": true}))
                }
                Err(e) => Err(TransportError::Decode(e.to_string())),
            };
        }

        let message = parsed
            .ok()
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        Ok(json!({"success": false, "error": message}))
    }

    /// Like [`RestTransport::send`], but interruptible through `cancel` and
    /// bounded by the apply timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Aborted`] if `cancel` fires first and
    /// [`TransportError::Timeout`] if the apply timeout elapses.
    pub async fn send_abortable(
        &self,
        base: &str,
        route: RestRoute,
        args: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, TransportError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::Aborted),
            result = tokio::time::timeout(self.apply_timeout, self.send(base, route, args)) => {
                result.unwrap_or(Err(TransportError::Timeout))
            }
        }
    }
}

/// Flatten a JSON object into query pairs. Booleans become `1`/`0`.
fn query_pairs(args: &Value) -> Vec<(String, String)> {
    let Some(map) = args.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(k, v)| {
            let rendered = match v {
                Value::Null => return None,
                Value::Bool(true) => "1".to_owned(),
                Value::Bool(false) => "0".to_owned(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((k.clone(), rendered))
        })
        .collect()
}
