//! Error types for the autohomework client core.
//!
//! Dispatcher paths never return these: every backend operation resolves to an
//! [`OperationResult`](crate::operation::OperationResult). The types here cover
//! construction, configuration, and the transport internals that the
//! dispatcher folds into results.

/// Stable error codes for the failure taxonomy.
///
/// These codes appear in log output and in
/// [`FailureKind::code`](crate::operation::FailureKind::code). They are part of
/// the public contract and will not change.
pub mod error_codes {
    /// Neither REST nor the bridge was reachable within the policy window.
    pub const TRANSPORT_UNAVAILABLE: &str = "TRANSPORT_UNAVAILABLE";

    /// REST was reached but reported failure without any detail.
    pub const SOFT_TRANSPORT_FAILURE: &str = "SOFT_TRANSPORT_FAILURE";

    /// A transport explicitly rejected the operation with a message.
    pub const OPERATION_REJECTED: &str = "OPERATION_REJECTED";

    /// A single progress poll failed.
    pub const POLL_TRANSIENT: &str = "POLL_TRANSIENT";
}

/// Top-level error type for client construction and configuration.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Configuration could not be parsed, serialized, or is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// HTTP client construction failed.
    #[error("http error: {0}")]
    Http(String),

    /// Logging could not be initialised.
    #[error("logging error: {0}")]
    Logging(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Failure of the REST transport itself, as opposed to a backend rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No connection could be established; the request never left the client.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The endpoint does not exist on this backend (404/405/501).
    #[error("endpoint not implemented (HTTP {0})")]
    NotImplemented(u16),

    /// The request was sent but no complete response arrived in time.
    #[error("request timed out")]
    Timeout,

    /// The response body could not be decoded as JSON.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The request was interrupted by a cancellation token.
    #[error("request aborted")]
    Aborted,

    /// Any other transport-level failure after the request was sent.
    #[error("request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` when the backend certainly did not act on the request.
    ///
    /// Only these failures allow a non-idempotent operation to be retried on
    /// the other transport.
    #[must_use]
    pub fn request_not_delivered(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::NotImplemented(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Failure raised by a host bridge call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The bridge does not expose the requested method.
    #[error("bridge method {0} is not exposed")]
    Missing(&'static str),

    /// The bridge method threw.
    #[error("{0}")]
    Call(String),

    /// The host side of the bridge has gone away.
    #[error("bridge channel closed")]
    Closed,
}
