//! autohomework: client core for the homework auto-send desktop app.
//!
//! The backend is reachable two ways: a local REST server on a fixed port and
//! a bridge object that the host shell injects at an unpredictable time. This
//! crate hides that split behind one dispatcher:
//!
//! - **Transport resolver**: tracks which transports exist and waits for one
//! - **Dispatcher**: REST first, bridge fallback, one result shape
//! - **Poller**: progress polling for long-running update installs
//! - **Session**: select-and-preview and confirm-send flows
//!
//! # Architecture
//!
//! [`Client`] owns everything and is built in dependency order:
//! resolver, dispatcher, poller. Presentation goes through a [`UiSink`].

pub mod client;
pub mod config;
pub mod diagnostics;
pub mod dirs;
pub mod dispatch;
pub mod error;
pub mod operation;
pub mod policy;
pub mod scheduler;
pub mod session;
pub mod transport;
pub mod ui;
pub mod update;

pub use client::Client;
pub use config::{AutostartStatus, ClientConfig, HomeworkSettings};
pub use dispatch::Dispatcher;
pub use error::{BridgeError, ClientError, Result, TransportError};
pub use operation::{FailureKind, Operation, OperationResult};
pub use session::{FlowOutcome, HomeworkSession, Preview};
pub use transport::{BridgeMethod, HostBridge, TransportResolver, TransportState};
pub use ui::{LogUi, UiSink};
