//! The two ways of reaching the backend: the fixed-port REST server and the
//! bridge object injected by the host shell.

pub mod bridge;
pub mod channel;
pub mod rest;
pub mod state;

pub use bridge::{BridgeMethod, HostBridge};
pub use channel::{BridgeHandler, BridgeServer, BridgeSurface, ChannelBridge, bridge_channel};
pub use rest::{HttpMethod, RestRoute, RestTransport};
pub use state::{TransportResolver, TransportState};
