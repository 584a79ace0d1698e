//! # refbox-comm
//!
//! Transport library for referee-box style match control: typed messages in
//! length-prefixed frames over TCP streams and UDP broadcast.
//!
//! ## Layers
//! - **core**: frame header, stream codec, payload formats
//! - **protocol**: message schemas and the type registry
//! - **transport**: stream client and server, broadcast peer, relay
//! - **utils**: crypto, logging, metrics, timeouts
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde::{Deserialize, Serialize};
//! use refbox_comm::{wire_identity, ClientConfig, MessageRegistry, StreamClient};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Ping { seq: u32 }
//! wire_identity!(Ping, 10, 1);
//!
//! # async fn run() -> refbox_comm::Result<()> {
//! let registry = Arc::new(MessageRegistry::new());
//! registry.register_self_describing::<Ping>()?;
//!
//! let client = StreamClient::new(ClientConfig::default(), registry);
//! let _events = client.subscribe();
//! client.connect("localhost", 4444)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::config::{
    ClientConfig, NetworkConfig, PeerConfig, RelayConfig, ServerConfig, TransportConfig,
};
pub use crate::core::codec::FrameCodec;
pub use crate::core::frame::{Frame, FrameHeader, TypeKey, HEADER_SIZE};
pub use crate::core::serialization::SerializationFormat;
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::message::{Message, MessagePtr, WireIdentity};
pub use crate::protocol::registry::MessageRegistry;
pub use crate::transport::bootstrap::{CryptoAction, CryptoBootstrap};
pub use crate::transport::client::{ClientEvent, StreamClient};
pub use crate::transport::events::{EventReceiver, EventStream};
pub use crate::transport::peer::{BroadcastPeer, PeerEvent};
pub use crate::transport::relay::{Relay, RelayGroup, RelayTable};
pub use crate::transport::server::{ServerEvent, SessionId, StreamServer};
