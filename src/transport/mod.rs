//! # Transport Layer
//!
//! Stream and broadcast transports built on Tokio.
//!
//! ## Roles
//! - **StreamClient**: one TCP connection with fixed-interval reconnect
//! - **StreamServer**: TCP listener with independent sessions
//! - **BroadcastPeer**: UDP broadcast with optional payload encryption
//! - **Relay**: rebroadcasts raw datagrams between peer groups
//!
//! Every role reports through per-subscriber event channels that never drop
//! events.
//! Inbound frames of unregistered types are dropped without an event.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::core::frame::FrameHeader;
use crate::protocol::message::MessagePtr;
use crate::protocol::registry::MessageRegistry;
use crate::utils::metrics::Metrics;

pub mod bootstrap;
pub mod client;
pub mod events;
pub mod peer;
pub mod queue;
pub mod relay;
pub mod server;

/// Outcome of turning one inbound frame into a message
pub(crate) enum Inbound {
    Message(MessagePtr),
    /// Unregistered type; nothing is reported
    Dropped,
    /// Registered type whose payload did not parse
    Failed(String),
}

pub(crate) fn decode_inbound(
    registry: &MessageRegistry,
    header: &FrameHeader,
    payload: &[u8],
    metrics: &Metrics,
) -> Inbound {
    match registry.deserialize(header, payload) {
        Ok(message) => Inbound::Message(Arc::from(message)),
        Err(e) if e.is_unregistered() => {
            metrics.frame_dropped();
            trace!(key = %header.type_key(), "Dropping frame of unregistered type");
            Inbound::Dropped
        }
        Err(e) => {
            metrics.decode_failure();
            debug!(key = %header.type_key(), error = %e, "Failed to parse frame payload");
            Inbound::Failed(e.to_string())
        }
    }
}

/// Write queued frames until the sink fails; returns the failure
pub(crate) async fn drain_queue<S>(
    sink: &mut S,
    queue: &queue::OutboundQueue,
    metrics: &Metrics,
) -> crate::error::ProtocolError
where
    S: futures::Sink<crate::core::frame::Frame, Error = crate::error::ProtocolError> + Unpin,
{
    use futures::SinkExt;

    loop {
        let frame = queue.pop().await;
        let len = frame.encoded_len() as u64;
        if let Err(e) = sink.send(frame).await {
            return e;
        }
        queue.mark_sent();
        metrics.frame_sent(len);
    }
}
