//! # Broadcast Peer
//!
//! Sends and receives single-frame datagrams over one UDP socket. The socket
//! is bound to `0.0.0.0:recv_port` with broadcast enabled and sends to
//! `address:send_port`, so every datagram leaves with the receive port as its
//! source port. Relays rely on that to tell participants apart.
//!
//! With a key installed, payloads are sealed individually:
//!
//! ```text
//! [Header(8)] [Nonce] [Ciphertext + Tag]
//! ```
//!
//! The header stays in clear text and its size field covers the sealed bytes.
//!
//! Sending never blocks: frames are sealed at call time and queued for a
//! single writer task, so datagrams leave in call order. Socket failures on
//! the writer surface as [`PeerEvent::SendError`].

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{PeerConfig, TransportConfig};
use crate::core::frame::{Frame, FrameHeader};
use crate::error::{ProtocolError, Result};
use crate::protocol::message::{Message, MessagePtr};
use crate::protocol::registry::MessageRegistry;
use crate::transport::events::{EventHub, EventReceiver, EventStream};
use crate::transport::queue::OutboundQueue;
use crate::transport::{decode_inbound, Inbound};
use crate::utils::crypto::CryptoContext;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_timeout_error;

/// Events reported by a [`BroadcastPeer`]
#[derive(Debug, Clone)]
pub enum PeerEvent {
    Received {
        remote: SocketAddr,
        component_id: u16,
        message_type: u16,
        message: MessagePtr,
    },
    /// Every well-framed datagram, before decryption and type lookup
    RawReceived {
        remote: SocketAddr,
        header: FrameHeader,
        payload: Bytes,
    },
    /// A registered type arrived but did not decrypt or parse
    ReceiveFailed {
        remote: SocketAddr,
        component_id: u16,
        message_type: u16,
        diagnostic: String,
    },
    /// Socket error or malformed datagram
    RecvError {
        remote: Option<SocketAddr>,
        diagnostic: String,
    },
    SendError { diagnostic: String },
}

/// Synchronous callback run for every well-framed datagram
pub type RawHook = Arc<dyn Fn(SocketAddr, &FrameHeader, &Bytes) + Send + Sync>;

struct PeerShared {
    socket: UdpSocket,
    destination: SocketAddr,
    registry: Arc<MessageRegistry>,
    crypto: RwLock<Option<Arc<CryptoContext>>>,
    raw_hook: Option<RawHook>,
    events: EventHub<PeerEvent>,
    queue: OutboundQueue,
    metrics: Arc<Metrics>,
    max_datagram_size: usize,
}

impl PeerShared {
    fn emit(&self, event: PeerEvent) {
        self.events.emit(event);
    }

    fn crypto(&self) -> Option<Arc<CryptoContext>> {
        self.crypto
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn handle_datagram(&self, datagram: &[u8], remote: SocketAddr) {
        let frame = match Frame::from_datagram(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(%remote, len = datagram.len(), error = %e, "Malformed datagram");
                self.emit(PeerEvent::RecvError {
                    remote: Some(remote),
                    diagnostic: e.to_string(),
                });
                return;
            }
        };
        self.metrics.frame_received(datagram.len() as u64);

        let header = frame.header;
        if let Some(hook) = &self.raw_hook {
            hook(remote, &header, &frame.payload);
        }
        self.emit(PeerEvent::RawReceived {
            remote,
            header,
            payload: frame.payload.clone(),
        });

        if !self
            .registry
            .is_registered(header.component_id, header.message_type)
        {
            self.metrics.frame_dropped();
            trace!(%remote, key = %header.type_key(), "Dropping datagram of unregistered type");
            return;
        }

        let payload = match self.crypto() {
            Some(ctx) => match ctx.open(&frame.payload) {
                Ok(plain) => Bytes::from(plain),
                Err(e) => {
                    self.metrics.decode_failure();
                    debug!(%remote, key = %header.type_key(), "Failed to decrypt datagram");
                    self.emit(PeerEvent::ReceiveFailed {
                        remote,
                        component_id: header.component_id,
                        message_type: header.message_type,
                        diagnostic: e.to_string(),
                    });
                    return;
                }
            },
            None => frame.payload,
        };

        let header = FrameHeader {
            payload_size: payload.len() as u32,
            ..header
        };
        match decode_inbound(&self.registry, &header, &payload, &self.metrics) {
            Inbound::Message(message) => self.emit(PeerEvent::Received {
                remote,
                component_id: header.component_id,
                message_type: header.message_type,
                message,
            }),
            Inbound::Failed(diagnostic) => self.emit(PeerEvent::ReceiveFailed {
                remote,
                component_id: header.component_id,
                message_type: header.message_type,
                diagnostic,
            }),
            Inbound::Dropped => {}
        }
    }

    fn enqueue(&self, frame: Frame) -> Result<()> {
        if frame.encoded_len() > self.max_datagram_size {
            return Err(ProtocolError::OversizedPacket(frame.encoded_len()));
        }
        self.queue.push(frame);
        Ok(())
    }

    async fn transmit(&self, frame: &Frame) {
        let datagram = frame.to_bytes();
        match self.socket.send_to(&datagram, self.destination).await {
            Ok(_) => self.metrics.frame_sent(datagram.len() as u64),
            Err(e) => {
                self.metrics.io_error();
                warn!(destination = %self.destination, error = %e, "Failed to send datagram");
                self.emit(PeerEvent::SendError {
                    diagnostic: e.to_string(),
                });
            }
        }
    }
}

/// UDP broadcast participant
pub struct BroadcastPeer {
    shared: Arc<PeerShared>,
    local_addr: SocketAddr,
    /// Stops the writer and, through its child, the receiver
    token: CancellationToken,
    recv_token: CancellationToken,
}

impl std::fmt::Debug for BroadcastPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastPeer")
            .field("local_addr", &self.local_addr)
            .field("destination", &self.shared.destination)
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

impl BroadcastPeer {
    /// Bind the socket and start receiving.
    ///
    /// Without a shared registry the peer gets a private, empty one.
    pub async fn bind(config: PeerConfig, registry: Option<Arc<MessageRegistry>>) -> Result<Self> {
        Self::bind_with(config, &TransportConfig::default(), registry, None).await
    }

    /// [`BroadcastPeer::bind`] with a raw hook installed before the first
    /// datagram can arrive
    pub async fn bind_with_hook(
        config: PeerConfig,
        registry: Option<Arc<MessageRegistry>>,
        hook: RawHook,
    ) -> Result<Self> {
        Self::bind_with(config, &TransportConfig::default(), registry, Some(hook)).await
    }

    #[instrument(skip_all, fields(address = %config.address, send_port = config.send_port, recv_port = config.recv_port))]
    pub async fn bind_with(
        config: PeerConfig,
        transport: &TransportConfig,
        registry: Option<Arc<MessageRegistry>>,
        raw_hook: Option<RawHook>,
    ) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ProtocolError::ConfigError(errors.join("; ")));
        }

        let crypto = match config.crypto_key.as_deref() {
            Some(key) if !key.is_empty() => Some(Arc::new(CryptoContext::new(key, &config.cipher)?)),
            _ => None,
        };

        let destination = tokio::net::lookup_host((config.address.as_str(), config.send_port))
            .await?
            .next()
            .ok_or_else(|| {
                ProtocolError::ConfigError(format!("Cannot resolve peer address '{}'", config.address))
            })?;

        let socket = UdpSocket::bind(("0.0.0.0", config.recv_port)).await?;
        socket.set_broadcast(true)?;
        let local_addr = socket.local_addr()?;

        let registry =
            registry.unwrap_or_else(|| Arc::new(MessageRegistry::from_config(transport)));
        let shared = Arc::new(PeerShared {
            socket,
            destination,
            registry,
            crypto: RwLock::new(crypto),
            raw_hook,
            events: EventHub::new(),
            queue: OutboundQueue::new(),
            metrics: Arc::new(Metrics::new()),
            max_datagram_size: transport.max_datagram_size,
        });

        let token = CancellationToken::new();
        let recv_token = token.child_token();
        tokio::spawn(receive_loop(shared.clone(), recv_token.clone()));
        tokio::spawn(write_loop(shared.clone(), token.clone()));
        info!(%local_addr, %destination, "Broadcast peer ready");

        Ok(Self {
            shared,
            local_addr,
            token,
            recv_token,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn destination(&self) -> SocketAddr {
        self.shared.destination
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.shared.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.shared.metrics
    }

    pub fn subscribe(&self) -> EventReceiver<PeerEvent> {
        self.shared.events.subscribe()
    }

    pub fn events(&self) -> EventStream<PeerEvent> {
        EventStream::new(self.subscribe())
    }

    pub fn is_encrypted(&self) -> bool {
        self.shared.crypto().is_some()
    }

    /// Install a key, or remove the current one with an empty key.
    ///
    /// Applies to every datagram sent or received after the call. An empty
    /// cipher name selects the default cipher.
    pub fn setup_crypto(&self, key: &str, cipher: &str) -> Result<()> {
        let ctx = if key.is_empty() {
            None
        } else {
            Some(Arc::new(CryptoContext::new(key, cipher)?))
        };
        let enabled = ctx.is_some();
        *self
            .shared
            .crypto
            .write()
            .unwrap_or_else(|e| e.into_inner()) = ctx;
        info!(enabled, cipher, "Crypto configured");
        Ok(())
    }

    /// Queue `message` under its registered key. Best effort, no retry.
    pub fn send(&self, message: &dyn Message) -> Result<()> {
        let frame = self.shared.registry.serialize_message(message)?;
        self.send_frame(frame)
    }

    pub fn send_as(&self, component_id: u16, message_type: u16, message: &dyn Message) -> Result<()> {
        let frame = self
            .shared
            .registry
            .serialize(component_id, message_type, message)?;
        self.send_frame(frame)
    }

    /// Queue a plaintext frame, sealing it first when a key is installed
    pub fn send_frame(&self, frame: Frame) -> Result<()> {
        let frame = match self.shared.crypto() {
            Some(ctx) => {
                let sealed = ctx.seal(&frame.payload)?;
                self.shared.metrics.encryption();
                Frame::new(frame.header.component_id, frame.header.message_type, sealed)?
            }
            None => frame,
        };
        self.shared.enqueue(frame)
    }

    /// Queue a header and payload exactly as given, never re-encrypting.
    ///
    /// The header's size field must match the payload.
    pub fn send_raw(&self, header: FrameHeader, payload: &[u8]) -> Result<()> {
        let frame = Frame::from_parts(header, Bytes::copy_from_slice(payload))?;
        self.shared.enqueue(frame)
    }

    /// True when every queued datagram has been handed to the socket
    pub fn outbound_flushed(&self) -> bool {
        self.shared.queue.is_flushed()
    }

    /// Wait until the outbound queue is empty; [`ProtocolError::Timeout`]
    /// on expiry
    pub async fn wait_flushed(&self, timeout: Duration) -> Result<()> {
        with_timeout_error(
            async {
                self.shared.queue.wait_flushed().await;
                Ok(())
            },
            timeout,
        )
        .await
    }

    /// Stop receiving. Sends keep working until the peer is dropped.
    pub fn close(&self) {
        self.recv_token.cancel();
    }
}

impl Drop for BroadcastPeer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn receive_loop(shared: Arc<PeerShared>, token: CancellationToken) {
    // one byte more than the limit so oversized datagrams show up as malformed
    let mut buf = vec![0u8; shared.max_datagram_size + 1];
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Receive loop stopped");
                return;
            }
            res = shared.socket.recv_from(&mut buf) => match res {
                Ok((len, remote)) => shared.handle_datagram(&buf[..len], remote),
                Err(e) => {
                    shared.metrics.io_error();
                    warn!(error = %e, "Receive failed");
                    shared.emit(PeerEvent::RecvError {
                        remote: None,
                        diagnostic: e.to_string(),
                    });
                }
            }
        }
    }
}

async fn write_loop(shared: Arc<PeerShared>, token: CancellationToken) {
    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => {
                let discarded = shared.queue.clear();
                debug!(discarded, "Writer stopped");
                return;
            }
            frame = shared.queue.pop() => frame,
        };
        shared.transmit(&frame).await;
        shared.queue.mark_sent();
    }
}
