//! # Stream Client
//!
//! One TCP connection to a stream server. The connection task reconnects at
//! a fixed interval for as long as the client lives, unless
//! `auto_reconnect` is off, in which case a single attempt is made.
//!
//! Outgoing frames go through a FIFO queue drained by one writer, so frames
//! reach the wire in the order `send` was called. A disconnect discards
//! whatever was still queued.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{ClientConfig, TransportConfig};
use crate::core::codec::FrameCodec;
use crate::core::frame::Frame;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::{Message, MessagePtr};
use crate::protocol::registry::MessageRegistry;
use crate::transport::events::{EventHub, EventReceiver, EventStream};
use crate::transport::queue::OutboundQueue;
use crate::transport::{decode_inbound, drain_queue, Inbound};
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_timeout_error;

/// Events reported by a [`StreamClient`]
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected,
    /// Connection lost or a connect attempt failed
    Disconnected { reason: String },
    Received {
        component_id: u16,
        message_type: u16,
        message: MessagePtr,
    },
    /// A registered type arrived but its payload did not parse
    ReceiveFailed {
        component_id: u16,
        message_type: u16,
        diagnostic: String,
    },
}

struct ActiveSession {
    generation: u64,
    queue: Arc<OutboundQueue>,
}

struct ClientShared {
    config: ClientConfig,
    registry: Arc<MessageRegistry>,
    events: EventHub<ClientEvent>,
    session: Mutex<Option<ActiveSession>>,
    metrics: Arc<Metrics>,
    max_payload_size: usize,
}

impl ClientShared {
    fn emit(&self, event: ClientEvent) {
        self.events.emit(event);
    }

    fn current_queue(&self) -> Option<(u64, Arc<OutboundQueue>)> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| (s.generation, s.queue.clone()))
    }

    fn install(&self, generation: u64, queue: Arc<OutboundQueue>) {
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(ActiveSession { generation, queue });
    }

    /// Detach the session if it is still the current one
    fn detach(&self, generation: u64) -> bool {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        if session.as_ref().map(|s| s.generation) == Some(generation) {
            *session = None;
            true
        } else {
            false
        }
    }
}

struct ConnectionTask {
    token: CancellationToken,
    generation: u64,
}

/// Reconnecting TCP client
pub struct StreamClient {
    shared: Arc<ClientShared>,
    task: Mutex<Option<ConnectionTask>>,
    next_generation: std::sync::atomic::AtomicU64,
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("host", &self.shared.config.host)
            .field("port", &self.shared.config.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl StreamClient {
    pub fn new(config: ClientConfig, registry: Arc<MessageRegistry>) -> Self {
        Self::with_transport(config, &TransportConfig::default(), registry)
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: &TransportConfig,
        registry: Arc<MessageRegistry>,
    ) -> Self {
        Self {
            shared: Arc::new(ClientShared {
                config,
                registry,
                events: EventHub::new(),
                session: Mutex::new(None),
                metrics: Arc::new(Metrics::new()),
                max_payload_size: transport.max_payload_size,
            }),
            task: Mutex::new(None),
            next_generation: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Receive events from now on. Subscribe before connecting to see
    /// `Connected`.
    pub fn subscribe(&self) -> EventReceiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// Events as a `Stream`
    pub fn events(&self) -> EventStream<ClientEvent> {
        EventStream::new(self.subscribe())
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.shared.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.shared.metrics
    }

    /// Connect to the host and port from the client configuration
    pub fn start(&self) -> Result<()> {
        let host = self.shared.config.host.clone();
        self.connect(&host, self.shared.config.port)
    }

    /// Start connecting to `host:port` in the background.
    ///
    /// An existing connection or retry loop is cancelled first. Must be
    /// called from within a Tokio runtime.
    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ProtocolError::Custom(format!("No Tokio runtime: {e}")))?;

        let generation = self
            .next_generation
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let token = CancellationToken::new();

        let previous = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(ConnectionTask {
                token: token.clone(),
                generation,
            });
        if let Some(previous) = previous {
            previous.token.cancel();
            self.discard_session(previous.generation);
        }

        runtime.spawn(run_connection_loop(
            self.shared.clone(),
            host.to_string(),
            port,
            generation,
            token,
        ));
        Ok(())
    }

    /// Queue `message` under the key its schema is registered with
    pub fn send(&self, message: &dyn Message) -> Result<()> {
        let queue = self.queue()?;
        let frame = self.shared.registry.serialize_message(message)?;
        queue.push(frame);
        Ok(())
    }

    /// Queue `message` under an explicit key
    pub fn send_as(&self, component_id: u16, message_type: u16, message: &dyn Message) -> Result<()> {
        let queue = self.queue()?;
        let frame = self
            .shared
            .registry
            .serialize(component_id, message_type, message)?;
        queue.push(frame);
        Ok(())
    }

    /// Queue an already encoded frame
    pub fn send_frame(&self, frame: Frame) -> Result<()> {
        self.queue()?.push(frame);
        Ok(())
    }

    fn queue(&self) -> Result<Arc<OutboundQueue>> {
        self.shared
            .current_queue()
            .map(|(_, queue)| queue)
            .ok_or(ProtocolError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.current_queue().is_some()
    }

    /// True when nothing queued is waiting to be written
    pub fn outbound_flushed(&self) -> bool {
        self.shared
            .current_queue()
            .map_or(true, |(_, queue)| queue.is_flushed())
    }

    /// Wait until every queued frame has been written.
    ///
    /// Fails with [`ProtocolError::Timeout`] on expiry and with
    /// [`ProtocolError::ConnectionClosed`] if the session ends first.
    pub async fn wait_flushed(&self, timeout: Duration) -> Result<()> {
        let Some((generation, queue)) = self.shared.current_queue() else {
            return Ok(());
        };

        with_timeout_error(
            async {
                queue.wait_flushed().await;
                Ok(())
            },
            timeout,
        )
        .await?;

        match self.shared.current_queue() {
            Some((current, _)) if current == generation => Ok(()),
            _ => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// [`StreamClient::wait_flushed`] with the configured flush timeout
    pub async fn flush(&self) -> Result<()> {
        self.wait_flushed(self.shared.config.flush_timeout).await
    }

    /// Stop the connection and any pending retries
    pub fn close(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.token.cancel();
            self.discard_session(task.generation);
        }
    }

    fn discard_session(&self, generation: u64) {
        let queue = self.shared.current_queue();
        if let Some((current, queue)) = queue {
            if current == generation && self.shared.detach(generation) {
                queue.clear();
            }
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.close();
    }
}

async fn open_stream(host: &str, port: u16) -> Result<TcpStream> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

#[instrument(skip(shared, host, token), fields(host = %host))]
async fn run_connection_loop(
    shared: Arc<ClientShared>,
    host: String,
    port: u16,
    generation: u64,
    token: CancellationToken,
) {
    loop {
        shared.metrics.connect_attempt();
        let attempt = tokio::select! {
            _ = token.cancelled() => return,
            res = with_timeout_error(open_stream(&host, port), shared.config.connect_timeout) => res,
        };

        match attempt {
            Ok(stream) => {
                let remote = stream.peer_addr().ok();
                let reason = run_session(&shared, stream, remote, generation, &token).await;
                shared.emit(ClientEvent::Disconnected { reason });
            }
            Err(e) => {
                debug!(error = %e, "Connect attempt failed");
                shared.emit(ClientEvent::Disconnected {
                    reason: e.to_string(),
                });
            }
        }

        if token.is_cancelled() || !shared.config.auto_reconnect {
            return;
        }

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(shared.config.reconnect_delay) => {}
        }
    }
}

/// Drive one connected session; returns the disconnect reason
async fn run_session(
    shared: &ClientShared,
    stream: TcpStream,
    remote: Option<SocketAddr>,
    generation: u64,
    token: &CancellationToken,
) -> String {
    let queue = Arc::new(OutboundQueue::new());
    shared.install(generation, queue.clone());
    shared.metrics.connection_established();
    info!(?remote, "Connected");
    shared.emit(ClientEvent::Connected);

    let framed = Framed::new(stream, FrameCodec::new(shared.max_payload_size));
    let (mut sink, mut frames) = framed.split();

    let reason = tokio::select! {
        _ = token.cancelled() => constants::ERR_CANCELLED.to_string(),
        err = drain_queue(&mut sink, &queue, &shared.metrics) => err.to_string(),
        reason = async {
            loop {
                match frames.next().await {
                    Some(Ok(frame)) => handle_frame(shared, frame),
                    Some(Err(e)) => break e.to_string(),
                    None => break constants::ERR_CONNECTION_CLOSED.to_string(),
                }
            }
        } => reason,
    };

    if shared.detach(generation) {
        let discarded = queue.clear();
        if discarded > 0 {
            warn!(discarded, "Discarded queued frames on disconnect");
        }
    }
    shared.metrics.connection_closed();
    info!(?remote, reason = %reason, "Disconnected");
    reason
}

fn handle_frame(shared: &ClientShared, frame: Frame) {
    shared.metrics.frame_received(frame.encoded_len() as u64);
    let header = frame.header;
    match decode_inbound(&shared.registry, &header, &frame.payload, &shared.metrics) {
        Inbound::Message(message) => shared.emit(ClientEvent::Received {
            component_id: header.component_id,
            message_type: header.message_type,
            message,
        }),
        Inbound::Failed(diagnostic) => shared.emit(ClientEvent::ReceiveFailed {
            component_id: header.component_id,
            message_type: header.message_type,
            diagnostic,
        }),
        Inbound::Dropped => {}
    }
}
