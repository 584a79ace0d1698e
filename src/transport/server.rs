//! # Stream Server
//!
//! Accepts TCP clients and runs each one as an independent session with its
//! own read buffer, outbound queue and cancellation token. Sessions are
//! addressed by a [`SessionId`] handed out in the `ClientConnected` event.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ServerConfig, TransportConfig};
use crate::core::codec::FrameCodec;
use crate::core::frame::Frame;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::{Message, MessagePtr};
use crate::protocol::registry::MessageRegistry;
use crate::transport::events::{EventHub, EventReceiver, EventStream};
use crate::transport::queue::OutboundQueue;
use crate::transport::{decode_inbound, drain_queue, Inbound};
use crate::utils::metrics::Metrics;

/// Identifier of one accepted client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Events reported by a [`StreamServer`]
#[derive(Debug, Clone)]
pub enum ServerEvent {
    ClientConnected {
        session: SessionId,
        remote: SocketAddr,
    },
    ClientDisconnected {
        session: SessionId,
        reason: String,
    },
    Received {
        session: SessionId,
        component_id: u16,
        message_type: u16,
        message: MessagePtr,
    },
    ReceiveFailed {
        session: SessionId,
        component_id: u16,
        message_type: u16,
        diagnostic: String,
    },
}

struct SessionHandle {
    remote: SocketAddr,
    queue: Arc<OutboundQueue>,
    token: CancellationToken,
}

struct ServerShared {
    registry: Arc<MessageRegistry>,
    events: EventHub<ServerEvent>,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
    next_id: AtomicU64,
    metrics: Arc<Metrics>,
    max_payload_size: usize,
}

impl ServerShared {
    fn emit(&self, event: ServerEvent) {
        self.events.emit(event);
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// TCP server with per-client sessions
pub struct StreamServer {
    shared: Arc<ServerShared>,
    local_addr: SocketAddr,
    shutdown_timeout: Duration,
    token: CancellationToken,
}

impl std::fmt::Debug for StreamServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamServer")
            .field("local_addr", &self.local_addr)
            .field("sessions", &self.shared.sessions().len())
            .finish()
    }
}

impl StreamServer {
    /// Bind the listener and start accepting. Port 0 picks a free port.
    pub async fn bind(config: ServerConfig, registry: Arc<MessageRegistry>) -> Result<Self> {
        Self::bind_with_transport(config, &TransportConfig::default(), registry).await
    }

    #[instrument(skip(config, transport, registry), fields(address = %config.address))]
    pub async fn bind_with_transport(
        config: ServerConfig,
        transport: &TransportConfig,
        registry: Arc<MessageRegistry>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&config.address).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "Listening for stream clients");

        let shared = Arc::new(ServerShared {
            registry,
            events: EventHub::new(),
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            metrics: Arc::new(Metrics::new()),
            max_payload_size: transport.max_payload_size,
        });

        let token = CancellationToken::new();
        tokio::spawn(accept_loop(listener, shared.clone(), token.clone()));

        Ok(Self {
            shared,
            local_addr,
            shutdown_timeout: config.shutdown_timeout,
            token,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn subscribe(&self) -> EventReceiver<ServerEvent> {
        self.shared.events.subscribe()
    }

    pub fn events(&self) -> EventStream<ServerEvent> {
        EventStream::new(self.subscribe())
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.shared.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.shared.metrics
    }

    /// Live sessions, in connection order
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.shared.sessions().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn remote_addr(&self, session: SessionId) -> Option<SocketAddr> {
        self.shared.sessions().get(&session).map(|s| s.remote)
    }

    /// Queue `message` to one session under its registered key
    pub fn send(&self, session: SessionId, message: &dyn Message) -> Result<()> {
        let frame = self.shared.registry.serialize_message(message)?;
        self.send_frame(session, frame)
    }

    /// Queue `message` to one session under an explicit key
    pub fn send_as(
        &self,
        session: SessionId,
        component_id: u16,
        message_type: u16,
        message: &dyn Message,
    ) -> Result<()> {
        let frame = self
            .shared
            .registry
            .serialize(component_id, message_type, message)?;
        self.send_frame(session, frame)
    }

    pub fn send_frame(&self, session: SessionId, frame: Frame) -> Result<()> {
        let sessions = self.shared.sessions();
        let handle = sessions
            .get(&session)
            .ok_or(ProtocolError::UnknownSession(session.0))?;
        handle.queue.push(frame);
        Ok(())
    }

    /// Queue `message` to every live session; returns how many got it
    pub fn send_to_all(&self, message: &dyn Message) -> Result<usize> {
        let frame = self.shared.registry.serialize_message(message)?;
        let sessions = self.shared.sessions();
        for handle in sessions.values() {
            handle.queue.push(frame.clone());
        }
        Ok(sessions.len())
    }

    /// Close one session. `ClientDisconnected` follows once it has stopped.
    pub fn disconnect(&self, session: SessionId) -> Result<()> {
        let sessions = self.shared.sessions();
        let handle = sessions
            .get(&session)
            .ok_or(ProtocolError::UnknownSession(session.0))?;
        handle.token.cancel();
        debug!(%session, "Disconnect requested");
        Ok(())
    }

    /// Stop accepting, close every session and wait for them to wind down
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down server. Waiting for sessions to close...");
        self.token.cancel();

        let timeout = tokio::time::sleep(self.shutdown_timeout);
        tokio::pin!(timeout);

        loop {
            let remaining = self.shared.sessions().len();
            if remaining == 0 {
                info!("All sessions closed");
                return Ok(());
            }
            tokio::select! {
                _ = &mut timeout => {
                    warn!(remaining, "Shutdown timeout reached");
                    return Err(ProtocolError::Timeout);
                }
                _ = tokio::time::sleep(Duration::from_millis(20)) => {
                    debug!(remaining, "Waiting for sessions to close");
                }
            }
        }
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<ServerShared>, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Accept loop stopped");
                return;
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, remote)) => start_session(&shared, stream, remote, &token),
                    Err(e) => {
                        shared.metrics.io_error();
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }
        }
    }
}

fn start_session(
    shared: &Arc<ServerShared>,
    stream: TcpStream,
    remote: SocketAddr,
    server_token: &CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }

    let session = SessionId(shared.next_id.fetch_add(1, Ordering::Relaxed));
    let queue = Arc::new(OutboundQueue::new());
    let token = server_token.child_token();

    shared.sessions().insert(
        session,
        SessionHandle {
            remote,
            queue: queue.clone(),
            token: token.clone(),
        },
    );
    shared.metrics.connection_established();
    info!(%session, %remote, "Client connected");
    shared.emit(ServerEvent::ClientConnected { session, remote });

    tokio::spawn(run_session(shared.clone(), session, stream, queue, token));
}

#[instrument(skip(shared, stream, queue, token), fields(session = %session))]
async fn run_session(
    shared: Arc<ServerShared>,
    session: SessionId,
    stream: TcpStream,
    queue: Arc<OutboundQueue>,
    token: CancellationToken,
) {
    let framed = Framed::new(stream, FrameCodec::new(shared.max_payload_size));
    let (mut sink, mut frames) = framed.split();

    let reason = tokio::select! {
        _ = token.cancelled() => constants::ERR_CANCELLED.to_string(),
        err = drain_queue(&mut sink, &queue, &shared.metrics) => err.to_string(),
        reason = async {
            loop {
                match frames.next().await {
                    Some(Ok(frame)) => handle_frame(&shared, session, frame),
                    Some(Err(e)) => break e.to_string(),
                    None => break constants::ERR_CONNECTION_CLOSED.to_string(),
                }
            }
        } => reason,
    };

    shared.sessions().remove(&session);
    let discarded = queue.clear();
    shared.metrics.connection_closed();
    info!(reason = %reason, discarded, "Client disconnected");
    shared.emit(ServerEvent::ClientDisconnected { session, reason });
}

fn handle_frame(shared: &ServerShared, session: SessionId, frame: Frame) {
    shared.metrics.frame_received(frame.encoded_len() as u64);
    let header = frame.header;
    match decode_inbound(&shared.registry, &header, &frame.payload, &shared.metrics) {
        Inbound::Message(message) => shared.emit(ServerEvent::Received {
            session,
            component_id: header.component_id,
            message_type: header.message_type,
            message,
        }),
        Inbound::Failed(diagnostic) => shared.emit(ServerEvent::ReceiveFailed {
            session,
            component_id: header.component_id,
            message_type: header.message_type,
            diagnostic,
        }),
        Inbound::Dropped => {}
    }
}
