//! # Relay
//!
//! Rebroadcasts raw datagrams between the participants of a group so that
//! several machines can share one simulated broadcast domain.
//!
//! Each configured address gets one broadcast peer per enabled group. A
//! datagram is attributed to the group whose send ports contain its source
//! port and is forwarded, untouched, to every other peer of that group.
//! Encrypted groups are relayed without ever being decrypted.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, trace, warn};

use crate::config::{PeerConfig, RelayConfig};
use crate::core::frame::FrameHeader;
use crate::error::{ProtocolError, Result};
use crate::protocol::registry::MessageRegistry;
use crate::transport::peer::{BroadcastPeer, RawHook};
use crate::utils::metrics::Metrics;

/// Port group a participant belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelayGroup {
    Plain,
    Crypto1,
    Crypto2,
}

impl std::fmt::Display for RelayGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RelayGroup::Plain => "plain",
            RelayGroup::Crypto1 => "crypto1",
            RelayGroup::Crypto2 => "crypto2",
        })
    }
}

/// Enabled groups with their per-participant `(send_port, recv_port)`
fn group_ports(config: &RelayConfig) -> Vec<(RelayGroup, Vec<(u16, u16)>)> {
    let zip = |send: &[u16], recv: &[u16]| -> Vec<(u16, u16)> {
        send.iter().copied().zip(recv.iter().copied()).collect()
    };

    let mut groups = vec![(RelayGroup::Plain, zip(&config.send_ports, &config.recv_ports))];
    if config.use_crypto1 {
        groups.push((
            RelayGroup::Crypto1,
            zip(&config.send_ports_crypto1, &config.recv_ports_crypto1),
        ));
    }
    if config.use_crypto2 {
        groups.push((
            RelayGroup::Crypto2,
            zip(&config.send_ports_crypto2, &config.recv_ports_crypto2),
        ));
    }
    groups
}

/// Pure routing table: source port to forwarding targets
#[derive(Debug, Clone, Default)]
pub struct RelayTable {
    groups: Vec<(RelayGroup, Vec<u16>)>,
}

impl RelayTable {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            groups: group_ports(config)
                .into_iter()
                .map(|(group, ports)| (group, ports.into_iter().map(|(send, _)| send).collect()))
                .collect(),
        }
    }

    /// Add a group with the send port of each participant
    pub fn with_group(mut self, group: RelayGroup, send_ports: Vec<u16>) -> Self {
        self.groups.push((group, send_ports));
        self
    }

    /// First group (plain, crypto1, crypto2) whose send ports contain `port`
    pub fn group_of(&self, port: u16) -> Option<RelayGroup> {
        self.groups
            .iter()
            .find(|(_, ports)| ports.contains(&port))
            .map(|(group, _)| *group)
    }

    /// Group of `port` and the participant indices to forward to
    pub fn targets(&self, port: u16) -> Option<(RelayGroup, Vec<usize>)> {
        let (group, ports) = self.groups.iter().find(|(_, ports)| ports.contains(&port))?;
        let targets = ports
            .iter()
            .enumerate()
            .filter(|(_, send_port)| **send_port != port)
            .map(|(i, _)| i)
            .collect();
        Some((*group, targets))
    }
}

struct RawDatagram {
    remote: SocketAddr,
    header: FrameHeader,
    payload: Bytes,
}

/// Running rebroadcaster
pub struct Relay {
    peers: Arc<HashMap<RelayGroup, Vec<BroadcastPeer>>>,
    table: RelayTable,
    metrics: Arc<Metrics>,
    token: CancellationToken,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay").field("table", &self.table).finish()
    }
}

impl Relay {
    /// Bind every participant peer and start forwarding
    #[instrument(skip_all, fields(participants = config.addresses.len()))]
    pub async fn start(config: RelayConfig) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ProtocolError::ConfigError(errors.join("; ")));
        }

        let table = RelayTable::from_config(&config);
        let registry = Arc::new(MessageRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel::<RawDatagram>();

        let mut peers = HashMap::new();
        for (group, ports) in group_ports(&config) {
            let mut group_peers = Vec::with_capacity(ports.len());
            for (address, (send_port, recv_port)) in config.addresses.iter().zip(ports) {
                let tx = tx.clone();
                let hook: RawHook = Arc::new(move |remote, header, payload| {
                    let _ = tx.send(RawDatagram {
                        remote,
                        header: *header,
                        payload: payload.clone(),
                    });
                });
                let peer = BroadcastPeer::bind_with_hook(
                    PeerConfig::with_ports(address.clone(), send_port, recv_port),
                    Some(registry.clone()),
                    hook,
                )
                .await?;
                info!(%group, %address, send_port, recv_port, "Relay peer bound");
                group_peers.push(peer);
            }
            peers.insert(group, group_peers);
        }
        drop(tx);

        let peers = Arc::new(peers);
        let metrics = Arc::new(Metrics::new());
        let token = CancellationToken::new();
        tokio::spawn(forward_loop(
            rx,
            table.clone(),
            peers.clone(),
            config.packet_loss,
            metrics.clone(),
            token.clone(),
        ));

        Ok(Self {
            peers,
            table,
            metrics,
            token,
        })
    }

    pub fn table(&self) -> &RelayTable {
        &self.table
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Local addresses of the peers in `group`, in configuration order
    pub fn local_addrs(&self, group: RelayGroup) -> Vec<SocketAddr> {
        self.peers
            .get(&group)
            .map(|peers| peers.iter().map(BroadcastPeer::local_addr).collect())
            .unwrap_or_default()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
        for peer in self.peers.values().flatten() {
            peer.close();
        }
        self.metrics.log_metrics("relay");
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn forward_loop(
    mut rx: mpsc::UnboundedReceiver<RawDatagram>,
    table: RelayTable,
    peers: Arc<HashMap<RelayGroup, Vec<BroadcastPeer>>>,
    packet_loss: f64,
    metrics: Arc<Metrics>,
    token: CancellationToken,
) {
    loop {
        let datagram = tokio::select! {
            _ = token.cancelled() => return,
            next = rx.recv() => match next {
                Some(datagram) => datagram,
                None => return,
            },
        };

        if packet_loss > 0.0 && rand::rng().random::<f64>() < packet_loss {
            metrics.frame_lost();
            trace!(remote = %datagram.remote, "Simulated loss, datagram dropped");
            continue;
        }

        let port = datagram.remote.port();
        let Some((group, targets)) = table.targets(port) else {
            trace!(remote = %datagram.remote, "Datagram from unknown port, ignoring");
            continue;
        };
        let Some(group_peers) = peers.get(&group) else {
            continue;
        };

        for index in targets {
            let Some(peer) = group_peers.get(index) else {
                continue;
            };
            match peer.send_raw(datagram.header, &datagram.payload) {
                Ok(()) => metrics.frame_forwarded(),
                Err(e) => {
                    warn!(%group, destination = %peer.destination(), error = %e, "Failed to forward datagram")
                }
            }
        }
    }
}
