//! Shared schemas and helpers for the integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::{TcpListener, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use refbox_comm::transport::events::EventReceiver;
use refbox_comm::{wire_identity, MessageRegistry};
use serde::{Deserialize, Serialize};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub seq: u32,
}
wire_identity!(Ping, 10, 1);

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    pub seq: u32,
}
wire_identity!(Pong, 10, 2);

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub team_cyan: String,
    pub team_magenta: String,
    pub points: Vec<u32>,
}
wire_identity!(GameState, 2000, 20);

/// Registry with Ping, Pong and GameState
pub fn registry() -> Arc<MessageRegistry> {
    let registry = MessageRegistry::new();
    registry.register_self_describing::<Ping>().unwrap();
    registry.register_self_describing::<Pong>().unwrap();
    registry.register_self_describing::<GameState>().unwrap();
    Arc::new(registry)
}

/// Wait for the first event matching `pick`, skipping others
pub async fn next_matching<E, T, F>(rx: &mut EventReceiver<E>, mut pick: F) -> T
where
    F: FnMut(E) -> Option<T>,
{
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if let Some(found) = pick(event) {
                return found;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Assert no event matching `pick` shows up within `window`
pub async fn assert_none_within<E, F>(rx: &mut EventReceiver<E>, window: Duration, mut pick: F)
where
    E: std::fmt::Debug,
    F: FnMut(&E) -> bool,
{
    let _ = tokio::time::timeout(window, async {
        while let Some(event) = rx.recv().await {
            assert!(!pick(&event), "unexpected event: {event:?}");
        }
    })
    .await;
}

/// TCP port that was free a moment ago
pub fn free_tcp_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// `n` distinct UDP ports that were free a moment ago
pub fn free_udp_ports(n: usize) -> Vec<u16> {
    let sockets: Vec<UdpSocket> = (0..n)
        .map(|_| UdpSocket::bind("0.0.0.0:0").unwrap())
        .collect();
    sockets
        .iter()
        .map(|s| s.local_addr().unwrap().port())
        .collect()
}
