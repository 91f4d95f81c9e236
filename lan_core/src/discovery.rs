//! UDP peer discovery.
//!
//! The receiving side announces itself with a tiny datagram every
//! [`ANNOUNCE_INTERVAL`]; the sending side collects the source address of
//! each announcement into its [`PeerSet`]. Both loops run on the discovery
//! port (`P + 1`) and end when their cancellation token fires.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::address::{PeerAddress, extract_address_host};
use crate::error::{Error, Result};
use crate::events::EventReporter;
use crate::{AppEvent, Role};

pub const ANNOUNCE_INTERVAL: Duration = Duration::from_millis(500);

/// Announcement payload; its content is not inspected.
pub const ANNOUNCE_PAYLOAD: &[u8] = b"x";

/// Receive buffer for probes.
pub const PROBE_LEN: usize = 8;

/// Insertion-ordered set of discovered peers. Entries are never removed.
#[derive(Debug, Clone, Default)]
pub struct PeerSet {
    peers: Arc<RwLock<Vec<PeerAddress>>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `peer` if unseen; returns whether it was new.
    pub async fn insert(&self, peer: PeerAddress) -> bool {
        let mut peers = self.peers.write().await;
        if peers.contains(&peer) {
            return false;
        }
        peers.push(peer);
        true
    }

    pub async fn snapshot(&self) -> Vec<PeerAddress> {
        self.peers.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    /// Dotted-quad strings, in first-seen order, for the UI.
    pub async fn to_strings(&self) -> Vec<String> {
        self.peers
            .read()
            .await
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

/// Periodically announce this host to `target`, or to every address in
/// `peers` when no target is configured.
pub async fn run_announce_loop(
    target: Option<PeerAddress>,
    discovery_port: u16,
    peers: PeerSet,
    reporter: EventReporter,
    cancel: CancellationToken,
) {
    reporter.info("Start Broadcast Ip...").await;
    if target.is_none() {
        if peers.is_empty().await {
            reporter
                .error("Announce target is not filled in and no LAN address is known")
                .await;
            return;
        }
        reporter
            .info("IP is not filled in, start LAN traversal sending mode")
            .await;
    }

    let socket = match UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await {
        Ok(socket) => socket,
        Err(e) => {
            reporter
                .error(format!("Cannot open announce socket: {}", e))
                .await;
            return;
        }
    };
    // Subnet broadcast destinations need SO_BROADCAST.
    if let Err(e) = socket.set_broadcast(true) {
        tracing::warn!("Cannot enable broadcast on announce socket: {}", e);
    }

    let mut ticker = interval(ANNOUNCE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                reporter.info("Stop Broadcast Ip").await;
                return;
            }
            _ = ticker.tick() => {}
        }

        let destinations = match target {
            Some(target) => vec![target],
            None => peers.snapshot().await,
        };
        for peer in destinations {
            let addr = peer.socket_addr(discovery_port);
            if let Err(e) = socket.send_to(ANNOUNCE_PAYLOAD, addr).await {
                reporter
                    .error(format!("Link write error with {}: {}", addr, e))
                    .await;
            }
        }
    }
}

/// Bind the collector socket on the discovery port.
pub async fn bind_collector(discovery_port: u16) -> Result<UdpSocket> {
    UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], discovery_port)))
        .await
        .map_err(|e| Error::resource(format!("link error with port {}", discovery_port), e))
}

/// Collect announcing peers into `peers` until `cancel` fires.
pub async fn run_collect_loop(
    socket: UdpSocket,
    peers: PeerSet,
    role: Role,
    reporter: EventReporter,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; PROBE_LEN];
    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                reporter.info("Peer collector closed").await;
                break;
            }
            received = socket.recv_from(&mut buf) => received,
        };

        let from = match received {
            Ok((_, from)) => from,
            Err(e) => {
                reporter
                    .error(format!("Peer collector receive error: {}", e))
                    .await;
                break;
            }
        };

        let peer = match extract_address_host(&from.to_string()) {
            Ok(peer) => peer,
            Err(e) => {
                reporter
                    .error(format!("Ignoring announcement from {}: {}", from, e))
                    .await;
                continue;
            }
        };

        if peers.insert(peer).await {
            reporter.info(format!("Discovered peer {}", peer)).await;
            reporter
                .emit(AppEvent::PeersUpdated {
                    role,
                    peers: peers.to_strings().await,
                })
                .await;
        }
    }
}
