use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::SessionState;
use crate::address::{PeerAddress, lan_broadcast_addresses, validate_ipv4};
use crate::config::{PortLayout, ReceiverSettings};
use crate::discovery::{PeerSet, run_announce_loop};
use crate::error::{Error, Result};
use crate::events::EventReporter;
use crate::progress::{EventDisplay, ProgressDisplay, ProgressTracker};
use crate::transfer::run_accept_loop;
use crate::transfer::utils::ensure_directory;
use crate::{AppEvent, Role};

/// The file-receiving role: announce loop plus TCP accept loop.
pub struct ReceiverSession {
    reporter: EventReporter,
    peers: PeerSet,
    running: Option<Running>,
}

struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ReceiverSession {
    pub fn new(reporter: EventReporter) -> Self {
        Self {
            reporter,
            peers: PeerSet::new(),
            running: None,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.running.is_some() {
            SessionState::Running
        } else {
            SessionState::Stopped
        }
    }

    /// Destinations used by LAN traversal announce mode.
    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Seed the peer list with the subnet broadcast address of every LAN
    /// interface on this host.
    pub async fn seed_lan(&self) {
        for addr in lan_broadcast_addresses() {
            self.add_peer(addr).await;
        }
    }

    /// Add an announce destination by hand.
    pub async fn add_peer(&self, addr: PeerAddress) {
        if self.peers.insert(addr).await {
            tracing::debug!("Receiver announce destination added: {}", addr);
            self.reporter
                .emit(AppEvent::PeersUpdated {
                    role: Role::Receiver,
                    peers: self.peers.to_strings().await,
                })
                .await;
        }
    }

    /// Validate `settings`, bind the listener and start both loops.
    ///
    /// Returns the bound TCP address. Nothing is started if any check fails.
    pub async fn start(&mut self, settings: &ReceiverSettings) -> Result<SocketAddr> {
        if self.running.is_some() {
            return Err(Error::RepeatedStart);
        }

        let ports = PortLayout::parse(&settings.port)?;
        let dest_dir = ensure_directory(&settings.dest_dir).await?;
        let target = match settings.announce_target.trim() {
            "" => None,
            ip => Some(validate_ipv4(ip)?),
        };

        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], ports.transfer())))
            .await
            .map_err(|e| Error::resource(format!("link error with port {}", ports.transfer()), e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::resource("reading listener address", e))?;

        let cancel = CancellationToken::new();
        let display: Arc<dyn ProgressDisplay> =
            EventDisplay::new(Role::Receiver, self.reporter.clone());
        let progress = ProgressTracker::aggregate(display);

        let announce = tokio::spawn(run_announce_loop(
            target,
            ports.discovery(),
            self.peers.clone(),
            self.reporter.clone(),
            cancel.child_token(),
        ));
        let accept = tokio::spawn(run_accept_loop(
            listener,
            dest_dir.clone(),
            progress,
            self.reporter.clone(),
            cancel.child_token(),
        ));

        self.running = Some(Running {
            cancel,
            tasks: vec![announce, accept],
        });

        self.reporter
            .emit(AppEvent::ReceiverInputs { locked: true })
            .await;
        self.reporter
            .info(format!(
                "Run Receiver Succeed, listening on {} and saving to {}",
                local_addr,
                dest_dir.display()
            ))
            .await;
        Ok(local_addr)
    }

    /// Stop both loops and close the listener. Transfers already accepted
    /// run to completion.
    pub async fn stop(&mut self) -> Result<()> {
        let running = self.running.take().ok_or(Error::RepeatedStop)?;
        running.cancel.cancel();
        for task in running.tasks {
            if let Err(e) = task.await {
                tracing::error!("Receiver task ended abnormally: {}", e);
            }
        }

        self.reporter
            .emit(AppEvent::ReceiverInputs { locked: false })
            .await;
        self.reporter.info("Receiver stopped").await;
        Ok(())
    }
}

impl Drop for ReceiverSession {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}
