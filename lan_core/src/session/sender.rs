use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::SessionState;
use crate::address::{PeerAddress, validate_ipv4};
use crate::config::{PortLayout, SendRequest, SenderSettings};
use crate::discovery::{PeerSet, bind_collector, run_collect_loop};
use crate::error::{Error, Result};
use crate::events::EventReporter;
use crate::progress::{EventDisplay, ProgressDisplay};
use crate::transfer::constants::STOP_SIGNAL_PAYLOAD;
use crate::transfer::utils::ensure_file;
use crate::transfer::{SendSummary, send_file};
use crate::{AppEvent, Role};

/// The file-sending role: peer collection plus one outbound file at a time.
pub struct SenderSession {
    reporter: EventReporter,
    peers: PeerSet,
    collector: Option<Collector>,
    outbound: Option<ActiveSend>,
}

struct Collector {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct ActiveSend {
    cancel: CancellationToken,
    stop_signal: SocketAddr,
    finished: Arc<AtomicBool>,
}

impl ActiveSend {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Handle to a send running in the background.
pub struct OutboundTransfer {
    handle: JoinHandle<Result<SendSummary>>,
}

impl OutboundTransfer {
    /// Wait for the send to finish. A stopped send yields [`Error::Closed`].
    pub async fn wait(self) -> Result<SendSummary> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(Error::Closed),
        }
    }
}

impl SenderSession {
    pub fn new(reporter: EventReporter) -> Self {
        Self {
            reporter,
            peers: PeerSet::new(),
            collector: None,
            outbound: None,
        }
    }

    /// State of the peer collection lifecycle.
    pub fn state(&self) -> SessionState {
        if self.collector.is_some() {
            SessionState::Running
        } else {
            SessionState::Stopped
        }
    }

    /// Peers collected so far.
    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub fn is_sending(&self) -> bool {
        self.outbound.as_ref().is_some_and(|send| !send.is_finished())
    }

    /// Start collecting announcements on `P + 1`. Returns the bound address.
    pub async fn start(&mut self, settings: &SenderSettings) -> Result<SocketAddr> {
        if self.collector.is_some() {
            return Err(Error::RepeatedStart);
        }

        let ports = PortLayout::parse(&settings.port)?;
        let socket = bind_collector(ports.discovery()).await?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| Error::resource("reading collector address", e))?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_collect_loop(
            socket,
            self.peers.clone(),
            Role::Sender,
            self.reporter.clone(),
            cancel.child_token(),
        ));
        self.collector = Some(Collector { cancel, task });

        self.reporter
            .info(format!("Start searching peers on {}", local_addr))
            .await;
        Ok(local_addr)
    }

    /// Close the collector socket.
    pub async fn stop(&mut self) -> Result<()> {
        let collector = self.collector.take().ok_or(Error::RepeatedStop)?;
        collector.cancel.cancel();
        if let Err(e) = collector.task.await {
            tracing::error!("Peer collector ended abnormally: {}", e);
        }
        self.reporter.info("Stop searching peers").await;
        Ok(())
    }

    /// Validate `request` and send the file in the background.
    ///
    /// Independent of the collect lifecycle. Only one send runs at a time.
    pub async fn send_file(&mut self, request: &SendRequest) -> Result<OutboundTransfer> {
        if self.is_sending() {
            return Err(Error::TransferInProgress);
        }

        let target = validate_ipv4(request.target_ip.trim())?;
        let ports = PortLayout::parse(&request.port)?;
        let path = ensure_file(&request.file_path).await?;

        let cancel = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_send(
            target,
            ports,
            path,
            self.reporter.clone(),
            cancel.child_token(),
            finished.clone(),
        ));

        self.outbound = Some(ActiveSend {
            cancel,
            stop_signal: target.socket_addr(ports.stop_signal()),
            finished,
        });
        Ok(OutboundTransfer { handle })
    }

    /// Signal `P + 2` on the target and force-close the local connection.
    ///
    /// The send still counts as active until its task has restored the
    /// controls.
    pub async fn stop_send_file(&mut self) -> Result<()> {
        let send = match &self.outbound {
            Some(send) if !send.is_finished() && !send.cancel.is_cancelled() => send,
            _ => return Err(Error::NoActiveTransfer),
        };

        if let Err(e) = send_stop_signal(send.stop_signal).await {
            self.reporter.error(e.to_string()).await;
        }
        send.cancel.cancel();
        Ok(())
    }
}

impl Drop for SenderSession {
    fn drop(&mut self) {
        if let Some(collector) = &self.collector {
            collector.cancel.cancel();
        }
        if let Some(send) = &self.outbound {
            send.cancel.cancel();
        }
    }
}

async fn send_stop_signal(to: SocketAddr) -> Result<()> {
    let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0)))
        .await
        .map_err(|e| Error::resource("opening stop signal socket", e))?;
    socket
        .send_to(STOP_SIGNAL_PAYLOAD, to)
        .await
        .map_err(|e| Error::transport(format!("sending stop signal to {}", to), e))?;
    Ok(())
}

async fn run_send(
    target: PeerAddress,
    ports: PortLayout,
    path: PathBuf,
    reporter: EventReporter,
    cancel: CancellationToken,
    finished: Arc<AtomicBool>,
) -> Result<SendSummary> {
    reporter.emit(AppEvent::SendControls { sending: true }).await;

    // Dropping the dial/send future closes the connection.
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Closed),
        result = dial_and_send(target.socket_addr(ports.transfer()), &path, &reporter) => result,
    };

    match &result {
        Ok(summary) => {
            reporter
                .info(format!(
                    "Send file: {} size:{} md5:{}",
                    summary.file_name, summary.file_size, summary.checksum
                ))
                .await;
        }
        Err(e) if e.is_closed() => reporter.info("Send file stopped").await,
        Err(e) => reporter.error(format!("Send file error: {}", e)).await,
    }

    reporter.emit(AppEvent::SendControls { sending: false }).await;
    finished.store(true, Ordering::Release);
    result
}

async fn dial_and_send(
    addr: SocketAddr,
    path: &Path,
    reporter: &EventReporter,
) -> Result<SendSummary> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| Error::transport(format!("link error with {}", addr), e))?;
    reporter
        .info(format!("Start sending file {} to {}", path.display(), addr))
        .await;

    let display: Arc<dyn ProgressDisplay> = EventDisplay::new(Role::Sender, reporter.clone());
    let summary = send_file(path, &mut stream, Some(display)).await?;
    stream
        .shutdown()
        .await
        .map_err(|e| Error::transport("closing connection", e))?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_send_validation() {
        let (tx, _rx) = mpsc::channel(256);
        let mut session = SenderSession::new(EventReporter::new(tx));
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"a").unwrap();

        let bad_ip = SendRequest {
            target_ip: "192.168.1.256".to_string(),
            port: "32000".to_string(),
            file_path: file.display().to_string(),
        };
        assert!(matches!(
            session.send_file(&bad_ip).await,
            Err(Error::InvalidFormat(_))
        ));

        let dir_as_file = SendRequest {
            target_ip: "127.0.0.1".to_string(),
            port: "32000".to_string(),
            file_path: dir.path().display().to_string(),
        };
        assert!(matches!(
            session.send_file(&dir_as_file).await,
            Err(Error::NotAFile(_))
        ));
        assert!(!session.is_sending());
    }

    #[tokio::test]
    async fn test_stop_without_send() {
        let (tx, _rx) = mpsc::channel(256);
        let mut session = SenderSession::new(EventReporter::new(tx));
        assert!(matches!(
            session.stop_send_file().await,
            Err(Error::NoActiveTransfer)
        ));
        assert!(matches!(session.stop().await, Err(Error::RepeatedStop)));
    }
}
