use tokio::sync::mpsc;

pub mod address;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod progress;
pub mod session;
pub mod transfer;

use config::{ReceiverSettings, SendRequest, SenderSettings};
use error::Result;
use events::{EventReporter, LogLine};
use session::{ReceiverSession, SenderSession, SessionState};

/// Which side of a transfer an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

//Command from front-end to core
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Announce this host and accept files
    StartReceiver(ReceiverSettings),
    StopReceiver,
    /// Collect announcing receivers
    StartPeerSearch(SenderSettings),
    StopPeerSearch,
    /// Send one file to a receiver
    SendFile(SendRequest),
    /// Abort the send in progress
    StopSendFile,
}

//Report from core to front-end
#[derive(Debug, Clone)]
pub enum AppEvent {
    Log(LogLine),

    /// Full peer list for a role, in first-seen order
    PeersUpdated {
        role: Role,
        peers: Vec<String>,
    },

    /// Bar fraction in [0, 1]
    Progress {
        role: Role,
        fraction: f64,
    },

    /// `"<speed>/s t:<eta>"`
    Speed {
        role: Role,
        text: String,
    },

    /// Receiver inputs are read-only while the receiver runs
    ReceiverInputs {
        locked: bool,
    },

    /// Send inputs disabled and stop control enabled while a file is sending
    SendControls {
        sending: bool,
    },
}

/// Drive both roles from front-end commands until the command channel closes.
///
/// Every failed command is reported once as an error log line.
pub async fn run_backend(mut cmd_rx: mpsc::Receiver<AppCommand>, event_tx: mpsc::Sender<AppEvent>) {
    let reporter = EventReporter::new(event_tx);
    let mut receiver = ReceiverSession::new(reporter.clone());
    let mut sender = SenderSession::new(reporter.clone());

    receiver.seed_lan().await;

    while let Some(cmd) = cmd_rx.recv().await {
        tracing::debug!("Command: {:?}", cmd);
        if let Err(e) = handle_command(cmd, &mut receiver, &mut sender).await {
            reporter.error(e.to_string()).await;
        }
    }

    // Front-end gone: release ports.
    if receiver.state() == SessionState::Running {
        let _ = receiver.stop().await;
    }
    if sender.state() == SessionState::Running {
        let _ = sender.stop().await;
    }
    if sender.is_sending() {
        let _ = sender.stop_send_file().await;
    }
}

async fn handle_command(
    cmd: AppCommand,
    receiver: &mut ReceiverSession,
    sender: &mut SenderSession,
) -> Result<()> {
    match cmd {
        AppCommand::StartReceiver(settings) => receiver.start(&settings).await.map(|_| ()),
        AppCommand::StopReceiver => receiver.stop().await,
        AppCommand::StartPeerSearch(settings) => sender.start(&settings).await.map(|_| ()),
        AppCommand::StopPeerSearch => sender.stop().await,
        // The send reports its own outcome.
        AppCommand::SendFile(request) => sender.send_file(&request).await.map(|_| ()),
        AppCommand::StopSendFile => sender.stop_send_file().await,
    }
}
