//! Command-line front-end for LAN file transfer.
//!
//! ```bash
//! # Receive into a folder, announcing to the LAN
//! lan-transfer receive --dir ~/Downloads
//!
//! # List receivers that announce themselves
//! lan-transfer search
//!
//! # Send a file
//! lan-transfer send --ip 192.168.1.20 ./report.pdf
//!
//! # MD5 of a local file, as printed in transfer log lines
//! lan-transfer checksum ./report.pdf
//! ```

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use lan_core::config::{AppConfig, ReceiverSettings, SendRequest, SenderSettings};
use lan_core::events::LogLevel;
use lan_core::transfer::hash::compute_file_md5;
use lan_core::{AppCommand, AppEvent, Role, run_backend};
use tokio::signal;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "lan-transfer", version, about = "Find peers and send files over the LAN")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Announce this host and receive files until Ctrl+C
    Receive(ReceiveArgs),
    /// Listen for announcing receivers until Ctrl+C
    Search(SearchArgs),
    /// Send one file to a receiver
    Send(SendArgs),
    /// Print the MD5 of a file, to compare with a transfer log line
    Checksum(ChecksumArgs),
}

#[derive(Args)]
struct ReceiveArgs {
    /// Base port (TCP on P, discovery on P+1)
    #[arg(short, long)]
    port: Option<String>,
    /// Existing folder to save into
    #[arg(short, long)]
    dir: Option<PathBuf>,
    /// Announce to this IP only instead of every LAN subnet
    #[arg(short, long)]
    target: Option<String>,
    /// Remember these settings
    #[arg(long)]
    save: bool,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(short, long)]
    port: Option<String>,
    #[arg(long)]
    save: bool,
}

#[derive(Args)]
struct SendArgs {
    /// Receiver IPv4 address
    #[arg(short, long)]
    ip: String,
    #[arg(short, long)]
    port: Option<String>,
    /// File to send; defaults to the last one sent
    file: Option<PathBuf>,
    #[arg(long)]
    save: bool,
}

#[derive(Args)]
struct ChecksumArgs {
    file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let mut config = AppConfig::load();

    let (start, stop, save) = match cli.command {
        Command::Receive(args) => {
            if let Some(port) = &args.port {
                config.receiver_port = port.parse().unwrap_or(config.receiver_port);
            }
            if let Some(dir) = &args.dir {
                config.receive_dir = dir.clone();
            }
            if args.target.is_some() {
                config.announce_target = args.target.clone();
            }
            let settings = ReceiverSettings {
                port: args.port.unwrap_or_else(|| config.receiver_port.to_string()),
                ..config.receiver_settings()
            };
            (
                AppCommand::StartReceiver(settings),
                AppCommand::StopReceiver,
                args.save,
            )
        }
        Command::Search(args) => {
            if let Some(port) = &args.port {
                config.sender_port = port.parse().unwrap_or(config.sender_port);
            }
            let settings = match args.port {
                Some(port) => SenderSettings { port },
                None => config.sender_settings(),
            };
            (
                AppCommand::StartPeerSearch(settings),
                AppCommand::StopPeerSearch,
                args.save,
            )
        }
        Command::Send(args) => {
            if let Some(file) = &args.file {
                config.sender_file = Some(file.clone());
            }
            let Some(file) = config.sender_file.clone() else {
                bail!("no file given and none remembered");
            };
            let request = SendRequest {
                target_ip: args.ip,
                port: args
                    .port
                    .unwrap_or_else(|| config.sender_port.to_string()),
                file_path: file.display().to_string(),
            };
            (
                AppCommand::SendFile(request),
                AppCommand::StopSendFile,
                args.save,
            )
        }
        Command::Checksum(args) => {
            let checksum = compute_file_md5(&args.file).await?;
            println!("{}  {}", checksum, args.file.display());
            return Ok(());
        }
    };

    if save {
        config.save()?;
    }

    let one_shot = matches!(start, AppCommand::SendFile(_));
    let (cmd_tx, cmd_rx) = mpsc::channel::<AppCommand>(100);
    let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(1000);
    let backend = tokio::spawn(run_backend(cmd_rx, event_tx));

    cmd_tx.send(start).await?;

    let mut console = Console::default();
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut send_started = false;

    loop {
        tokio::select! {
            res = &mut ctrl_c, if !interrupted => {
                res?;
                interrupted = true;
                cmd_tx.send(stop.clone()).await?;
                if !one_shot {
                    break;
                }
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                console.render(&event);
                match event {
                    AppEvent::SendControls { sending: true } => send_started = true,
                    AppEvent::SendControls { sending: false } if one_shot => break,
                    // A rejected send never starts.
                    AppEvent::Log(line) if one_shot && !send_started && line.level == LogLevel::Error => break,
                    _ => {}
                }
            }
        }
    }

    drop(cmd_tx);
    backend.await?;
    while let Ok(event) = event_rx.try_recv() {
        console.render(&event);
    }
    console.finish();

    if one_shot && console.errors > 0 {
        bail!("transfer failed");
    }
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,lan_core=info"));

    // Operator log lines are printed from events; tracing goes to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// Prints events; progress is redrawn in place on one line.
#[derive(Default)]
struct Console {
    fraction: f64,
    speed: String,
    progress_line: bool,
    errors: usize,
}

impl Console {
    fn render(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Log(line) => {
                self.clear_progress();
                if line.level == LogLevel::Error {
                    self.errors += 1;
                }
                println!("{}", line);
            }
            AppEvent::PeersUpdated { role, peers } => {
                self.clear_progress();
                let label = match role {
                    Role::Sender => "Receivers found",
                    Role::Receiver => "Announcing to",
                };
                println!("{}: {}", label, peers.join(", "));
            }
            AppEvent::Progress { fraction, .. } => {
                self.fraction = *fraction;
                self.draw_progress();
            }
            AppEvent::Speed { text, .. } => {
                self.speed = text.clone();
                self.draw_progress();
            }
            AppEvent::ReceiverInputs { .. } | AppEvent::SendControls { .. } => {}
        }
    }

    fn draw_progress(&mut self) {
        const WIDTH: usize = 30;
        let filled = (self.fraction * WIDTH as f64).round() as usize;
        let filled = filled.min(WIDTH);
        print!(
            "\r[{}{}] {:5.1}% {:<24}",
            "#".repeat(filled),
            "-".repeat(WIDTH - filled),
            self.fraction * 100.0,
            self.speed
        );
        let _ = std::io::stdout().flush();
        self.progress_line = true;
    }

    fn clear_progress(&mut self) {
        if self.progress_line {
            println!();
            self.progress_line = false;
        }
    }

    fn finish(&mut self) {
        self.clear_progress();
    }
}
