use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use super::receiver::receive_file;
use crate::error::{Error, ErrorKind};
use crate::events::EventReporter;
use crate::progress::ProgressTracker;

/// Accept inbound transfers until `cancel` fires.
///
/// Each connection carries exactly one file and is received on its own task,
/// all feeding the same aggregate `progress` tracker. The listener is dropped
/// (closing the port) and the tracker closed when the loop ends.
pub async fn run_accept_loop(
    listener: TcpListener,
    dest_dir: PathBuf,
    progress: ProgressTracker,
    reporter: EventReporter,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                reporter.info("Receive listener closed").await;
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                tokio::spawn(handle_connection(
                    stream,
                    peer,
                    dest_dir.clone(),
                    progress.clone(),
                    reporter.clone(),
                ));
            }
            Err(e) => {
                reporter
                    .error(format!("Receive listener accept failed: {}", e))
                    .await;
                break;
            }
        }
    }

    drop(listener);
    progress.close();
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    dest_dir: PathBuf,
    progress: ProgressTracker,
    reporter: EventReporter,
) {
    reporter
        .info(format!("Start receiving files from: {}", peer))
        .await;

    match receive_file(&mut stream, &dest_dir, Some(&progress)).await {
        Ok(file) => {
            reporter
                .info(format!(
                    "Received file: {} size:{} md5:{}",
                    file.file_name, file.file_size, file.checksum
                ))
                .await;
        }
        Err(e) => report_receive_error(&reporter, peer, &e).await,
    }
}

async fn report_receive_error(reporter: &EventReporter, peer: SocketAddr, err: &Error) {
    match err.kind() {
        ErrorKind::Closed => {
            reporter
                .info(format!("Receive from {} closed", peer))
                .await;
        }
        ErrorKind::Integrity => {
            reporter
                .error(format!(
                    "Integrity check failed for file from {}, partial file removed: {}",
                    peer, err
                ))
                .await;
        }
        _ => {
            reporter
                .error(format!("Receive file error from {}: {}", peer, err))
                .await;
        }
    }
}
