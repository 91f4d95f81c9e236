#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lan_core::config::{ReceiverSettings, SendRequest, SenderSettings};
    use lan_core::error::Error;
    use lan_core::events::{EventReporter, LogLevel};
    use lan_core::session::{ReceiverSession, SenderSession, SessionState};
    use lan_core::{AppCommand, AppEvent, run_backend};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    fn reporter() -> (EventReporter, mpsc::Receiver<AppEvent>) {
        let (tx, rx) = mpsc::channel(1024);
        (EventReporter::new(tx), rx)
    }

    fn receiver_settings(dir: &std::path::Path) -> ReceiverSettings {
        ReceiverSettings {
            port: "0".to_string(),
            dest_dir: dir.display().to_string(),
            announce_target: "127.0.0.1".to_string(),
        }
    }

    /// Base port whose discovery port (`P + 1`) was free a moment ago.
    fn free_base_port() -> String {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        (socket.local_addr().unwrap().port() - 1).to_string()
    }

    #[tokio::test]
    async fn test_receiver_start_stop_twice() {
        let (reporter, _rx) = reporter();
        let dir = tempfile::tempdir().unwrap();
        let mut session = ReceiverSession::new(reporter);

        session.start(&receiver_settings(dir.path())).await.unwrap();
        assert!(matches!(
            session.start(&receiver_settings(dir.path())).await,
            Err(Error::RepeatedStart)
        ));
        assert_eq!(session.state(), SessionState::Running);

        session.stop().await.unwrap();
        assert!(matches!(session.stop().await, Err(Error::RepeatedStop)));
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_sender_start_stop_twice() {
        let (reporter, _rx) = reporter();
        let mut session = SenderSession::new(reporter);
        let settings = SenderSettings {
            port: free_base_port(),
        };

        session.start(&settings).await.unwrap();
        assert!(matches!(
            session.start(&settings).await,
            Err(Error::RepeatedStart)
        ));
        assert_eq!(session.state(), SessionState::Running);

        session.stop().await.unwrap();
        assert!(matches!(session.stop().await, Err(Error::RepeatedStop)));
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_file_goes_from_sender_to_receiver() {
        let (reporter, mut rx) = reporter();
        let src_dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("hello.txt");
        std::fs::write(&src, b"hello over the lan").unwrap();

        let mut receiver = ReceiverSession::new(reporter.clone());
        let bound = receiver
            .start(&receiver_settings(dest_dir.path()))
            .await
            .unwrap();

        let mut sender = SenderSession::new(reporter);
        let outbound = sender
            .send_file(&SendRequest {
                target_ip: "127.0.0.1".to_string(),
                port: bound.port().to_string(),
                file_path: src.display().to_string(),
            })
            .await
            .unwrap();
        let summary = timeout(Duration::from_secs(10), outbound.wait())
            .await
            .expect("send timed out")
            .unwrap();
        assert_eq!(summary.file_name, "hello.txt");
        assert_eq!(summary.file_size, 18);

        let received_line = format!("Received file: hello.txt size:18 md5:{}", summary.checksum);
        timeout(Duration::from_secs(10), async {
            while let Some(event) = rx.recv().await {
                if let AppEvent::Log(line) = event {
                    if line.message == received_line {
                        return;
                    }
                }
            }
        })
        .await
        .expect("receiver never logged the file");

        assert_eq!(
            std::fs::read(dest_dir.path().join("hello.txt")).unwrap(),
            b"hello over the lan"
        );
        receiver.stop().await.unwrap();
        assert!(!sender.is_sending());
    }

    #[tokio::test]
    async fn test_stop_send_file_closes_connection() {
        let (reporter, mut rx) = reporter();
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("big.bin");
        std::fs::write(&src, vec![0u8; 64 * 1024 * 1024]).unwrap();

        // A peer that accepts but never reads, so the send stalls.
        let stalled = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = stalled.local_addr().unwrap().port();
        let holder = tokio::spawn(async move {
            let (stream, _) = stalled.accept().await.unwrap();
            sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let mut sender = SenderSession::new(reporter);
        let outbound = sender
            .send_file(&SendRequest {
                target_ip: "127.0.0.1".to_string(),
                port: port.to_string(),
                file_path: src.display().to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(
            sender
                .send_file(&SendRequest {
                    target_ip: "127.0.0.1".to_string(),
                    port: port.to_string(),
                    file_path: src.display().to_string(),
                })
                .await,
            Err(Error::TransferInProgress)
        ));

        sleep(Duration::from_millis(200)).await;
        sender.stop_send_file().await.unwrap();

        // Still active until the task has restored the controls.
        assert!(sender.is_sending());
        let retry = SendRequest {
            target_ip: "127.0.0.1".to_string(),
            port: port.to_string(),
            file_path: src.display().to_string(),
        };
        assert!(matches!(
            sender.send_file(&retry).await,
            Err(Error::TransferInProgress)
        ));
        assert!(matches!(
            sender.stop_send_file().await,
            Err(Error::NoActiveTransfer)
        ));

        let err = timeout(Duration::from_secs(5), outbound.wait())
            .await
            .expect("send did not stop")
            .unwrap_err();
        assert!(err.is_closed());
        assert!(!sender.is_sending());
        holder.abort();

        // A stop is logged as such, never as an error, and the controls
        // come back after it.
        let mut stopped = false;
        let mut controls = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                AppEvent::Log(line) => {
                    assert_ne!(line.level, LogLevel::Error, "{}", line);
                    stopped |= line.message == "Send file stopped";
                }
                AppEvent::SendControls { sending } => controls.push(sending),
                _ => {}
            }
        }
        assert!(stopped);
        assert_eq!(controls, vec![true, false]);
    }

    #[tokio::test]
    async fn test_backend_reports_state_errors() {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, mut event_rx) = mpsc::channel(256);
        let backend = tokio::spawn(run_backend(cmd_rx, event_tx));

        cmd_tx.send(AppCommand::StopReceiver).await.unwrap();

        let line = timeout(Duration::from_secs(5), async {
            loop {
                match event_rx.recv().await {
                    Some(AppEvent::Log(line)) if line.level == LogLevel::Error => return line,
                    Some(_) => continue,
                    None => panic!("backend ended early"),
                }
            }
        })
        .await
        .expect("no error reported");
        assert_eq!(line.message, "repeated stop");

        drop(cmd_tx);
        timeout(Duration::from_secs(5), backend)
            .await
            .expect("backend did not exit")
            .unwrap();
    }
}
