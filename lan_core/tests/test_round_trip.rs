#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lan_core::transfer::hash::compute_file_md5;
    use lan_core::transfer::{receive_file, send_file};
    use rand::RngCore;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    async fn round_trip(size: usize) {
        let src_dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();

        let mut content = vec![0u8; size];
        rand::rng().fill_bytes(&mut content);
        let name = format!("random_{}.bin", size);
        let src = src_dir.path().join(&name);
        std::fs::write(&src, &content).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dest = dest_dir.path().to_path_buf();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            receive_file(&mut stream, &dest, None).await
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let sent = send_file(&src, &mut stream, None).await.unwrap();
        stream.shutdown().await.unwrap();

        let received = timeout(Duration::from_secs(30), server)
            .await
            .expect("receiver timed out")
            .unwrap()
            .unwrap();

        assert_eq!(received.file_name, name);
        assert_eq!(received.file_size, size as u64);
        assert_eq!(received.checksum, sent.checksum);
        assert_eq!(std::fs::read(&received.path).unwrap(), content);
        assert_eq!(
            compute_file_md5(&received.path).await.unwrap(),
            compute_file_md5(&src).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_file() {
        round_trip(0).await;
    }

    #[tokio::test]
    async fn test_single_byte() {
        round_trip(1).await;
    }

    #[tokio::test]
    async fn test_small_buffer_edge() {
        round_trip(64 * 1024 - 1).await;
    }

    #[tokio::test]
    async fn test_medium_buffer_edge() {
        round_trip(64 * 1024).await;
    }

    #[tokio::test]
    async fn test_large_buffer() {
        round_trip(8 * 1024 * 1024 + 1).await;
    }
}
