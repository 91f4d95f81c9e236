//! Bounded stream copy with observers.
//!
//! Every chunk that reaches the writer is handed, in write order, to a
//! [`ByteSink`]. Hashing and progress counting plug in here; [`Tee`]
//! duplicates one chunk to several sinks.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::{
    LARGE_BUFFER_SIZE, MEDIUM_BUFFER_SIZE, MEDIUM_FILE_LIMIT, SMALL_BUFFER_SIZE, SMALL_FILE_LIMIT,
};

/// Receives every chunk copied through [`copy_exact`]. Called on the hot
/// path, so implementations must not block.
pub trait ByteSink: Send {
    fn consume(&mut self, chunk: &[u8]);
}

impl<T: ByteSink + ?Sized> ByteSink for &mut T {
    fn consume(&mut self, chunk: &[u8]) {
        (**self).consume(chunk);
    }
}

/// Sink that ignores everything.
impl ByteSink for () {
    fn consume(&mut self, _chunk: &[u8]) {}
}

impl<T: ByteSink> ByteSink for Option<T> {
    fn consume(&mut self, chunk: &[u8]) {
        if let Some(sink) = self {
            sink.consume(chunk);
        }
    }
}

/// Duplicates each chunk to two sinks, in order. Nest to fan out further.
pub struct Tee<A, B>(pub A, pub B);

impl<A: ByteSink, B: ByteSink> ByteSink for Tee<A, B> {
    fn consume(&mut self, chunk: &[u8]) {
        self.0.consume(chunk);
        self.1.consume(chunk);
    }
}

/// Pick a copy buffer for a body of `file_size` bytes.
pub fn buffer_size_for(file_size: u64) -> usize {
    if file_size < SMALL_FILE_LIMIT {
        SMALL_BUFFER_SIZE
    } else if file_size < MEDIUM_FILE_LIMIT {
        MEDIUM_BUFFER_SIZE
    } else {
        LARGE_BUFFER_SIZE
    }
}

/// Where a bounded copy stopped.
#[derive(Debug)]
pub enum CopyFailure {
    Read(io::Error),
    Write(io::Error),
    /// The reader hit end of stream after `received` of `expected` bytes.
    Truncated { expected: u64, received: u64 },
}

/// Copy exactly `len` bytes from `reader` to `writer`, feeding each written
/// chunk to `sink`.
pub async fn copy_exact<R, W>(
    reader: &mut R,
    writer: &mut W,
    len: u64,
    sink: &mut dyn ByteSink,
) -> Result<(), CopyFailure>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0u8; buffer_size_for(len)];
    let mut copied: u64 = 0;

    while copied < len {
        let want = std::cmp::min(buffer.len() as u64, len - copied) as usize;
        let n = reader
            .read(&mut buffer[..want])
            .await
            .map_err(CopyFailure::Read)?;
        if n == 0 {
            return Err(CopyFailure::Truncated {
                expected: len,
                received: copied,
            });
        }
        writer
            .write_all(&buffer[..n])
            .await
            .map_err(CopyFailure::Write)?;
        sink.consume(&buffer[..n]);
        copied += n as u64;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter(u64);

    impl ByteSink for Counter {
        fn consume(&mut self, chunk: &[u8]) {
            self.0 += chunk.len() as u64;
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<u8>);

    impl ByteSink for Recorder {
        fn consume(&mut self, chunk: &[u8]) {
            self.0.extend_from_slice(chunk);
        }
    }

    #[test]
    fn test_buffer_tiers() {
        assert_eq!(buffer_size_for(0), 1024);
        assert_eq!(buffer_size_for(64 * 1024 - 1), 1024);
        assert_eq!(buffer_size_for(64 * 1024), 128 * 1024);
        assert_eq!(buffer_size_for(8 * 1024 * 1024 - 1), 128 * 1024);
        assert_eq!(buffer_size_for(8 * 1024 * 1024), 16 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_copy_exact_stops_at_len() {
        let data: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
        let mut reader = &data[..];
        let mut out = Vec::new();
        let mut counter = Counter::default();
        let mut recorder = Recorder::default();

        {
            let mut tee = Tee(&mut counter, Tee(&mut recorder, ()));
            copy_exact(&mut reader, &mut out, 3000, &mut tee).await.unwrap();
        }

        assert_eq!(out, &data[..3000]);
        assert_eq!(counter.0, 3000);
        assert_eq!(recorder.0, out);
        // The rest of the stream is left unread.
        assert_eq!(reader.len(), 2000);
    }

    #[tokio::test]
    async fn test_copy_exact_reports_truncation() {
        let data = vec![7u8; 100];
        let mut reader = &data[..];
        let mut out = Vec::new();
        let mut counter = Counter::default();

        let err = copy_exact(&mut reader, &mut out, 250, &mut counter)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CopyFailure::Truncated {
                expected: 250,
                received: 100
            }
        ));
        assert_eq!(counter.0, 100);
    }
}
