use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};

use super::copy::{ByteSink, CopyFailure, Tee, copy_exact};
use super::hash::{Checksum, StreamingMd5};
use super::protocol::{TransferHeader, write_checksum};
use crate::error::{Error, Result};
use crate::progress::{ProgressDisplay, ProgressTracker};

/// What went over the wire for one sent file.
#[derive(Debug, Clone)]
pub struct SendSummary {
    pub file_name: String,
    pub file_size: u64,
    pub checksum: Checksum,
}

/// Send the file at `path` over `writer`: header, body, then MD5.
///
/// Nothing is written if the file cannot be opened or its name does not fit
/// the header. When `display` is given, a tracker sized to the file reports
/// progress for the duration of the copy.
pub async fn send_file<W>(
    path: &Path,
    writer: &mut W,
    display: Option<Arc<dyn ProgressDisplay>>,
) -> Result<SendSummary>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut file = File::open(path)
        .await
        .map_err(|e| Error::resource(format!("fail to open file {}", path.display()), e))?;
    let file_size = file
        .metadata()
        .await
        .map_err(|e| Error::resource("failed to obtain file information", e))?
        .len();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidFormat(format!("invalid file name {}", path.display())))?;

    let header = TransferHeader::new(file_name, file_size)?;

    tracing::debug!("Sending {} ({} bytes)", file_name, file_size);
    let checksum = match display {
        Some(display) => {
            let mut tracker = ProgressTracker::new(file_size, display);
            let result = send_stream(&header, &mut file, writer, &mut tracker).await;
            tracker.close();
            result?
        }
        None => send_stream(&header, &mut file, writer, &mut ()).await?,
    };

    Ok(SendSummary {
        file_name: header.file_name().to_string(),
        file_size,
        checksum,
    })
}

/// Send an already-opened body of `header.file_size()` bytes.
pub async fn send_stream<R, W>(
    header: &TransferHeader,
    reader: &mut R,
    writer: &mut W,
    progress: &mut dyn ByteSink,
) -> Result<Checksum>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    header.write_to(writer).await?;

    let mut hasher = StreamingMd5::new();
    {
        let mut sinks = Tee(&mut hasher, progress);
        copy_exact(reader, writer, header.file_size(), &mut sinks)
            .await
            .map_err(|failure| match failure {
                CopyFailure::Read(e) => Error::resource("error reading file", e),
                CopyFailure::Write(e) => Error::transport("error sending file", e),
                CopyFailure::Truncated { expected, received } => {
                    Error::UnexpectedEof { expected, received }
                }
            })?;
    }

    let checksum = hasher.finish();
    write_checksum(writer, &checksum).await?;
    Ok(checksum)
}
