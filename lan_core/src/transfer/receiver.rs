use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWriteExt};

use super::copy::{ByteSink, CopyFailure, Tee, copy_exact};
use super::hash::{Checksum, StreamingMd5};
use super::protocol::{TransferHeader, read_checksum};
use super::utils::{create_destination_file, sanitize_file_name};
use crate::error::{Error, Result};
use crate::progress::ProgressTracker;

/// A file that arrived intact.
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
    pub checksum: Checksum,
}

/// Receive one file from `reader` into `dest_dir`.
///
/// The header is read in full before the destination file is created. If
/// anything fails after that (a short body, a transport error, or an MD5
/// mismatch) the partial file is deleted before the error is returned.
///
/// With an aggregate `progress` tracker, this transfer is added to its target
/// for as long as it runs.
pub async fn receive_file<R>(
    reader: &mut R,
    dest_dir: &Path,
    progress: Option<&ProgressTracker>,
) -> Result<ReceivedFile>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let header = TransferHeader::read_from(reader).await?;
    let file_name = sanitize_file_name(header.file_name());
    let path = dest_dir.join(&file_name);

    let mut file = create_destination_file(&path)
        .await
        .map_err(|e| Error::resource(format!("error creating file {}", path.display()), e))?;

    tracing::debug!(
        "Receiving {} ({} bytes) into {}",
        file_name,
        header.file_size(),
        path.display()
    );

    let mut share = progress.map(|tracker| tracker.join(header.file_size()));
    let outcome = receive_body(reader, &mut file, header.file_size(), &mut share).await;
    drop(share);
    drop(file);

    match outcome {
        Ok(checksum) => Ok(ReceivedFile {
            path,
            file_name,
            file_size: header.file_size(),
            checksum,
        }),
        Err(e) => {
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                tracing::error!(
                    "error occurred while removing incomplete file {}: {}",
                    path.display(),
                    remove_err
                );
            }
            Err(e)
        }
    }
}

async fn receive_body<R>(
    reader: &mut R,
    file: &mut File,
    size: u64,
    progress: &mut dyn ByteSink,
) -> Result<Checksum>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = StreamingMd5::new();
    copy_exact(reader, file, size, &mut Tee(&mut hasher, progress))
        .await
        .map_err(|failure| match failure {
            CopyFailure::Read(e) => Error::transport("io copy error", e),
            CopyFailure::Write(e) => Error::resource("error writing file", e),
            CopyFailure::Truncated { expected, received } => {
                Error::UnexpectedEof { expected, received }
            }
        })?;
    file.flush()
        .await
        .map_err(|e| Error::resource("error writing file", e))?;

    let computed = hasher.finish();
    let expected = read_checksum(reader).await?;
    if computed != expected {
        return Err(Error::Integrity {
            expected,
            actual: computed,
        });
    }
    Ok(computed)
}
