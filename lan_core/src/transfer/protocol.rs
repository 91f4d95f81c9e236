//! Wire format of a single-file transfer.
//!
//! ```text
//! [1 byte: name length N][N bytes: name, UTF-8]
//! [8 bytes: body size, big-endian u64]
//! [body, exactly `size` bytes]
//! [16 bytes: MD5 of the body]
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::{CHECKSUM_LEN, MAX_FILENAME_LENGTH};
use super::hash::Checksum;
use crate::error::{Error, Result};

/// Metadata that precedes the body on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    file_name: String,
    file_size: u64,
}

impl TransferHeader {
    /// Fails with [`Error::FileNameTooLong`] when the name does not fit the
    /// one-byte length field.
    pub fn new(file_name: impl Into<String>, file_size: u64) -> Result<Self> {
        let file_name = file_name.into();
        if file_name.len() > MAX_FILENAME_LENGTH {
            return Err(Error::FileNameTooLong(file_name.len()));
        }
        Ok(Self {
            file_name,
            file_size,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Serialized header bytes.
    pub fn encode(&self) -> Vec<u8> {
        let name = self.file_name.as_bytes();
        let mut out = Vec::with_capacity(1 + name.len() + 8);
        // Length checked in `new`.
        out.push(name.len() as u8);
        out.extend_from_slice(name);
        out.extend_from_slice(&self.file_size.to_be_bytes());
        out
    }

    /// Write the header fields in order and flush before the body starts.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        writer
            .write_all(&self.encode())
            .await
            .map_err(|e| Error::transport("sending file header", e))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::transport("flushing file header", e))
    }

    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let name_len = reader
            .read_u8()
            .await
            .map_err(|e| Error::transport("error reading file name length", e))?;

        let mut name = vec![0u8; name_len as usize];
        reader
            .read_exact(&mut name)
            .await
            .map_err(|e| Error::transport("error reading file name", e))?;
        let file_name = String::from_utf8(name)
            .map_err(|_| Error::Protocol("file name is not valid UTF-8".to_string()))?;

        let file_size = reader
            .read_u64()
            .await
            .map_err(|e| Error::transport("error reading file size", e))?;

        Ok(Self {
            file_name,
            file_size,
        })
    }
}

pub async fn write_checksum<W>(writer: &mut W, checksum: &Checksum) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer
        .write_all(checksum.as_bytes())
        .await
        .map_err(|e| Error::transport("sending file md5", e))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::transport("flushing file md5", e))
}

pub async fn read_checksum<R>(reader: &mut R) -> Result<Checksum>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut bytes = [0u8; CHECKSUM_LEN];
    reader
        .read_exact(&mut bytes)
        .await
        .map_err(|e| Error::transport("error reading file md5", e))?;
    Ok(Checksum::from_bytes(bytes))
}
