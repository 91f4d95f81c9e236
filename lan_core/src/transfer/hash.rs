use std::fmt;
use std::path::Path;

use md5::{Digest, Md5};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::constants::{CHECKSUM_LEN, MEDIUM_BUFFER_SIZE};
use super::copy::ByteSink;
use crate::error::{Error, Result};

/// MD5 digest of a file body.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; CHECKSUM_LEN]);

impl Checksum {
    pub fn from_bytes(bytes: [u8; CHECKSUM_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LEN] {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self)
    }
}

/// Running MD5 over the bytes of one transfer, in copy order.
#[derive(Default)]
pub struct StreamingMd5 {
    hasher: Md5,
}

impl StreamingMd5 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Checksum {
        let mut out = [0u8; CHECKSUM_LEN];
        out.copy_from_slice(&self.hasher.finalize());
        Checksum(out)
    }
}

impl ByteSink for StreamingMd5 {
    fn consume(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }
}

/// Compute the MD5 of a file on disk.
pub async fn compute_file_md5(path: &Path) -> Result<Checksum> {
    let mut file = File::open(path)
        .await
        .map_err(|e| Error::resource(format!("cannot open {}", path.display()), e))?;
    let mut hasher = StreamingMd5::new();
    let mut buffer = vec![0u8; MEDIUM_BUFFER_SIZE];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .map_err(|e| Error::resource(format!("cannot read {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.consume(&buffer[..n]);
    }

    Ok(hasher.finish())
}
