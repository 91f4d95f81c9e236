//! Error taxonomy for discovery, transfer and session operations.
//!
//! Every failure is terminal for the attempted operation and is reported
//! exactly once. [`Error::kind`] groups the variants so callers can tell an
//! intentional close apart from a genuine failure without inspecting text.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::transfer::hash::Checksum;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("invalid path {path:?}: {source}")]
    InvalidPath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0:?} is not a folder")]
    NotADirectory(PathBuf),

    #[error("{0:?} is not a file")]
    NotAFile(PathBuf),

    #[error("file name too long: {0} bytes (max 255)")]
    FileNameTooLong(usize),

    #[error("port {0} leaves no room for the discovery and stop-signal ports")]
    PortOutOfRange(u16),

    #[error("{context}: {source}")]
    Resource {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("unexpected end of stream: received {received} of {expected} bytes")]
    UnexpectedEof { expected: u64, received: u64 },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("file md5 verification failed: expected {expected}, computed {actual}")]
    Integrity { expected: Checksum, actual: Checksum },

    #[error("connection closed")]
    Closed,

    #[error("repeated start")]
    RepeatedStart,

    #[error("repeated stop")]
    RepeatedStop,

    #[error("a file transfer is already in progress")]
    TransferInProgress,

    #[error("no file transfer in progress")]
    NoActiveTransfer,
}

/// Coarse classification used for logging and by callers that only need to
/// know which branch of the taxonomy they are in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Resource,
    Transport,
    Protocol,
    Integrity,
    Closed,
    State,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidFormat(_)
            | Error::InvalidPath { .. }
            | Error::NotADirectory(_)
            | Error::NotAFile(_)
            | Error::FileNameTooLong(_)
            | Error::PortOutOfRange(_) => ErrorKind::Validation,
            Error::Resource { .. } => ErrorKind::Resource,
            Error::Transport { .. } | Error::UnexpectedEof { .. } => ErrorKind::Transport,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Integrity { .. } => ErrorKind::Integrity,
            Error::Closed => ErrorKind::Closed,
            Error::RepeatedStart
            | Error::RepeatedStop
            | Error::TransferInProgress
            | Error::NoActiveTransfer => ErrorKind::State,
        }
    }

    /// True when the operation ended because its socket was closed on purpose.
    pub fn is_closed(&self) -> bool {
        self.kind() == ErrorKind::Closed
    }

    pub(crate) fn resource(context: impl Into<String>, source: io::Error) -> Self {
        Error::Resource {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn transport(context: impl Into<String>, source: io::Error) -> Self {
        Error::Transport {
            context: context.into(),
            source,
        }
    }
}
