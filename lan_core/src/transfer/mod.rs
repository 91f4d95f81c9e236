//! Single-file TCP transfer.
//!
//! This module provides:
//! - The wire header and trailing MD5 (`protocol`)
//! - A bounded copy that hashes and counts as it writes (`copy`)
//! - Send and receive codecs (`sender`, `receiver`)
//! - The receiver's accept loop (`server`)

pub mod constants;
pub mod copy;
pub mod hash;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod utils;

// Re-export public API
pub use constants::DEFAULT_PORT;
pub use hash::Checksum;
pub use protocol::TransferHeader;
pub use receiver::{ReceivedFile, receive_file};
pub use sender::{SendSummary, send_file};
pub use server::run_accept_loop;
