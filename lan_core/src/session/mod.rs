//! Start/stop lifecycle for each role.
//!
//! A session owns its peer list, cancellation tokens and task handles; nothing
//! here is process-global, so several sessions can coexist (and do, in tests).

mod receiver;
mod sender;

pub use receiver::ReceiverSession;
pub use sender::{OutboundTransfer, SenderSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Running,
}
