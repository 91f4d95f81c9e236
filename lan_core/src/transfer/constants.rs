/// Default base port; TCP transfer on `P`, discovery on `P + 1`, stop signal on `P + 2`.
pub const DEFAULT_PORT: u16 = 32000;

/// The file-name length travels in a single byte.
pub const MAX_FILENAME_LENGTH: usize = u8::MAX as usize;

/// MD5 digest length, sent after the file body.
pub const CHECKSUM_LEN: usize = 16;

/// Copy buffer tiers, chosen by file size.
pub const SMALL_BUFFER_SIZE: usize = 1024;
pub const MEDIUM_BUFFER_SIZE: usize = 128 * 1024;
pub const LARGE_BUFFER_SIZE: usize = 16 * 1024 * 1024;

pub const SMALL_FILE_LIMIT: u64 = 64 * 1024;
pub const MEDIUM_FILE_LIMIT: u64 = 8 * 1024 * 1024;

/// Payload of the out-of-band cancel datagram sent to `P + 2`.
pub const STOP_SIGNAL_PAYLOAD: &[u8] = b"stop";
