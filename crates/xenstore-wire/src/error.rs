/// Errors that can occur while building, encoding or decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The logical payload exceeds the protocol maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A frame carried an operation code this implementation does not know.
    ///
    /// The whole frame has already been consumed, so the stream stays in
    /// sync and the next read continues with the following packet.
    #[error(
        "skipped frame with unknown operation code {code:#x} \
         (request {request_id}, {payload_len} payload bytes)"
    )]
    UnknownOperation {
        code: u32,
        request_id: u32,
        payload_len: u32,
    },

    /// An I/O error occurred while reading or writing packets.
    #[error("wire I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete header was received.
    #[error("connection closed (incomplete header)")]
    ConnectionClosed,
}

impl WireError {
    /// True when the offending frame was consumed and the stream can still
    /// be read.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownOperation { .. })
    }
}

pub type Result<T> = std::result::Result<T, WireError>;
