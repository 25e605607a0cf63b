use std::path::PathBuf;

use xenstore_wire::WireError;

/// Errors that can occur in XenStore transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the xenstored socket.
    #[error("failed to connect to {}: {source}", .path.display())]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to open the XenBus device.
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport outside of packet framing.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A packet could not be encoded or decoded.
    #[error("transport wire error: {0}")]
    Wire(#[from] WireError),

    /// The backend closed the connection.
    #[error("backend disconnected")]
    Disconnected,

    /// `send` or `receive` was called after `close`.
    #[error("transport used after close")]
    UseAfterClose,

    /// A blocked `receive` was released because the transport was closed.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// True for the error a pending `receive` returns when the transport is
    /// closed from another thread. This is the expected shutdown path.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// True when a received frame was skipped but the transport is still
    /// usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Wire(err) if err.is_recoverable())
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
