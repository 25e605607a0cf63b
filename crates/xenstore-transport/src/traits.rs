use std::io::{Read, Write};

use xenstore_wire::Packet;

use crate::error::Result;

/// Sends and receives whole packets to and from a XenStore backend.
///
/// One transport is shared between the thread that receives (the router's
/// background loop) and any number of threads that send, so every method
/// takes `&self`.
pub trait Transport: Send + Sync {
    /// Send one packet to the backend.
    fn send(&self, packet: &Packet) -> Result<()>;

    /// Receive the next packet from the backend (blocking).
    ///
    /// When the transport is closed from another thread a blocked call
    /// returns [`TransportError::Closed`](crate::TransportError::Closed).
    fn receive(&self) -> Result<Packet>;

    /// Close the transport. Closing twice is a no-op.
    fn close(&self) -> Result<()>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

/// A bidirectional byte stream that a [`StreamTransport`](crate::StreamTransport)
/// can split into independent read and write handles.
pub trait DuplexStream: Read + Write + Send + Sized {
    /// Create another handle to the same underlying stream.
    fn try_clone_stream(&self) -> std::io::Result<Self>;

    /// Release any read blocked on another handle to this stream.
    fn shutdown_stream(&self) -> std::io::Result<()>;
}

#[cfg(unix)]
impl DuplexStream for std::os::unix::net::UnixStream {
    fn try_clone_stream(&self) -> std::io::Result<Self> {
        self.try_clone()
    }

    fn shutdown_stream(&self) -> std::io::Result<()> {
        match self.shutdown(std::net::Shutdown::Both) {
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}
