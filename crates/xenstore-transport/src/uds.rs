use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use tracing::debug;
use xenstore_wire::Packet;

use crate::error::{Result, TransportError};
use crate::stream::StreamTransport;
use crate::traits::Transport;

/// Transport to `xenstored` over its Unix domain socket.
pub struct UnixSocketTransport {
    inner: StreamTransport<UnixStream>,
    path: PathBuf,
}

impl UnixSocketTransport {
    /// Connect to the xenstored socket at `path` (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(?path, "connected to xenstored socket");
        Self::from_stream(stream, path)
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream, path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            inner: StreamTransport::new(stream, "unix-socket")?,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// The socket path this transport is connected to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for UnixSocketTransport {
    fn send(&self, packet: &Packet) -> Result<()> {
        self.inner.send(packet)
    }

    fn receive(&self) -> Result<Packet> {
        self.inner.receive()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }

    fn transport_name(&self) -> &'static str {
        self.inner.transport_name()
    }
}

impl std::fmt::Debug for UnixSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixSocketTransport")
            .field("path", &self.path)
            .field("open", &self.inner.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixListener;
    use std::thread;

    use xenstore_wire::{Operation, PacketReader, PacketWriter};

    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "xenstore-uds-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_connect_and_exchange() {
        let dir = temp_dir("exchange");
        let sock_path = dir.join("socket");
        let listener = UnixListener::bind(&sock_path).unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = PacketReader::new(stream.try_clone().unwrap());
            let mut writer = PacketWriter::new(stream);
            let request = reader.read_packet().unwrap();
            let reply = Packet::new(
                request.operation(),
                request.request_id(),
                0,
                b"Domain-0",
            )
            .unwrap();
            writer.write_packet(&reply).unwrap();
        });

        let transport = UnixSocketTransport::connect(&sock_path).unwrap();
        assert_eq!(transport.path(), sock_path.as_path());
        assert_eq!(transport.transport_name(), "unix-socket");

        transport
            .send(&Packet::new(Operation::Read, 12, 0, b"/local/domain/0/name").unwrap())
            .unwrap();
        let reply = transport.receive().unwrap();
        assert_eq!(reply.request_id(), 12);
        assert_eq!(reply.payload_text(), "Domain-0");

        server.join().unwrap();
        transport.close().unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_connect_missing_socket() {
        let dir = temp_dir("missing");
        let result = UnixSocketTransport::connect(dir.join("absent"));
        assert!(matches!(result, Err(TransportError::Connect { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
