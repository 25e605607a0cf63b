use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::warn;

use crate::codec::{decode_packet, Packet, PacketHeader, HEADER_SIZE};
use crate::error::{Result, WireError};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete packets from any `Read` stream.
///
/// Handles partial reads internally, so callers always get whole packets.
/// A stream that ends part way through a payload yields the bytes that did
/// arrive rather than an error.
pub struct PacketReader<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Read> PacketReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Read the next packet (blocking).
    ///
    /// Returns `Err(WireError::ConnectionClosed)` when EOF is reached before
    /// a full header.
    pub fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some(packet) = decode_packet(&mut self.buf)? {
                return Ok(packet);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            };

            if read == 0 {
                return self.take_truncated();
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    fn take_truncated(&mut self) -> Result<Packet> {
        if self.buf.len() < HEADER_SIZE {
            return Err(WireError::ConnectionClosed);
        }

        let header = PacketHeader::decode(&self.buf[..HEADER_SIZE]);
        let _ = self.buf.split_to(HEADER_SIZE);
        let payload = self.buf.split().freeze();
        let header = header?;
        warn!(
            operation = %header.operation,
            request_id = header.request_id,
            expected = header.payload_len,
            received = payload.len(),
            "stream ended inside payload; returning truncated packet"
        );
        Ok(Packet::from_wire(header, payload))
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
