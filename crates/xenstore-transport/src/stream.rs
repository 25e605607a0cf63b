use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;
use xenstore_wire::{Packet, PacketReader, PacketWriter, WireError};

use crate::error::{Result, TransportError};
use crate::traits::{DuplexStream, Transport};

/// Packet transport over any [`DuplexStream`].
///
/// The stream is split into a read handle, a write handle and a control
/// handle, so a send never waits behind a receive that is blocked on the
/// backend. `close` shuts the control handle down, which releases a
/// blocked receive with [`TransportError::Closed`].
pub struct StreamTransport<S> {
    reader: Mutex<PacketReader<S>>,
    writer: Mutex<PacketWriter<S>>,
    control: Mutex<S>,
    open: AtomicBool,
    name: &'static str,
}

impl<S: DuplexStream> StreamTransport<S> {
    /// Wrap a connected stream. `name` is reported by `transport_name`.
    pub fn new(stream: S, name: &'static str) -> Result<Self> {
        let reader_stream = stream.try_clone_stream()?;
        let control = stream.try_clone_stream()?;

        Ok(Self {
            reader: Mutex::new(PacketReader::new(reader_stream)),
            writer: Mutex::new(PacketWriter::new(stream)),
            control: Mutex::new(control),
            open: AtomicBool::new(true),
            name,
        })
    }

    /// Whether `close` has not been called yet.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl<S: DuplexStream> Transport for StreamTransport<S> {
    fn send(&self, packet: &Packet) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::UseAfterClose);
        }

        lock(&self.writer).write_packet(packet).map_err(|err| {
            if self.is_open() {
                TransportError::Wire(err)
            } else {
                TransportError::Closed
            }
        })
    }

    fn receive(&self) -> Result<Packet> {
        if !self.is_open() {
            return Err(TransportError::UseAfterClose);
        }

        match lock(&self.reader).read_packet() {
            Ok(packet) => Ok(packet),
            Err(_) if !self.is_open() => Err(TransportError::Closed),
            Err(WireError::ConnectionClosed) => Err(TransportError::Disconnected),
            Err(err) => Err(TransportError::Wire(err)),
        }
    }

    fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        debug!(transport = self.name, "closing transport");
        lock(&self.control).shutdown_stream()?;
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        self.name
    }
}

impl<S> std::fmt::Debug for StreamTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("name", &self.name)
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
