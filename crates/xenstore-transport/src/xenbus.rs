use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;
use xenstore_wire::Packet;

use crate::error::{Result, TransportError};
use crate::stream::StreamTransport;
use crate::traits::{DuplexStream, Transport};

/// How long a read waits on the device before re-checking for shutdown.
const POLL_INTERVAL_MS: libc::c_int = 100;

/// Handle to the XenBus character device.
///
/// Device files cannot be shut down the way sockets can, so reads poll the
/// descriptor and report end-of-stream once any handle has been shut down.
pub struct XenBusDevice {
    file: File,
    shut_down: Arc<AtomicBool>,
}

impl XenBusDevice {
    /// Wrap an open device file.
    pub fn from_file(file: File) -> Self {
        Self {
            file,
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }

    fn wait_readable(&self) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        // SAFETY: `pfd` is a valid, writable pollfd and the count is 1. The
        // descriptor stays open for the lifetime of `self.file`.
        let rc = unsafe { libc::poll(&mut pfd, 1, POLL_INTERVAL_MS) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(rc > 0)
    }
}

impl Read for XenBusDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.shut_down.load(Ordering::Acquire) {
                return Ok(0);
            }

            match self.wait_readable() {
                Ok(true) => return self.file.read(buf),
                Ok(false) => continue,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

impl Write for XenBusDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl DuplexStream for XenBusDevice {
    fn try_clone_stream(&self) -> io::Result<Self> {
        Ok(Self {
            file: self.file.try_clone()?,
            shut_down: Arc::clone(&self.shut_down),
        })
    }

    fn shutdown_stream(&self) -> io::Result<()> {
        self.shut_down.store(true, Ordering::Release);
        Ok(())
    }
}

/// Transport over the XenBus device (`/dev/xen/xenbus` and friends).
pub struct XenBusTransport {
    inner: StreamTransport<XenBusDevice>,
    path: PathBuf,
}

impl XenBusTransport {
    /// Open the XenBus device at `path` for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| TransportError::Open {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(?path, "opened xenbus device");
        Self::from_file(file, path)
    }

    /// Wrap an already opened device file.
    pub fn from_file(file: File, path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            inner: StreamTransport::new(XenBusDevice::from_file(file), "xenbus")?,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// The device path this transport was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for XenBusTransport {
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

impl std::fmt::Debug for XenBusTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XenBusTransport")
            .field("path", &self.path)
            .field("open", &self.inner.is_open())
            .finish()
    }
}
