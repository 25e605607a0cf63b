//! Named store operations on top of a [`Router`].

#[cfg(unix)]
use std::path::Path;
use std::sync::Arc;

use tracing::debug;
use xenstore_transport::Transport;
#[cfg(unix)]
use xenstore_transport::{UnixSocketTransport, XenBusTransport};
use xenstore_wire::{Operation, Packet, NUL};

#[cfg(unix)]
use crate::config::{Backend, ConnectConfig};
use crate::error::{ClientError, Result, StoreError};
use crate::router::{DiagnosticSink, Router, TracingSink};
use crate::watch::Watch;

/// A connected XenStore client.
///
/// Every method takes `&self`; one client can be shared between threads and
/// their requests are multiplexed over the single connection.
pub struct Client {
    transport: Arc<dyn Transport>,
    router: Router,
}

impl Client {
    /// Start a client over an already open transport.
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self> {
        Self::with_diagnostics(transport, Arc::new(TracingSink::default()))
    }

    /// Like [`Client::new`], reporting unroutable packets to `diagnostics`.
    pub fn with_diagnostics(
        transport: Arc<dyn Transport>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        let router = Router::start(Arc::clone(&transport), diagnostics)?;
        Ok(Self { transport, router })
    }

    #[cfg(unix)]
    pub fn connect(config: &ConnectConfig) -> Result<Self> {
        match &config.backend {
            Backend::UnixSocket(path) => Self::connect_unix_socket(path),
            Backend::XenBus(path) => Self::connect_xenbus(path),
        }
    }

    /// Connect to the xenstored Unix socket at `path`.
    #[cfg(unix)]
    pub fn connect_unix_socket(path: impl AsRef<Path>) -> Result<Self> {
        let transport = UnixSocketTransport::connect(path)?;
        Self::new(Arc::new(transport))
    }

    /// Connect through the XenBus device at `path`.
    #[cfg(unix)]
    pub fn connect_xenbus(path: impl AsRef<Path>) -> Result<Self> {
        let transport = XenBusTransport::open(path)?;
        Self::new(Arc::new(transport))
    }

    /// Send one request and wait for its reply. Error replies become
    /// [`StoreError`]s.
    fn submit(&self, operation: Operation, payload: &[u8]) -> Result<Packet> {
        let packet = Packet::new(operation, self.router.next_request_id(), 0, payload)?;
        let delivery = self.router.send(&packet)?;
        let reply = delivery.recv()?;

        match reply.error_token() {
            Some(token) => {
                debug!(%operation, %token, "request rejected");
                Err(StoreError::from_token(&token).into())
            }
            None => Ok(reply),
        }
    }

    /// Read the value stored at `path`.
    pub fn read(&self, path: &str) -> Result<String> {
        Ok(self.submit(Operation::Read, path.as_bytes())?.payload_text())
    }

    /// Store `value` at `path`. Returns the backend's acknowledgement.
    pub fn write(&self, path: &str, value: &str) -> Result<String> {
        let payload = fields(&[path, value]);
        Ok(self.submit(Operation::Write, &payload)?.payload_text())
    }

    /// List the children of `path`.
    ///
    /// The reply is split on every NUL, so the terminating NUL yields a
    /// trailing empty entry.
    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        Ok(self
            .submit(Operation::Directory, path.as_bytes())?
            .payload_fields())
    }

    /// Remove `path` and everything below it.
    pub fn remove(&self, path: &str) -> Result<String> {
        Ok(self.submit(Operation::Rm, path.as_bytes())?.payload_text())
    }

    /// Create `path` with an empty value if it does not exist.
    pub fn mkdir(&self, path: &str) -> Result<String> {
        Ok(self.submit(Operation::Mkdir, path.as_bytes())?.payload_text())
    }

    pub fn get_permissions(&self, path: &str) -> Result<String> {
        Ok(self
            .submit(Operation::GetPermissions, path.as_bytes())?
            .payload_text())
    }

    /// Replace the permissions of `path`. Each entry is a permission spec
    /// such as `n0` or `r5`.
    pub fn set_permissions(&self, path: &str, permissions: &[&str]) -> Result<String> {
        let mut parts = Vec::with_capacity(permissions.len() + 1);
        parts.push(path);
        parts.extend_from_slice(permissions);
        Ok(self
            .submit(Operation::SetPermissions, &fields(&parts))?
            .payload_text())
    }

    /// Home path of domain `domid`, e.g. `/local/domain/3`.
    pub fn get_domain_path(&self, domid: u32) -> Result<String> {
        Ok(self
            .submit(Operation::GetDomainPath, domid.to_string().as_bytes())?
            .payload_text())
    }

    /// Watch `path` (and everything below it) under `token`.
    ///
    /// Returns once the backend has acknowledged the watch.
    pub fn watch(&self, path: &str, token: &str) -> Result<Watch> {
        let packet = Packet::new(
            Operation::Watch,
            self.router.next_request_id(),
            0,
            fields(&[path, token]),
        )?;
        let delivery = self.router.send(&packet)?;
        Watch::establish(&self.router, delivery, path, token)
    }

    /// Remove the watch on `path` registered under `token`.
    ///
    /// Every local listener for `token` is dropped once the backend
    /// acknowledges.
    pub fn unwatch(&self, path: &str, token: &str) -> Result<()> {
        self.submit(Operation::UnWatch, &fields(&[path, token]))?;
        self.router.remove_watch(token);
        Ok(())
    }

    /// Stop the router, close the transport and wait for the receive loop.
    ///
    /// Returns the loop's terminal error if it ended for any reason other
    /// than this shutdown. Calling `close` again is a no-op.
    pub fn close(&self) -> Result<()> {
        self.router.stop();
        let closed = self.transport.close();
        self.router.join()?;
        closed.map_err(ClientError::from)
    }

    /// The underlying router.
    pub fn router(&self) -> &Router {
        &self.router
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!(error = %err, "error while closing client");
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport.transport_name())
            .field("router", &self.router)
            .finish()
    }
}

fn fields(parts: &[&str]) -> Vec<u8> {
    let mut payload = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            payload.push(NUL);
        }
        payload.extend_from_slice(part.as_bytes());
    }
    payload
}
