//! Live watch handles.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::debug;
use xenstore_wire::{Operation, Packet};

use crate::error::{ClientError, Result, StoreError};
use crate::router::{Delivery, Router};

/// One change notification from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// The path that changed (may be a descendant of the watched path).
    pub path: String,
    /// The token the watch was registered with.
    pub token: String,
}

impl WatchEvent {
    /// Parse a `WATCH_EVENT` packet (`path\0token\0`).
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        if packet.operation() != Operation::WatchEvent {
            return Err(ClientError::Malformed(format!(
                "expected WATCH_EVENT, got {}",
                packet.operation()
            )));
        }

        let mut fields = packet.payload_fields().into_iter();
        match (fields.next(), fields.next()) {
            (Some(path), Some(token)) if !token.is_empty() => Ok(Self { path, token }),
            _ => Err(ClientError::Malformed(
                "watch event without token".to_string(),
            )),
        }
    }
}

/// An established watch.
///
/// Created by [`Client::watch`](crate::Client::watch). Events arrive in the
/// order the backend sent them until the watch is removed with
/// [`Client::unwatch`](crate::Client::unwatch) or the client is closed, at
/// which point `recv` returns [`ClientError::Stopped`] and iteration ends.
#[derive(Debug)]
pub struct Watch {
    path: String,
    token: String,
    delivery: Delivery,
    early: VecDeque<WatchEvent>,
}

impl Watch {
    /// Wait for the backend to acknowledge the watch request.
    ///
    /// Events that arrive before the acknowledgement are kept and returned
    /// first. An error acknowledgement removes the registration and is
    /// returned as a [`StoreError`].
    pub(crate) fn establish(
        router: &Router,
        delivery: Delivery,
        path: &str,
        token: &str,
    ) -> Result<Self> {
        let mut early = VecDeque::new();

        loop {
            let packet = delivery.recv()?;
            if packet.operation() == Operation::WatchEvent {
                early.push_back(WatchEvent::from_packet(&packet)?);
                continue;
            }

            if let Some(err) = packet.error_token() {
                router.remove_watch_listener(token, delivery.request_id());
                return Err(StoreError::from_token(&err).into());
            }

            debug!(path, token, "watch established");
            return Ok(Self {
                path: path.to_string(),
                token: token.to_string(),
                delivery,
                early,
            });
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Block until the next event.
    pub fn recv(&mut self) -> Result<WatchEvent> {
        if let Some(event) = self.early.pop_front() {
            return Ok(event);
        }
        WatchEvent::from_packet(&self.delivery.recv()?)
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<WatchEvent>> {
        if let Some(event) = self.early.pop_front() {
            return Ok(Some(event));
        }
        self.delivery
            .recv_timeout(timeout)?
            .map(|packet| WatchEvent::from_packet(&packet))
            .transpose()
    }

    /// Take the next event if one is already waiting.
    pub fn try_recv(&mut self) -> Result<Option<WatchEvent>> {
        if let Some(event) = self.early.pop_front() {
            return Ok(Some(event));
        }
        self.delivery
            .try_recv()?
            .map(|packet| WatchEvent::from_packet(&packet))
            .transpose()
    }
}

impl Iterator for Watch {
    type Item = WatchEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv().ok()
    }
}
