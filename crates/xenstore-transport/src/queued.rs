//! Adapter for backends that expose XenStore as method calls rather than a
//! byte stream (for example a management-interface session object).
//!
//! Requests sent through [`QueuedTransport`] are decoded into
//! [`MethodCall`]s and handed to a [`MethodBackend`]. Replies and watch
//! events are synthesized as packets and pass through a single-slot queue,
//! so `receive` still behaves as a blocking pull.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;
use xenstore_wire::{Operation, Packet, NUL};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// How long `receive` waits on the queue before re-checking for close.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long a producer backs off while the queue slot is occupied.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(1);

/// A request decoded from a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodCall {
    Read { path: String },
    Write { path: String, value: String },
    Directory { path: String },
    Mkdir { path: String },
    Remove { path: String },
    GetPermissions { path: String },
    SetPermissions { path: String, permissions: Vec<String> },
    GetDomainPath { domid: u32 },
    Watch { path: String, token: String },
    UnWatch { path: String, token: String },
}

impl MethodCall {
    /// Decode a request packet.
    ///
    /// Returns `None` for operations the adapter does not support and for
    /// payloads missing a required field.
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        let fields = request_fields(packet);
        let field = |idx: usize| fields.get(idx).cloned();

        let call = match packet.operation() {
            Operation::Read => Self::Read { path: field(0)? },
            Operation::Directory => Self::Directory { path: field(0)? },
            Operation::Mkdir => Self::Mkdir { path: field(0)? },
            Operation::Rm => Self::Remove { path: field(0)? },
            Operation::GetPermissions => Self::GetPermissions { path: field(0)? },
            Operation::Write => {
                let path = field(0)?;
                let value = fields.get(1..).map(|rest| rest.join("\0"))?;
                Self::Write { path, value }
            }
            Operation::SetPermissions => Self::SetPermissions {
                path: field(0)?,
                permissions: fields.get(1..)?.to_vec(),
            },
            Operation::GetDomainPath => Self::GetDomainPath {
                domid: field(0)?.parse().ok()?,
            },
            Operation::Watch => Self::Watch {
                path: field(0)?,
                token: field(1)?,
            },
            Operation::UnWatch => Self::UnWatch {
                path: field(0)?,
                token: field(1)?,
            },
            _ => return None,
        };
        Some(call)
    }
}

/// A successful backend result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodReply {
    /// A single string (read value, domain path, permissions).
    Text(String),
    /// A list of names (directory listing).
    List(Vec<String>),
    /// Acknowledgement of a mutating call.
    Ack,
}

/// A backend that services XenStore requests as method calls.
pub trait MethodBackend: Send {
    /// Service one call.
    ///
    /// Failures are returned as protocol error tokens (`"ENOENT"`, ...).
    /// Backends that accept a watch keep a clone of `events` to push watch
    /// events later.
    fn call(
        &mut self,
        call: MethodCall,
        events: &EventSink,
    ) -> std::result::Result<MethodReply, String>;

    /// Release the backend session. Called once, on the first `close`.
    fn end_session(&mut self) {}
}

/// Producer side of the transport's packet queue.
#[derive(Clone)]
pub struct EventSink {
    tx: SyncSender<Packet>,
    open: Arc<AtomicBool>,
}

impl EventSink {
    /// Queue a watch event for `token`.
    pub fn watch_event(&self, path: &str, token: &str) -> Result<()> {
        let payload = format!("{path}\0{token}");
        let packet = Packet::new(Operation::WatchEvent, 0, 0, payload)?;
        self.push(packet)
    }

    /// Queue a packet, waiting while the single slot is occupied.
    pub fn push(&self, mut packet: Packet) -> Result<()> {
        loop {
            if !self.open.load(Ordering::Acquire) {
                return Err(TransportError::Closed);
            }
            match self.tx.try_send(packet) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(returned)) => {
                    packet = returned;
                    std::thread::sleep(QUEUE_FULL_BACKOFF);
                }
                Err(TrySendError::Disconnected(_)) => return Err(TransportError::Closed),
            }
        }
    }
}

/// Transport adapting a [`MethodBackend`] to the packet contract.
pub struct QueuedTransport {
    backend: Mutex<Box<dyn MethodBackend>>,
    sink: EventSink,
    queue: Mutex<Receiver<Packet>>,
    open: Arc<AtomicBool>,
}

impl QueuedTransport {
    pub fn new(backend: impl MethodBackend + 'static) -> Self {
        let (tx, rx) = mpsc::sync_channel(1);
        let open = Arc::new(AtomicBool::new(true));
        Self {
            backend: Mutex::new(Box::new(backend)),
            sink: EventSink {
                tx,
                open: Arc::clone(&open),
            },
            queue: Mutex::new(rx),
            open,
        }
    }

    /// A handle for pushing packets into the receive queue.
    pub fn event_sink(&self) -> EventSink {
        self.sink.clone()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn reply_for(&self, request: &Packet) -> Result<Packet> {
        let outcome = match MethodCall::from_packet(request) {
            Some(call) => lock(&self.backend).call(call, &self.sink),
            None => Err("ENOSYS".to_string()),
        };

        let op = request.operation();
        let (rid, txid) = (request.request_id(), request.transaction_id());
        let reply = match outcome {
            Ok(MethodReply::Text(text)) => Packet::new(op, rid, txid, text),
            Ok(MethodReply::List(names)) => Packet::new(op, rid, txid, names.join("\0")),
            Ok(MethodReply::Ack) => Packet::new(op, rid, txid, "OK"),
            Err(token) => Packet::new(Operation::Error, rid, txid, token),
        };

        match reply {
            Ok(packet) => Ok(packet),
            Err(_) => Ok(Packet::new(Operation::Error, rid, txid, "E2BIG")?),
        }
    }
}

impl Transport for QueuedTransport {
    fn send(&self, packet: &Packet) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::UseAfterClose);
        }

        let reply = self.reply_for(packet)?;
        self.sink.push(reply)
    }

    fn receive(&self) -> Result<Packet> {
        if !self.is_open() {
            return Err(TransportError::UseAfterClose);
        }

        let queue = lock(&self.queue);
        loop {
            match queue.recv_timeout(QUEUE_POLL_INTERVAL) {
                Ok(packet) => return Ok(packet),
                Err(RecvTimeoutError::Timeout) if self.is_open() => continue,
                Err(_) => return Err(TransportError::Closed),
            }
        }
    }

    fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        debug!("ending method-call backend session");
        lock(&self.backend).end_session();
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "method-call"
    }
}

impl std::fmt::Debug for QueuedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedTransport")
            .field("open", &self.is_open())
            .finish()
    }
}

/// Request payload fields without the terminator's trailing empty field.
fn request_fields(packet: &Packet) -> Vec<String> {
    let payload = packet.payload.as_ref();
    let payload = payload.strip_suffix(&[NUL]).unwrap_or(payload);
    payload
        .split(|b| *b == NUL)
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect()
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
