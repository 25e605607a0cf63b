//! Request/reply correlation and watch fan-out over one shared transport.
//!
//! A [`Router`] owns a background thread that pulls packets from the
//! transport and routes them:
//! - replies go to the one-shot slot registered under their request id
//! - `WATCH_EVENT` packets go to every listener registered for their token
//!
//! The table lock is held only for bookkeeping, never across transport I/O
//! or delivery.
//!
//! # Shutdown
//!
//! [`Router::stop`] only sets a flag. A loop parked inside
//! `Transport::receive` cannot observe it, so the owner must also close the
//! transport; the receive then fails with the shutdown error and the loop
//! exits. When the loop exits every outstanding slot is dropped, so callers
//! still waiting on a [`Delivery`] get [`ClientError::Stopped`].
//!
//! There are no per-request timeouts: a delivery waits until its reply
//! arrives or the router stops.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, warn};
use xenstore_transport::{Transport, TransportError};
use xenstore_wire::{Operation, Packet, WireError};

use crate::error::{ClientError, Result};

const STATE_RUNNING: u8 = 0;
const STATE_STOP_REQUESTED: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Lifecycle of a router. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    /// The receive loop is running and new requests are accepted.
    Running,
    /// `stop` was called; the loop exits after its current receive returns.
    StopRequested,
    /// The loop has exited. Nothing more is delivered.
    Stopped,
}

/// A packet the router received but could not route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchViolation {
    /// A reply whose request id has no registered slot.
    UnknownRequest { request_id: u32, operation: Operation },
    /// A watch event for a token with no registered listener.
    UnknownWatchToken { token: String },
    /// A watch event without a token field.
    MalformedWatchEvent { payload_len: usize },
    /// A frame whose operation code is not part of the protocol.
    UnknownOperation { code: u32, request_id: u32 },
}

impl fmt::Display for DispatchViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRequest {
                request_id,
                operation,
            } => write!(f, "no pending request {request_id} for {operation} reply"),
            Self::UnknownWatchToken { token } => {
                write!(f, "no watch listener for token '{token}'")
            }
            Self::MalformedWatchEvent { payload_len } => {
                write!(f, "watch event without token ({payload_len} payload bytes)")
            }
            Self::UnknownOperation { code, request_id } => {
                write!(f, "unknown operation {code:#x} for request {request_id}")
            }
        }
    }
}

/// Receives dispatch violations. The offending packet is dropped after the
/// sink returns and the loop keeps running.
pub trait DiagnosticSink: Send + Sync {
    fn dispatch_violation(&self, violation: &DispatchViolation);
}

/// Default sink: logs a warning and counts violations.
#[derive(Debug, Default)]
pub struct TracingSink {
    violations: AtomicU64,
}

impl TracingSink {
    /// Number of violations reported so far.
    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }
}

impl DiagnosticSink for TracingSink {
    fn dispatch_violation(&self, violation: &DispatchViolation) {
        let total = self.violations.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(%violation, total, "dropping unroutable packet");
    }
}

/// Read side of a delivery slot.
#[derive(Debug)]
pub struct Delivery {
    rx: Receiver<Packet>,
    request_id: u32,
}

impl Delivery {
    /// The request id this delivery was registered under.
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Wait for the next packet.
    pub fn recv(&self) -> Result<Packet> {
        self.rx.recv().map_err(|_| ClientError::Stopped)
    }

    /// Wait up to `timeout` for the next packet.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Packet>> {
        match self.rx.recv_timeout(timeout) {
            Ok(packet) => Ok(Some(packet)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ClientError::Stopped),
        }
    }

    /// Take the next packet if one is already waiting.
    pub fn try_recv(&self) -> Result<Option<Packet>> {
        match self.rx.try_recv() {
            Ok(packet) => Ok(Some(packet)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ClientError::Stopped),
        }
    }
}

enum ReplySlot {
    OneShot(SyncSender<Packet>),
    Watch(Sender<Packet>),
}

struct WatchListener {
    request_id: u32,
    tx: Sender<Packet>,
}

#[derive(Default)]
struct Tables {
    replies: HashMap<u32, ReplySlot>,
    watches: HashMap<String, Vec<WatchListener>>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    tables: Mutex<Tables>,
    state: AtomicU8,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl Shared {
    fn state(&self) -> RouterState {
        match self.state.load(Ordering::Acquire) {
            STATE_RUNNING => RouterState::Running,
            STATE_STOP_REQUESTED => RouterState::StopRequested,
            _ => RouterState::Stopped,
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) -> std::result::Result<(), TransportError> {
        debug!(transport = self.transport.transport_name(), "router started");

        let result = loop {
            if self.state() != RouterState::Running {
                break Ok(());
            }

            match self.transport.receive() {
                Ok(packet) => self.dispatch(packet),
                Err(err) if err.is_shutdown() => break Ok(()),
                Err(TransportError::Wire(WireError::UnknownOperation {
                    code, request_id, ..
                })) => self.violation(DispatchViolation::UnknownOperation { code, request_id }),
                Err(err) if self.state() != RouterState::Running => {
                    debug!(error = %err, "receive failed after stop; exiting");
                    break Ok(());
                }
                Err(err) => {
                    error!(error = %err, "router receive loop failed");
                    break Err(err);
                }
            }
        };

        self.finish();
        debug!("router stopped");
        result
    }

    fn finish(&self) {
        let mut tables = self.tables();
        self.state.store(STATE_STOPPED, Ordering::Release);
        let pending = tables.replies.len();
        tables.replies.clear();
        tables.watches.clear();
        if pending > 0 {
            debug!(pending, "dropping pending requests on shutdown");
        }
    }

    fn dispatch(&self, packet: Packet) {
        if packet.operation() == Operation::WatchEvent {
            self.dispatch_watch_event(packet);
        } else {
            self.dispatch_reply(packet);
        }
    }

    fn dispatch_watch_event(&self, packet: Packet) {
        let fields = packet.payload_fields();
        let Some(token) = fields.get(1).filter(|t| !t.is_empty()) else {
            self.violation(DispatchViolation::MalformedWatchEvent {
                payload_len: packet.payload.len(),
            });
            return;
        };

        let listeners: Option<Vec<(u32, Sender<Packet>)>> = self
            .tables()
            .watches
            .get(token)
            .map(|list| list.iter().map(|l| (l.request_id, l.tx.clone())).collect());

        let Some(listeners) = listeners else {
            self.violation(DispatchViolation::UnknownWatchToken {
                token: token.clone(),
            });
            return;
        };

        let dropped: Vec<u32> = listeners
            .into_iter()
            .filter(|(_, tx)| tx.send(packet.clone()).is_err())
            .map(|(request_id, _)| request_id)
            .collect();

        if !dropped.is_empty() {
            debug!(token = %token, count = dropped.len(), "pruning dropped watch listeners");
            self.prune_listeners(token, &dropped);
        }
    }

    fn prune_listeners(&self, token: &str, request_ids: &[u32]) {
        let mut tables = self.tables();
        if let Some(list) = tables.watches.get_mut(token) {
            list.retain(|l| !request_ids.contains(&l.request_id));
            if list.is_empty() {
                tables.watches.remove(token);
            }
        }
    }

    fn dispatch_reply(&self, packet: Packet) {
        let request_id = packet.request_id();
        let slot = self.tables().replies.remove(&request_id);

        let delivered = match slot {
            Some(ReplySlot::OneShot(tx)) => tx.try_send(packet).is_ok(),
            Some(ReplySlot::Watch(tx)) => tx.send(packet).is_ok(),
            None => {
                self.violation(DispatchViolation::UnknownRequest {
                    request_id,
                    operation: packet.operation(),
                });
                return;
            }
        };

        if !delivered {
            debug!(request_id, "caller dropped its delivery before the reply");
        }
    }

    fn violation(&self, violation: DispatchViolation) {
        self.diagnostics.dispatch_violation(&violation);
    }
}

/// Routes replies and watch events from one transport to waiting callers.
pub struct Router {
    shared: Arc<Shared>,
    next_request_id: AtomicU32,
    worker: Mutex<Option<JoinHandle<std::result::Result<(), TransportError>>>>,
}

impl Router {
    /// Create a router for `transport` and start its receive loop on a
    /// dedicated thread.
    pub fn start(
        transport: Arc<dyn Transport>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            transport,
            tables: Mutex::new(Tables::default()),
            state: AtomicU8::new(STATE_RUNNING),
            diagnostics,
        });

        let worker = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("xenstore-router".to_string())
                .spawn(move || shared.run())
                .map_err(ClientError::Spawn)?
        };

        Ok(Self {
            shared,
            next_request_id: AtomicU32::new(0),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Next request id for this router. Starts at 0 and wraps on overflow.
    pub fn next_request_id(&self) -> u32 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RouterState {
        self.shared.state()
    }

    /// Register a delivery slot for `packet` and transmit it.
    ///
    /// `WATCH` requests register a listener for their token (the second
    /// payload field); the backend's acknowledgement and every later event
    /// for the token arrive on the returned delivery. Any other request
    /// registers a one-shot slot keyed by its request id.
    ///
    /// The slot is registered before the packet is sent, so a reply can
    /// never overtake its registration. If the send fails the slot is
    /// removed again.
    pub fn send(&self, packet: &Packet) -> Result<Delivery> {
        let request_id = packet.request_id();
        let watch_token = match packet.operation() {
            Operation::Watch => Some(
                packet
                    .payload_fields()
                    .into_iter()
                    .nth(1)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        ClientError::Malformed("watch request without token".to_string())
                    })?,
            ),
            _ => None,
        };

        let rx = {
            let mut tables = self.shared.tables();
            if self.shared.state() != RouterState::Running {
                return Err(ClientError::Stopped);
            }

            match &watch_token {
                Some(token) => {
                    let (tx, rx) = mpsc::channel();
                    tables
                        .watches
                        .entry(token.clone())
                        .or_default()
                        .push(WatchListener {
                            request_id,
                            tx: tx.clone(),
                        });
                    tables.replies.insert(request_id, ReplySlot::Watch(tx));
                    rx
                }
                None => {
                    let (tx, rx) = mpsc::sync_channel(1);
                    tables.replies.insert(request_id, ReplySlot::OneShot(tx));
                    rx
                }
            }
        };

        if let Err(err) = self.shared.transport.send(packet) {
            self.remove_correlation(request_id);
            if let Some(token) = &watch_token {
                self.remove_watch_listener(token, request_id);
            }
            return Err(err.into());
        }

        Ok(Delivery { rx, request_id })
    }

    /// Ask the receive loop to exit.
    ///
    /// This does not interrupt a receive that is already blocked; close the
    /// transport as well to guarantee the loop terminates.
    pub fn stop(&self) {
        let _ = self.shared.state.compare_exchange(
            STATE_RUNNING,
            STATE_STOP_REQUESTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Wait for the receive loop to exit and return its terminal error.
    ///
    /// Returns `Ok(())` if the loop ended through the shutdown path or was
    /// already joined.
    pub fn join(&self) -> std::result::Result<(), TransportError> {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match handle {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                error!("router thread panicked");
                Ok(())
            }),
            None => Ok(()),
        }
    }

    /// Remove the one-shot slot for `request_id`, if any.
    pub fn remove_correlation(&self, request_id: u32) {
        self.shared.tables().replies.remove(&request_id);
    }

    /// Remove every listener registered for `token`.
    pub fn remove_watch(&self, token: &str) {
        self.shared.tables().watches.remove(token);
    }

    pub(crate) fn remove_watch_listener(&self, token: &str, request_id: u32) {
        self.shared.prune_listeners(token, &[request_id]);
    }

    #[cfg(test)]
    fn listeners(&self, token: &str) -> Vec<u32> {
        self.shared
            .tables()
            .watches
            .get(token)
            .map(|list| list.iter().map(|l| l.request_id).collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    fn pending(&self) -> (usize, usize) {
        let tables = self.shared.tables();
        (tables.replies.len(), tables.watches.len())
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("transport", &self.shared.transport.transport_name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Condvar;
    use std::thread;

    use super::*;

    /// Transport whose inbound packets are scripted by the test.
    #[derive(Default)]
    struct ScriptedTransport {
        inbound: Mutex<VecDeque<xenstore_transport::Result<Packet>>>,
        ready: Condvar,
        sent: Mutex<Vec<Packet>>,
        closed: std::sync::atomic::AtomicBool,
        fail_sends: std::sync::atomic::AtomicBool,
    }

    impl ScriptedTransport {
        fn push(&self, packet: Packet) {
            self.push_result(Ok(packet));
        }

        fn push_result(&self, result: xenstore_transport::Result<Packet>) {
            self.inbound.lock().unwrap().push_back(result);
            self.ready.notify_all();
        }

        fn sent(&self) -> Vec<Packet> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, packet: &Packet) -> xenstore_transport::Result<()> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(TransportError::Disconnected);
            }
            self.sent.lock().unwrap().push(packet.clone());
            Ok(())
        }

        fn receive(&self) -> xenstore_transport::Result<Packet> {
            let mut inbound = self.inbound.lock().unwrap();
            loop {
                if self.closed.load(Ordering::SeqCst) {
                    return Err(TransportError::Closed);
                }
                if let Some(result) = inbound.pop_front() {
                    return result;
                }
                inbound = self.ready.wait(inbound).unwrap();
            }
        }

        fn close(&self) -> xenstore_transport::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            self.ready.notify_all();
            Ok(())
        }

        fn transport_name(&self) -> &'static str {
            "scripted"
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<DispatchViolation>>,
    }

    impl DiagnosticSink for RecordingSink {
        fn dispatch_violation(&self, violation: &DispatchViolation) {
            self.seen.lock().unwrap().push(violation.clone());
        }
    }

    fn router() -> (Router, Arc<ScriptedTransport>, Arc<RecordingSink>) {
        let transport = Arc::new(ScriptedTransport::default());
        let sink = Arc::new(RecordingSink::default());
        let router = Router::start(transport.clone(), sink.clone()).unwrap();
        (router, transport, sink)
    }

    fn shutdown(router: &Router, transport: &ScriptedTransport) {
        router.stop();
        transport.close().unwrap();
        router.join().unwrap();
    }

    fn request(router: &Router, op: Operation, payload: &str) -> Packet {
        Packet::new(op, router.next_request_id(), 0, payload).unwrap()
    }

    fn reply_to(request: &Packet, payload: &str) -> Packet {
        Packet::new(request.operation(), request.request_id(), 0, payload).unwrap()
    }

    fn watch_event(path: &str, token: &str) -> Packet {
        Packet::new(Operation::WatchEvent, 0, 0, format!("{path}\0{token}")).unwrap()
    }

    #[test]
    fn request_ids_start_at_zero_and_wrap() {
        let (router, transport, _) = router();

        assert_eq!(router.next_request_id(), 0);
        assert_eq!(router.next_request_id(), 1);
        assert_eq!(router.next_request_id(), 2);

        router.next_request_id.store(u32::MAX, Ordering::Relaxed);
        assert_eq!(router.next_request_id(), u32::MAX);
        assert_eq!(router.next_request_id(), 0);

        shutdown(&router, &transport);
    }

    #[test]
    fn independent_routers_do_not_share_counters() {
        let (a, ta, _) = router();
        let (b, tb, _) = router();

        assert_eq!(a.next_request_id(), 0);
        assert_eq!(a.next_request_id(), 1);
        assert_eq!(b.next_request_id(), 0);

        shutdown(&a, &ta);
        shutdown(&b, &tb);
    }

    #[test]
    fn reply_is_routed_and_slot_removed() {
        let (router, transport, sink) = router();

        let req = request(&router, Operation::Read, "/local/domain/0/name");
        let delivery = router.send(&req).unwrap();
        assert_eq!(router.pending(), (1, 0));

        transport.push(reply_to(&req, "Domain-0"));
        let reply = delivery.recv().unwrap();
        assert_eq!(reply.payload_text(), "Domain-0");
        assert_eq!(router.pending(), (0, 0));
        assert!(sink.seen.lock().unwrap().is_empty());

        shutdown(&router, &transport);
    }

    #[test]
    fn reversed_replies_reach_their_callers() {
        let (router, transport, _) = router();
        let router = Arc::new(router);
        const N: u32 = 16;

        let callers: Vec<_> = (0..N)
            .map(|_| {
                let router = Arc::clone(&router);
                thread::spawn(move || {
                    let req = request(&router, Operation::Read, "/vm");
                    let delivery = router.send(&req).unwrap();
                    let reply = delivery.recv().unwrap();
                    (req.request_id(), reply)
                })
            })
            .collect();

        while transport.sent().len() < N as usize {
            thread::sleep(Duration::from_millis(5));
        }

        let mut sent = transport.sent();
        sent.sort_by_key(|p| std::cmp::Reverse(p.request_id()));
        for req in &sent {
            transport.push(reply_to(req, &format!("reply-{}", req.request_id())));
        }

        let mut seen = Vec::new();
        for caller in callers {
            let (id, reply) = caller.join().unwrap();
            assert_eq!(reply.request_id(), id);
            assert_eq!(reply.payload_text(), format!("reply-{id}"));
            seen.push(id);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..N).collect::<Vec<_>>());

        shutdown(&router, &transport);
    }

    #[test]
    fn watch_events_fan_out_by_token() {
        let (router, transport, sink) = router();

        let w1 = request(&router, Operation::Watch, "/vm/a\0tok1");
        let w2 = request(&router, Operation::Watch, "/vm/b\0tok1");
        let w3 = request(&router, Operation::Watch, "/vm/c\0tok2");
        let first = router.send(&w1).unwrap();
        let second = router.send(&w2).unwrap();
        let other = router.send(&w3).unwrap();

        for w in [&w1, &w2, &w3] {
            transport.push(reply_to(w, "OK"));
        }
        transport.push(watch_event("/vm/a", "tok1"));
        transport.push(watch_event("/vm/a/x", "tok1"));

        for listener in [&first, &second] {
            let ack = listener.recv().unwrap();
            assert_eq!(ack.operation(), Operation::Watch);
            let e1 = listener.recv().unwrap();
            let e2 = listener.recv().unwrap();
            assert_eq!(e1.payload_fields()[0], "/vm/a");
            assert_eq!(e2.payload_fields()[0], "/vm/a/x");
        }

        assert_eq!(other.recv().unwrap().operation(), Operation::Watch);
        assert!(other
            .recv_timeout(Duration::from_millis(50))
            .unwrap()
            .is_none());
        assert!(sink.seen.lock().unwrap().is_empty());

        shutdown(&router, &transport);
    }

    #[test]
    fn event_after_unwatch_is_diagnosed_not_delivered() {
        let (router, transport, sink) = router();

        let w = request(&router, Operation::Watch, "/vm\0tok1");
        let listener = router.send(&w).unwrap();
        transport.push(reply_to(&w, "OK"));
        assert_eq!(listener.recv().unwrap().operation(), Operation::Watch);

        router.remove_watch("tok1");
        transport.push(watch_event("/vm", "tok1"));

        // The listener's sender is gone, so the channel reports Stopped
        // instead of ever yielding the late event.
        assert!(matches!(listener.recv(), Err(ClientError::Stopped)));

        // The engine keeps running.
        let req = request(&router, Operation::Read, "/vm");
        let delivery = router.send(&req).unwrap();
        transport.push(reply_to(&req, "still-alive"));
        assert_eq!(delivery.recv().unwrap().payload_text(), "still-alive");

        assert_eq!(
            *sink.seen.lock().unwrap(),
            vec![DispatchViolation::UnknownWatchToken {
                token: "tok1".to_string()
            }]
        );
        assert_eq!(router.state(), RouterState::Running);

        shutdown(&router, &transport);
    }

    #[test]
    fn unmatched_reply_is_diagnosed() {
        let (router, transport, sink) = router();

        transport.push(Packet::new(Operation::Read, 777, 0, "stray").unwrap());
        transport.push(Packet::new(Operation::WatchEvent, 0, 0, "no-token").unwrap());

        let req = request(&router, Operation::Read, "/vm");
        let delivery = router.send(&req).unwrap();
        transport.push(reply_to(&req, "ok"));
        delivery.recv().unwrap();

        let seen = sink.seen.lock().unwrap().clone();
        assert_eq!(
            seen[0],
            DispatchViolation::UnknownRequest {
                request_id: 777,
                operation: Operation::Read
            }
        );
        assert!(matches!(
            seen[1],
            DispatchViolation::MalformedWatchEvent { .. }
        ));

        shutdown(&router, &transport);
    }

    #[test]
    fn unknown_operation_is_diagnosed_and_loop_continues() {
        let (router, transport, sink) = router();

        let req = request(&router, Operation::Read, "/a");
        let delivery = router.send(&req).unwrap();

        transport.push_result(Err(TransportError::Wire(WireError::UnknownOperation {
            code: 22,
            request_id: 9999,
            payload_len: 1,
        })));
        transport.push(reply_to(&req, "value"));

        assert_eq!(delivery.recv().unwrap().payload_text(), "value");
        assert_eq!(router.state(), RouterState::Running);
        assert_eq!(
            *sink.seen.lock().unwrap(),
            vec![DispatchViolation::UnknownOperation {
                code: 22,
                request_id: 9999
            }]
        );

        let next = request(&router, Operation::Read, "/b");
        let delivery = router.send(&next).unwrap();
        transport.push(reply_to(&next, "still-alive"));
        assert_eq!(delivery.recv().unwrap().payload_text(), "still-alive");

        shutdown(&router, &transport);
    }

    /// Round-trip one request so every packet pushed before it has been
    /// dispatched.
    fn settle(router: &Router, transport: &ScriptedTransport) {
        let req = request(router, Operation::Read, "/settle");
        let delivery = router.send(&req).unwrap();
        transport.push(reply_to(&req, "ok"));
        delivery.recv().unwrap();
    }

    #[test]
    fn dropped_watch_listener_is_pruned() {
        let (router, transport, sink) = router();

        let w1 = request(&router, Operation::Watch, "/vm\0tok1");
        let w2 = request(&router, Operation::Watch, "/vm/x\0tok1");
        let gone = router.send(&w1).unwrap();
        let kept = router.send(&w2).unwrap();
        transport.push(reply_to(&w1, "OK"));
        transport.push(reply_to(&w2, "OK"));
        assert_eq!(gone.recv().unwrap().operation(), Operation::Watch);
        assert_eq!(kept.recv().unwrap().operation(), Operation::Watch);
        drop(gone);

        transport.push(watch_event("/vm", "tok1"));
        settle(&router, &transport);
        assert_eq!(kept.recv().unwrap().payload_fields()[0], "/vm");
        assert_eq!(router.listeners("tok1"), vec![w2.request_id()]);

        drop(kept);
        transport.push(watch_event("/vm", "tok1"));
        settle(&router, &transport);
        assert_eq!(router.pending(), (0, 0));
        assert!(sink.seen.lock().unwrap().is_empty());

        transport.push(watch_event("/vm", "tok1"));
        settle(&router, &transport);
        assert_eq!(
            *sink.seen.lock().unwrap(),
            vec![DispatchViolation::UnknownWatchToken {
                token: "tok1".to_string()
            }]
        );

        shutdown(&router, &transport);
    }

    #[test]
    fn failed_send_leaves_no_entry() {
        let (router, transport, _) = router();
        transport.fail_sends.store(true, Ordering::SeqCst);

        let req = request(&router, Operation::Read, "/vm");
        let err = router.send(&req).unwrap_err();
        assert!(matches!(err, ClientError::Transport(TransportError::Disconnected)));

        let w = request(&router, Operation::Watch, "/vm\0tok");
        assert!(router.send(&w).is_err());
        assert_eq!(router.pending(), (0, 0));

        shutdown(&router, &transport);
    }

    #[test]
    fn watch_without_token_is_rejected() {
        let (router, transport, _) = router();

        let w = request(&router, Operation::Watch, "/vm");
        assert!(matches!(router.send(&w), Err(ClientError::Malformed(_))));
        assert!(transport.sent().is_empty());

        shutdown(&router, &transport);
    }

    #[test]
    fn stop_alone_does_not_release_blocked_receive() {
        let (router, transport, _) = router();

        router.stop();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(router.state(), RouterState::StopRequested);

        transport.close().unwrap();
        assert!(router.join().is_ok());
        assert_eq!(router.state(), RouterState::Stopped);
    }

    #[test]
    fn shutdown_releases_pending_callers() {
        let (router, transport, _) = router();

        let req = request(&router, Operation::Read, "/vm");
        let delivery = router.send(&req).unwrap();

        shutdown(&router, &transport);

        assert!(matches!(delivery.recv(), Err(ClientError::Stopped)));
        assert_eq!(router.pending(), (0, 0));

        let late = request(&router, Operation::Read, "/vm");
        assert!(matches!(router.send(&late), Err(ClientError::Stopped)));
    }

    #[test]
    fn unexpected_transport_failure_is_returned_from_join() {
        let (router, transport, _) = router();

        struct Failing;
        impl Transport for Failing {
            fn send(&self, _packet: &Packet) -> xenstore_transport::Result<()> {
                Ok(())
            }
            fn receive(&self) -> xenstore_transport::Result<Packet> {
                Err(TransportError::Disconnected)
            }
            fn close(&self) -> xenstore_transport::Result<()> {
                Ok(())
            }
            fn transport_name(&self) -> &'static str {
                "failing"
            }
        }

        let failing = Router::start(Arc::new(Failing), Arc::new(TracingSink::default())).unwrap();
        let err = failing.join().unwrap_err();
        assert!(matches!(err, TransportError::Disconnected));
        assert_eq!(failing.state(), RouterState::Stopped);

        shutdown(&router, &transport);
    }

    #[test]
    fn tracing_sink_counts_violations() {
        let sink = TracingSink::default();
        sink.dispatch_violation(&DispatchViolation::UnknownWatchToken {
            token: "t".to_string(),
        });
        sink.dispatch_violation(&DispatchViolation::MalformedWatchEvent { payload_len: 0 });
        assert_eq!(sink.violations(), 2);
    }
}
