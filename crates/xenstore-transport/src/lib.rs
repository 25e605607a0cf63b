//! XenStore transport abstraction.
//!
//! A [`Transport`] moves whole packets to and from a XenStore backend:
//! - Unix domain socket to `xenstored` (dom0 tooling)
//! - the XenBus character device (any domain)
//! - a method-call backend adapted through [`QueuedTransport`]
//!
//! Stream-backed variants share their behaviour through one
//! [`StreamTransport`] each.

pub mod error;
pub mod queued;
pub mod stream;
pub mod traits;

#[cfg(unix)]
pub mod uds;
#[cfg(unix)]
pub mod xenbus;

pub use error::{Result, TransportError};
pub use queued::{EventSink, MethodBackend, MethodCall, MethodReply, QueuedTransport};
pub use stream::StreamTransport;
pub use traits::{DuplexStream, Transport};

#[cfg(unix)]
pub use uds::UnixSocketTransport;
#[cfg(unix)]
pub use xenbus::{XenBusDevice, XenBusTransport};
