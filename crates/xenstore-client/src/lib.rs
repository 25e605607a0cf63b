//! XenStore client.
//!
//! [`Client`] turns named store operations into packets, hands them to a
//! [`Router`] that owns the transport's receive loop, and maps error
//! replies to [`StoreError`]s. Watches are delivered through a live
//! [`Watch`] handle.
//!
//! ```no_run
//! use xenstore_client::Client;
//!
//! # fn main() -> xenstore_client::Result<()> {
//! let client = Client::connect_unix_socket("/var/run/xenstored/socket")?;
//! let name = client.read("/local/domain/0/name")?;
//! println!("{name}");
//! client.close()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod path;
pub mod router;
pub mod watch;

pub use client::Client;
pub use config::{control_domain, unix_socket_path, xenbus_path, Backend, ConnectConfig};
pub use error::{ClientError, Result, StoreError};
pub use path::{join_path, valid_path, valid_permissions, valid_watch_path, PATH_SEPARATOR};
pub use router::{
    Delivery, DiagnosticSink, DispatchViolation, Router, RouterState, TracingSink,
};
pub use watch::{Watch, WatchEvent};
