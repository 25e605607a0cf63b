//! XenStore client library and command-line tools.
//!
//! XenStore is the hierarchical key/value store Xen domains use for
//! control-plane communication. This crate bundles the protocol layers:
//!
//! - [`wire`]: packet codec (operation codes, 16-byte header, NUL-terminated payloads)
//! - [`transport`]: Unix socket, XenBus device and method-call transports
//! - [`client`]: request routing, watches and the named store operations
//!
//! The `xenstore` binary (feature `cli`) wraps the client for shell use.

/// Re-export wire types.
pub mod wire {
    pub use xenstore_wire::*;
}

/// Re-export transport types.
pub mod transport {
    pub use xenstore_transport::*;
}

/// Re-export client types.
pub mod client {
    pub use xenstore_client::*;
}

pub use xenstore_client::{Client, ClientError, ConnectConfig, StoreError, Watch, WatchEvent};
