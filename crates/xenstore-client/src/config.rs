//! Connection configuration and backend discovery.

use std::path::{Path, PathBuf};

/// Environment variable naming the xenstored socket directly.
pub const SOCKET_PATH_ENV: &str = "XENSTORED_PATH";

/// Environment variable naming the xenstored run directory.
pub const RUNDIR_ENV: &str = "XENSTORED_RUNDIR";

const DEFAULT_RUNDIR: &str = "/var/run/xenstored";
const SOCKET_NAME: &str = "socket";
const CAPABILITIES_PATH: &str = "/proc/xen/capabilities";

/// Path of the xenstored Unix socket on this system.
///
/// `XENSTORED_PATH` wins when set and non-empty, then
/// `$XENSTORED_RUNDIR/socket`, then `/var/run/xenstored/socket`.
pub fn unix_socket_path() -> PathBuf {
    socket_path_from(
        std::env::var(SOCKET_PATH_ENV).ok().as_deref(),
        std::env::var(RUNDIR_ENV).ok().as_deref(),
    )
}

fn socket_path_from(socket_path: Option<&str>, rundir: Option<&str>) -> PathBuf {
    if let Some(path) = socket_path.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    let rundir = rundir.filter(|d| !d.is_empty()).unwrap_or(DEFAULT_RUNDIR);
    Path::new(rundir).join(SOCKET_NAME)
}

/// Path of the XenBus device on this system.
pub fn xenbus_path() -> PathBuf {
    if cfg!(target_os = "netbsd") {
        return PathBuf::from("/kern/xen/xenbus");
    }

    let dev = Path::new("/dev/xen/xenbus");
    if cfg!(target_os = "linux") && std::fs::File::open(dev).is_err() {
        return PathBuf::from("/proc/xen/xenbus");
    }
    dev.to_path_buf()
}

/// Whether this domain has the `control_d` capability.
pub fn control_domain() -> bool {
    std::fs::read_to_string(CAPABILITIES_PATH)
        .map(|caps| is_control_capability(&caps))
        .unwrap_or(false)
}

fn is_control_capability(caps: &str) -> bool {
    caps == "control_d\n"
}

/// Which backend to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// The xenstored Unix domain socket.
    UnixSocket(PathBuf),
    /// The XenBus character device.
    XenBus(PathBuf),
}

impl Backend {
    pub fn path(&self) -> &Path {
        match self {
            Self::UnixSocket(path) | Self::XenBus(path) => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnixSocket(_) => "unix-socket",
            Self::XenBus(_) => "xenbus",
        }
    }
}

/// How a [`Client`](crate::Client) connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    pub backend: Backend,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self::xenbus(xenbus_path())
    }
}

impl ConnectConfig {
    /// Connect to the xenstored socket at `path`.
    pub fn unix_socket(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::UnixSocket(path.into()),
        }
    }

    /// Connect through the XenBus device at `path`.
    pub fn xenbus(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::XenBus(path.into()),
        }
    }

    /// Socket backend when `XENSTORED_PATH` is set, XenBus otherwise.
    pub fn from_env() -> Self {
        match std::env::var(SOCKET_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::unix_socket(path),
            _ => Self::default(),
        }
    }
}
