use xenstore_transport::TransportError;
use xenstore_wire::WireError;

/// An error reply from the XenStore backend.
///
/// The backend answers failed requests with an errno name; the canonical
/// names map to typed variants, anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("invalid argument (EINVAL)")]
    InvalidArgument,
    #[error("permission denied (EACCES)")]
    PermissionDenied,
    #[error("node already exists (EEXIST)")]
    AlreadyExists,
    #[error("node is a directory (EISDIR)")]
    IsDirectory,
    #[error("no such node (ENOENT)")]
    NotFound,
    #[error("out of memory (ENOMEM)")]
    OutOfMemory,
    #[error("quota exceeded (ENOSPC)")]
    NoSpace,
    #[error("backend I/O error (EIO)")]
    Io,
    #[error("node not empty (ENOTEMPTY)")]
    NotEmpty,
    #[error("operation not supported (ENOSYS)")]
    NotSupported,
    #[error("store is read-only (EROFS)")]
    ReadOnly,
    #[error("backend busy (EBUSY)")]
    Busy,
    #[error("try again (EAGAIN)")]
    TryAgain,
    #[error("already connected (EISCONN)")]
    AlreadyConnected,
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Map an error token from an error reply.
    pub fn from_token(token: &str) -> Self {
        match token {
            "EINVAL" => Self::InvalidArgument,
            "EACCES" => Self::PermissionDenied,
            "EEXIST" => Self::AlreadyExists,
            "EISDIR" => Self::IsDirectory,
            "ENOENT" => Self::NotFound,
            "ENOMEM" => Self::OutOfMemory,
            "ENOSPC" => Self::NoSpace,
            "EIO" => Self::Io,
            "ENOTEMPTY" => Self::NotEmpty,
            "ENOSYS" => Self::NotSupported,
            "EROFS" => Self::ReadOnly,
            "EBUSY" => Self::Busy,
            "EAGAIN" => Self::TryAgain,
            "EISCONN" => Self::AlreadyConnected,
            other => Self::Other(other.to_string()),
        }
    }

    /// The wire token for this error.
    pub fn token(&self) -> &str {
        match self {
            Self::InvalidArgument => "EINVAL",
            Self::PermissionDenied => "EACCES",
            Self::AlreadyExists => "EEXIST",
            Self::IsDirectory => "EISDIR",
            Self::NotFound => "ENOENT",
            Self::OutOfMemory => "ENOMEM",
            Self::NoSpace => "ENOSPC",
            Self::Io => "EIO",
            Self::NotEmpty => "ENOTEMPTY",
            Self::NotSupported => "ENOSYS",
            Self::ReadOnly => "EROFS",
            Self::Busy => "EBUSY",
            Self::TryAgain => "EAGAIN",
            Self::AlreadyConnected => "EISCONN",
            Self::Other(token) => token,
        }
    }

    /// The host errno equivalent, if the token is a canonical one.
    pub fn errno(&self) -> Option<i32> {
        let code = match self {
            Self::InvalidArgument => libc::EINVAL,
            Self::PermissionDenied => libc::EACCES,
            Self::AlreadyExists => libc::EEXIST,
            Self::IsDirectory => libc::EISDIR,
            Self::NotFound => libc::ENOENT,
            Self::OutOfMemory => libc::ENOMEM,
            Self::NoSpace => libc::ENOSPC,
            Self::Io => libc::EIO,
            Self::NotEmpty => libc::ENOTEMPTY,
            Self::NotSupported => libc::ENOSYS,
            Self::ReadOnly => libc::EROFS,
            Self::Busy => libc::EBUSY,
            Self::TryAgain => libc::EAGAIN,
            Self::AlreadyConnected => libc::EISCONN,
            Self::Other(_) => return None,
        };
        Some(code)
    }
}

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request could not be built (payload too large).
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The backend rejected the request.
    #[error("xenstore error: {0}")]
    Store(#[from] StoreError),

    /// The router stopped before a reply arrived.
    #[error("router stopped")]
    Stopped,

    /// A request or reply did not have the expected shape.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// The router thread could not be started.
    #[error("failed to start router thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
