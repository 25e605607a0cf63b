use std::fmt;

use xenstore_client::ClientError;
use xenstore_transport::TransportError;

// Exit codes shared with the xenstore shell tools.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 2;
pub const USAGE: i32 = 3;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Map a client failure to a printed message and the failure exit code.
pub fn client_error(context: &str, err: ClientError) -> CliError {
    match err {
        ClientError::Transport(TransportError::Connect { path, source }) => CliError::new(
            FAILURE,
            format!("{context}: cannot connect to {}: {source}", path.display()),
        ),
        ClientError::Transport(TransportError::Open { path, source }) => CliError::new(
            FAILURE,
            format!("{context}: cannot open {}: {source}", path.display()),
        ),
        ClientError::Store(err) => CliError::new(FAILURE, format!("{context}: {}", err.token())),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

/// Unwrap a required positional argument or fail with a usage error.
pub fn required<T>(value: Option<T>, message: &str) -> CliResult<T> {
    value.ok_or_else(|| CliError::usage(message))
}
