//! Error types for the supervisord client.

use thiserror::Error;

/// The main error type for supervisord client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors while connecting to or talking with the daemon.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP layer returned a non-success status (401 on bad credentials).
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// An XML-RPC fault returned by supervisord.
    #[error("RPC fault {code}: {message}")]
    Fault { code: i32, message: String },

    /// A reply that could not be decoded or did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The named process is not known to the daemon.
    #[error("process not found: {0}")]
    ProcessNotFound(String),

    /// supervisord.conf could not be read or exposes no reachable RPC endpoint.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error is supervisord's BAD_NAME fault (unknown process or group).
    pub fn is_bad_name(&self) -> bool {
        matches!(self, Error::Fault { code, .. } if *code == crate::process::FAULT_BAD_NAME)
    }
}

/// A convenient Result type for supervisord client operations.
pub type Result<T> = std::result::Result<T, Error>;
