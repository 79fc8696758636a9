//! Core error types.

use std::fmt;
use std::time::Duration;

use super::codes::ErrorCode;

/// Exception reported by the server in response to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerException {
    /// Server error code.
    pub code: ErrorCode,
    /// Exception class name, e.g. `DB::Exception`.
    pub name: String,
    /// Human-readable text sent by the server.
    pub message: String,
}

impl ServerException {
    pub fn new(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: "DB::Exception".to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ServerException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (code {})", self.name, self.message, self.code.0)
    }
}

/// Failure of a single operation against the server.
///
/// Connections classify what went wrong; the retry executor decides what to
/// do about it via [`Error::recovery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No idle connection became available in time.
    PoolTimeout(Duration),

    /// Malformed or unexpected response framing.
    Protocol(String),

    /// The server rejected the request.
    Server(ServerException),

    /// Transport failure: connect refused, DNS, socket errors.
    Network(String),

    /// Anything the connection could not classify.
    Unknown(String),

    /// The runtime stopped before the operation ran.
    Shutdown,
}

/// What the retry executor does after an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Retry without touching the connection.
    Retry,
    /// Ping the connection to refresh its validity, then retry.
    ProbeAndRetry,
    /// Ping the connection to refresh its validity, then give up.
    ProbeAndFail,
    /// Mark the connection invalid without probing, then retry.
    InvalidateAndRetry,
    /// Give up immediately.
    Fail,
}

impl Recovery {
    /// Returns true if another attempt may follow.
    #[inline]
    pub fn is_retry(self) -> bool {
        matches!(
            self,
            Recovery::Retry | Recovery::ProbeAndRetry | Recovery::InvalidateAndRetry
        )
    }
}

impl Error {
    /// Build a server error from a code and message.
    pub fn server(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Error::Server(ServerException::new(code, message))
    }

    /// Code reported to callers for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::PoolTimeout(_) => ErrorCode::TIMEOUT_EXCEEDED,
            Error::Protocol(_) => ErrorCode::UNEXPECTED_PACKET_FROM_SERVER,
            Error::Server(e) => e.code,
            Error::Network(_) => ErrorCode::NETWORK_ERROR,
            Error::Unknown(_) => ErrorCode::UNKNOWN_EXCEPTION,
            Error::Shutdown => ErrorCode::ABORTED,
        }
    }

    /// Classify the failure.
    pub fn recovery(&self) -> Recovery {
        match self {
            Error::PoolTimeout(_) => Recovery::Retry,
            Error::Protocol(_) => Recovery::ProbeAndRetry,
            Error::Server(e) if e.code.is_retriable() => Recovery::ProbeAndRetry,
            Error::Server(_) => Recovery::ProbeAndFail,
            Error::Network(_) => Recovery::InvalidateAndRetry,
            Error::Unknown(_) => Recovery::ProbeAndFail,
            Error::Shutdown => Recovery::Fail,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::PoolTimeout(_) => "pool_timeout",
            Error::Protocol(_) => "protocol",
            Error::Server(_) => "server",
            Error::Network(_) => "network",
            Error::Unknown(_) => "unknown",
            Error::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PoolTimeout(d) => {
                write!(f, "can not acquire connection within {}ms", d.as_millis())
            }
            Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Error::Server(e) => write!(f, "server error: {}", e),
            Error::Network(msg) => write!(f, "network error: {}", msg),
            Error::Unknown(msg) => write!(f, "unknown error: {}", msg),
            Error::Shutdown => write!(f, "dispatcher shut down"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Network(e.to_string())
    }
}

impl From<ServerException> for Error {
    fn from(e: ServerException) -> Self {
        Error::Server(e)
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
