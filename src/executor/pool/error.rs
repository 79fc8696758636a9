//! Submission-side error types.

use std::fmt;
use std::time::Duration;

/// Errors raised when handing work to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The task queue is full.
    QueueFull {
        /// Maximum queue capacity.
        capacity: usize,
        /// Current number of queued tasks.
        pending: usize,
    },

    /// No space in the task queue within the given time.
    Timeout(Duration),

    /// The dispatcher has been shut down.
    Shutdown,

    /// A worker thread could not be started.
    WorkerSpawn(String),

    /// The metrics registry could not be built.
    Metrics(String),
}

impl PoolError {
    /// Check if this is a queue full error.
    pub fn is_queue_full(&self) -> bool {
        matches!(self, PoolError::QueueFull { .. })
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::Timeout(_))
    }

    /// Check if this is a shutdown error.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, PoolError::Shutdown)
    }

    /// Get the error message for logging.
    pub fn message(&self) -> &str {
        match self {
            PoolError::QueueFull { .. } => "Queue full",
            PoolError::Timeout(_) => "Submit timeout",
            PoolError::Shutdown => "Dispatcher shutdown",
            PoolError::WorkerSpawn(msg) | PoolError::Metrics(msg) => msg,
        }
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::QueueFull { capacity, pending } => {
                write!(f, "queue full: {}/{} pending tasks", pending, capacity)
            }
            PoolError::Timeout(duration) => {
                write!(f, "submit timeout after {}ms", duration.as_millis())
            }
            PoolError::Shutdown => write!(f, "dispatcher has been shut down"),
            PoolError::WorkerSpawn(msg) => write!(f, "failed to spawn worker: {}", msg),
            PoolError::Metrics(msg) => write!(f, "failed to register metrics: {}", msg),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<std::io::Error> for PoolError {
    fn from(e: std::io::Error) -> Self {
        PoolError::WorkerSpawn(e.to_string())
    }
}

impl From<prometheus::Error> for PoolError {
    fn from(e: prometheus::Error) -> Self {
        PoolError::Metrics(e.to_string())
    }
}

/// Result type alias for submission operations.
pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_full() {
        let err = PoolError::QueueFull {
            capacity: 128,
            pending: 128,
        };
        assert!(err.is_queue_full());
        assert!(!err.is_timeout());
        assert_eq!(err.message(), "Queue full");
        assert!(err.to_string().contains("128"));
    }

    #[test]
    fn test_timeout() {
        let err = PoolError::Timeout(Duration::from_millis(250));
        assert!(err.is_timeout());
        assert!(!err.is_shutdown());
        assert_eq!(err.to_string(), "submit timeout after 250ms");
    }

    #[test]
    fn test_from_io() {
        let err: PoolError = std::io::Error::new(std::io::ErrorKind::Other, "no threads").into();
        assert!(matches!(err, PoolError::WorkerSpawn(_)));
        assert!(err.to_string().contains("no threads"));
    }
}
