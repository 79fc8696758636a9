//! Numeric error codes reported in results.
//!
//! Codes are the server's own exception codes, so a failed result carries the
//! same number the server reported. Client-side failures reuse the closest
//! server code (`NETWORK_ERROR`, `TIMEOUT_EXCEEDED`, `ABORTED`).

use std::fmt;

/// Server-compatible error code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const OK: ErrorCode = ErrorCode(0);
    pub const NO_SUCH_COLUMN_IN_TABLE: ErrorCode = ErrorCode(16);
    pub const TYPE_MISMATCH: ErrorCode = ErrorCode(53);
    pub const UNKNOWN_TABLE: ErrorCode = ErrorCode(60);
    pub const SYNTAX_ERROR: ErrorCode = ErrorCode(62);
    pub const UNEXPECTED_PACKET_FROM_CLIENT: ErrorCode = ErrorCode(101);
    pub const UNEXPECTED_PACKET_FROM_SERVER: ErrorCode = ErrorCode(102);
    pub const TIMEOUT_EXCEEDED: ErrorCode = ErrorCode(159);
    pub const NETWORK_ERROR: ErrorCode = ErrorCode(210);
    pub const ABORTED: ErrorCode = ErrorCode(236);
    pub const UNKNOWN_EXCEPTION: ErrorCode = ErrorCode(1002);

    /// Server codes worth resending the same request for.
    pub const RETRIABLE_SERVER_CODES: [ErrorCode; 2] = [
        ErrorCode::TIMEOUT_EXCEEDED,
        ErrorCode::UNEXPECTED_PACKET_FROM_CLIENT,
    ];

    /// Returns true for [`ErrorCode::OK`].
    #[inline]
    pub fn is_ok(self) -> bool {
        self == ErrorCode::OK
    }

    /// Returns true if a server exception with this code is transient.
    #[inline]
    pub fn is_retriable(self) -> bool {
        Self::RETRIABLE_SERVER_CODES.contains(&self)
    }

    /// Symbolic name, for logs and metric labels.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::OK => "OK",
            ErrorCode::NO_SUCH_COLUMN_IN_TABLE => "NO_SUCH_COLUMN_IN_TABLE",
            ErrorCode::TYPE_MISMATCH => "TYPE_MISMATCH",
            ErrorCode::UNKNOWN_TABLE => "UNKNOWN_TABLE",
            ErrorCode::SYNTAX_ERROR => "SYNTAX_ERROR",
            ErrorCode::UNEXPECTED_PACKET_FROM_CLIENT => "UNEXPECTED_PACKET_FROM_CLIENT",
            ErrorCode::UNEXPECTED_PACKET_FROM_SERVER => "UNEXPECTED_PACKET_FROM_SERVER",
            ErrorCode::TIMEOUT_EXCEEDED => "TIMEOUT_EXCEEDED",
            ErrorCode::NETWORK_ERROR => "NETWORK_ERROR",
            ErrorCode::ABORTED => "ABORTED",
            ErrorCode::UNKNOWN_EXCEPTION => "UNKNOWN_EXCEPTION",
            _ => "SERVER_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        ErrorCode(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_set_is_closed() {
        assert!(ErrorCode::TIMEOUT_EXCEEDED.is_retriable());
        assert!(ErrorCode::UNEXPECTED_PACKET_FROM_CLIENT.is_retriable());
        assert!(!ErrorCode::UNKNOWN_TABLE.is_retriable());
        assert!(!ErrorCode::NO_SUCH_COLUMN_IN_TABLE.is_retriable());
        assert!(!ErrorCode(9999).is_retriable());
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorCode::UNKNOWN_TABLE.to_string(), "UNKNOWN_TABLE (60)");
        assert_eq!(ErrorCode(42).to_string(), "SERVER_ERROR (42)");
        assert!(ErrorCode::default().is_ok());
    }
}
