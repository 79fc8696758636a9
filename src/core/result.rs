//! Results handed back to callers.

use std::fmt;
use std::sync::Arc;

use super::codes::ErrorCode;
use super::error::Error;

/// Outcome of an operation: an error code and message, `OK` on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseResult {
    pub err_code: ErrorCode,
    pub err_msg: String,
}

impl BaseResult {
    /// Successful result.
    pub fn success() -> Self {
        Self::default()
    }

    /// Failed result carrying the error's code and message.
    pub fn from_error(err: &Error) -> Self {
        Self {
            err_code: err.code(),
            err_msg: err.to_string(),
        }
    }

    /// Returns true if the operation succeeded.
    #[inline]
    pub fn ok(&self) -> bool {
        self.err_code.is_ok()
    }
}

impl From<Result<(), Error>> for BaseResult {
    fn from(res: Result<(), Error>) -> Self {
        match res {
            Ok(()) => BaseResult::success(),
            Err(e) => BaseResult::from_error(&e),
        }
    }
}

impl fmt::Display for BaseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ok() {
            write!(f, "ok")
        } else {
            write!(f, "{}: {}", self.err_code, self.err_msg)
        }
    }
}

/// Result of an insert, carrying everything needed to resubmit it.
pub struct InsertResult<B> {
    pub table_name: String,
    pub batch: Arc<B>,
    pub idempotent_id: Option<String>,
    pub err_code: ErrorCode,
    pub err_msg: String,
}

impl<B> InsertResult<B> {
    /// Returns true if the insert succeeded.
    #[inline]
    pub fn ok(&self) -> bool {
        self.err_code.is_ok()
    }

    /// Error code and message without the insert payload.
    pub fn base(&self) -> BaseResult {
        BaseResult {
            err_code: self.err_code,
            err_msg: self.err_msg.clone(),
        }
    }
}

// Manual impls: `B` itself need not be `Clone`/`Debug` behind the `Arc`.
impl<B> Clone for InsertResult<B> {
    fn clone(&self) -> Self {
        Self {
            table_name: self.table_name.clone(),
            batch: Arc::clone(&self.batch),
            idempotent_id: self.idempotent_id.clone(),
            err_code: self.err_code,
            err_msg: self.err_msg.clone(),
        }
    }
}

impl<B> fmt::Debug for InsertResult<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertResult")
            .field("table_name", &self.table_name)
            .field("idempotent_id", &self.idempotent_id)
            .field("err_code", &self.err_code)
            .field("err_msg", &self.err_msg)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_result_from_error() {
        let res = BaseResult::from_error(&Error::Network("refused".into()));
        assert!(!res.ok());
        assert_eq!(res.err_code, ErrorCode::NETWORK_ERROR);
        assert_eq!(res.err_msg, "network error: refused");

        let res: BaseResult = Ok(()).into();
        assert!(res.ok());
        assert_eq!(res.to_string(), "ok");
    }

    #[test]
    fn test_insert_result_base() {
        let res = InsertResult {
            table_name: "events".to_string(),
            batch: Arc::new(vec![1u64, 2, 3]),
            idempotent_id: Some("id-1".to_string()),
            err_code: ErrorCode::UNKNOWN_TABLE,
            err_msg: "missing".to_string(),
        };
        assert!(!res.ok());
        assert_eq!(res.base().err_code, ErrorCode::UNKNOWN_TABLE);

        let copy = res.clone();
        assert!(Arc::ptr_eq(&copy.batch, &res.batch));
        assert!(format!("{:?}", copy).contains("events"));
    }
}
