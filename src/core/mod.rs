//! Core error and result types shared by every component.
//!
//! - [`Error`] - classified failure of one operation against the server
//! - [`Recovery`] - what the retry executor does about an [`Error`]
//! - [`ErrorCode`] - server-compatible numeric code carried in results
//! - [`BaseResult`] / [`InsertResult`] - what callers and callbacks receive
//!
//! # Example
//!
//! ```rust,ignore
//! use ingest_runtime::core::{Error, ErrorCode, Recovery};
//!
//! let err = Error::server(ErrorCode::UNKNOWN_TABLE, "no such table");
//! assert_eq!(err.recovery(), Recovery::ProbeAndFail);
//! ```

mod codes;
mod error;
mod result;

pub use codes::ErrorCode;
pub use error::{Error, Recovery, Result, ServerException};
pub use result::{BaseResult, InsertResult};
