//! Common error handling utilities for the access control workspace
//!
//! Every error that leaves the engine is classified so that a consumer
//! (for example an HTTP permission service) can tell apart:
//!
//! - **BadRequest**: the query named an unknown type/relation or carried a malformed tuple
//! - **PermissionDenied**: a well-formed query that resolved to "not allowed"
//! - **Unavailable**: the evaluation was cancelled by a deadline and may be retried
//! - **Internal**: schema compile failures and storage faults
//!
//! # Example
//!
//! ```rust
//! use error_common::{Classify, ErrorClass, ErrorReport};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("unknown relation 'share' on type 'namespace'")]
//! struct UnknownRelation;
//!
//! impl Classify for UnknownRelation {
//!     fn class(&self) -> ErrorClass { ErrorClass::BadRequest }
//!     fn code(&self) -> &'static str { error_common::codes::request::UNKNOWN_RELATION }
//! }
//!
//! let report = ErrorReport::from_error(&UnknownRelation);
//! assert_eq!(report.status, 400);
//! ```

pub mod codes;
pub mod types;

pub use types::*;
