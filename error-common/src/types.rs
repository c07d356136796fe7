use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of a failure, used by callers to pick a reaction:
/// fix the request, inform the user, or retry/alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The request itself is malformed (unknown relation, bad tuple, ...)
    BadRequest,
    /// The request is well-formed and the subject lacks the relation
    PermissionDenied,
    /// A transient condition such as a timeout; the request may be retried
    Unavailable,
    /// Schema/compile failures and storage faults
    Internal,
}

impl ErrorClass {
    /// HTTP-equivalent status code for this class
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorClass::BadRequest => 400,
            ErrorClass::PermissionDenied => 403,
            ErrorClass::Unavailable => 503,
            ErrorClass::Internal => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Unavailable)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::BadRequest => "bad_request",
            ErrorClass::PermissionDenied => "permission_denied",
            ErrorClass::Unavailable => "unavailable",
            ErrorClass::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

/// Implemented by every error type that crosses a crate boundary
pub trait Classify {
    fn class(&self) -> ErrorClass;

    /// Stable error code from [`crate::codes`]
    fn code(&self) -> &'static str;
}

/// Serializable error body handed to consumers of the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub class: ErrorClass,
    pub code: String,
    pub status: u16,
    pub message: String,
}

impl ErrorReport {
    pub fn from_error<E>(error: &E) -> Self
    where
        E: Classify + fmt::Display,
    {
        let class = error.class();
        Self {
            class,
            code: error.code().to_string(),
            status: class.http_status(),
            message: error.to_string(),
        }
    }
}

/// Log an error with its classification attached
pub fn log_error<E>(context: &str, error: &E)
where
    E: Classify + fmt::Display,
{
    let class = error.class();
    match class {
        ErrorClass::Internal | ErrorClass::Unavailable => tracing::error!(
            context = context,
            error_class = %class,
            error_code = error.code(),
            error = %error,
            "access control error"
        ),
        ErrorClass::BadRequest | ErrorClass::PermissionDenied => tracing::debug!(
            context = context,
            error_class = %class,
            error_code = error.code(),
            error = %error,
            "request rejected"
        ),
    }
}
