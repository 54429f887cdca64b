//! Error types for bridge operations
//!
//! Script-level failures carry the thrown engine value so callers can
//! inspect it. Bridge invariant violations are not errors: they go through
//! [`fatal`] and never return.

use std::os::raw::c_int;
use std::panic::Location;
use std::string::FromUtf8Error;

use otter_js_sys::JS_OK;
use thiserror::Error;

use crate::exception::JsError;

/// Result type alias for bridge operations
pub type JsiResult<T> = Result<T, JsiError>;

/// Structured error types for bridge operations
#[derive(Debug, Error)]
pub enum JsiError {
    /// Exception thrown by script or by the engine
    #[error(transparent)]
    Js(#[from] JsError),

    /// Failure raised by embedder code, typically inside a host callback.
    /// Becomes an `Error` object when it crosses into the engine.
    #[error("{0}")]
    Native(String),

    /// Value had a different kind than the operation required
    #[error("Type error: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Array access past the end
    #[error("Index {index} out of range for array of size {size}")]
    IndexOutOfRange { index: usize, size: usize },

    /// Operation the engine does not provide
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The thread's shared platform was already torn down
    #[error("Shared platform has been torn down")]
    PlatformTornDown,

    /// Engine string was not valid UTF-8
    #[error("String encoding error: {0}")]
    Utf8(#[from] FromUtf8Error),
}

impl JsiError {
    /// Create an embedder-side error
    pub fn native(message: impl Into<String>) -> Self {
        Self::Native(message.into())
    }

    /// Create a type mismatch error
    pub fn type_mismatch(expected: &'static str, actual: &'static str) -> Self {
        Self::TypeMismatch { expected, actual }
    }

    /// Check if this error carries a thrown script value
    pub fn is_js_error(&self) -> bool {
        matches!(self, Self::Js(_))
    }

    /// The thrown script exception, if this error carries one
    pub fn as_js_error(&self) -> Option<&JsError> {
        match self {
            Self::Js(error) => Some(error),
            _ => None,
        }
    }

    /// Message without the variant prefix, used when the error is rethrown
    /// into the engine
    pub fn message(&self) -> String {
        match self {
            Self::Js(error) => error.message().to_string(),
            Self::Native(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<String> for JsiError {
    fn from(s: String) -> Self {
        Self::Native(s)
    }
}

/// Abort on a broken bridge invariant.
#[track_caller]
pub(crate) fn fatal(message: &str) -> ! {
    let location = Location::caller();
    tracing::error!(%location, "{message}");
    panic!("{message}");
}

/// Status check for engine calls that cannot fail unless the bridge itself
/// is broken (reference counting, handle reads, type tag checks).
#[track_caller]
pub(crate) fn assert_ok(status: c_int, operation: &str) {
    if status != JS_OK {
        fatal(&format!("{operation} failed with status {status}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_display() {
        let err = JsiError::native("socket closed");
        assert_eq!(err.to_string(), "socket closed");
        assert_eq!(err.message(), "socket closed");
        assert!(!err.is_js_error());
    }

    #[test]
    fn test_type_mismatch() {
        let err = JsiError::type_mismatch("string", "number");
        assert!(err.to_string().contains("expected string"));
        assert!(err.to_string().contains("got number"));
    }

    #[test]
    fn test_index_out_of_range() {
        let err = JsiError::IndexOutOfRange { index: 4, size: 2 };
        assert_eq!(err.to_string(), "Index 4 out of range for array of size 2");
    }

    #[test]
    fn test_utf8_conversion() {
        let err: JsiError = String::from_utf8(vec![0xff]).unwrap_err().into();
        assert!(err.to_string().starts_with("String encoding error"));
    }

    #[test]
    fn test_assert_ok_accepts_ok() {
        assert_ok(JS_OK, "js_noop");
    }

    #[test]
    #[should_panic(expected = "js_reference_ref failed with status -2")]
    fn test_assert_ok_panics_on_failure() {
        assert_ok(otter_js_sys::JS_EINVAL, "js_reference_ref");
    }
}
