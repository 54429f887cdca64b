//! Moving exceptions between the engine and embedder code
//!
//! A pending engine exception becomes [`JsiError::Js`] the moment a bridge
//! call observes it, and the engine's slot is cleared. In the other
//! direction, an error returned from a host callback is thrown back into the
//! engine before the callback returns: a thrown script value is rethrown
//! as-is, anything else becomes a fresh `Error` carrying the message.

use std::os::raw::c_int;
use std::ptr;

use otter_js_sys::*;
use thiserror::Error;
use tracing::trace;

use crate::error::{JsiError, JsiResult, assert_ok};
use crate::runtime::Runtime;
use crate::value::Value;

type CreateErrorFn = unsafe extern "C" fn(
    *mut js_env_t,
    *mut js_value_t,
    *mut js_value_t,
    *mut *mut js_value_t,
) -> c_int;

/// An exception thrown by script or by the engine
///
/// Keeps the thrown value alongside the details read from it when it was
/// caught, so it can be inspected or rethrown unchanged.
#[derive(Debug, Clone, Error)]
#[error("{name}: {message}")]
pub struct JsError {
    value: Value,
    name: String,
    message: String,
    stack: Option<String>,
}

impl JsError {
    /// A new `Error` object with `message`
    pub fn new(rt: &Runtime, message: &str) -> Self {
        Self::create(rt, js_create_error, message)
    }

    /// A new `TypeError` object with `message`
    pub fn type_error(rt: &Runtime, message: &str) -> Self {
        Self::create(rt, js_create_type_error, message)
    }

    /// A new `RangeError` object with `message`
    pub fn range_error(rt: &Runtime, message: &str) -> Self {
        Self::create(rt, js_create_range_error, message)
    }

    fn create(rt: &Runtime, constructor: CreateErrorFn, message: &str) -> Self {
        let _scope = rt.scope();
        let message = rt.string_handle(message.as_bytes());
        let mut error = ptr::null_mut();
        // SAFETY: message is a live string handle; the code is optional
        let status = unsafe { constructor(rt.env(), ptr::null_mut(), message, &mut error) };
        assert_ok(status, "js_create_error");
        Self::from_value(rt, rt.to_embedder(error))
    }

    /// Wrap a thrown value, reading its name, message and stack.
    ///
    /// Non-object values (`throw 'nope'`) are reported as `Error` with the
    /// value's string form as the message.
    pub fn from_value(rt: &Runtime, value: Value) -> Self {
        let (name, message, stack) = match &value {
            Value::Object(object) => {
                let name = object
                    .get_property(rt, "name")
                    .ok()
                    .and_then(|name| string_of(rt, &name))
                    .unwrap_or_else(|| "Error".to_string());
                let message = object
                    .get_property(rt, "message")
                    .ok()
                    .and_then(|message| string_of(rt, &message))
                    .or_else(|| describe(rt, &value))
                    .unwrap_or_else(|| "Unknown error".to_string());
                let stack = object.get_property(rt, "stack").ok().and_then(|stack| string_of(rt, &stack));
                (name, message, stack)
            }
            other => {
                let message = describe(rt, other).unwrap_or_else(|| "Unknown error".to_string());
                ("Error".to_string(), message, None)
            }
        };

        Self {
            value,
            name,
            message,
            stack,
        }
    }

    /// The thrown value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Constructor name, e.g. `TypeError`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }
}

fn string_of(rt: &Runtime, value: &Value) -> Option<String> {
    value.as_string().ok().and_then(|s| s.utf8(rt).ok())
}

fn describe(rt: &Runtime, value: &Value) -> Option<String> {
    value.to_js_string(rt).ok().and_then(|s| s.utf8(rt).ok())
}

impl Runtime {
    /// Map an engine status to a result, taking the pending exception when
    /// there is one.
    pub(crate) fn check(&self, status: c_int, operation: &str) -> JsiResult<()> {
        match status {
            JS_OK => Ok(()),
            JS_PENDING_EXCEPTION => Err(JsiError::Js(self.take_exception())),
            status => Err(JsiError::native(format!("{operation} failed with status {status}"))),
        }
    }

    fn take_exception(&self) -> JsError {
        let _scope = self.scope();
        let mut exception = ptr::null_mut();
        // SAFETY: env is live
        let status = unsafe { js_get_and_clear_last_exception(self.env(), &mut exception) };
        assert_ok(status, "js_get_and_clear_last_exception");
        let error = JsError::from_value(self, self.to_embedder(exception));
        trace!(name = error.name(), message = error.message(), "caught engine exception");
        error
    }

    /// Leave `error` pending in the engine. Used by host callbacks right
    /// before they hand control back to script.
    pub(crate) fn throw_into_engine(&self, error: JsiError) {
        let _scope = self.scope();
        let exception = match error {
            JsiError::Js(error) => self.to_native(error.value()),
            other => {
                let message = other.message();
                trace!(%message, "throwing host error into engine");
                let js = JsError::new(self, &message);
                self.to_native(js.value())
            }
        };
        // SAFETY: exception is a live handle in the current scope
        let status = unsafe { js_throw(self.env(), exception) };
        assert_ok(status, "js_throw");
    }
}
