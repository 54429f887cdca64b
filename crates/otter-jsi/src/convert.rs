//! Conversion between engine handles and embedder values
//!
//! Handles are only valid inside the handle scope they were produced in.
//! Everything here assumes the caller holds a [`Scope`](crate::runtime::Scope)
//! open for as long as it uses the handles it gets back.

use std::ptr;

use otter_js_sys::*;
use tracing::warn;

use crate::bigint::BigInt;
use crate::error::{JsiResult, assert_ok};
use crate::object::Object;
use crate::reference::Reference;
use crate::runtime::Runtime;
use crate::string::JsString;
use crate::symbol::Symbol;
use crate::value::Value;

impl Runtime {
    /// Materialize `value` as a handle in the current scope
    pub(crate) fn to_native(&self, value: &Value) -> *mut js_value_t {
        let env = self.env();
        let mut handle = ptr::null_mut();
        // SAFETY: env is live and every out-pointer is a local
        let status = unsafe {
            match value {
                Value::Undefined => js_get_undefined(env, &mut handle),
                Value::Null => js_get_null(env, &mut handle),
                Value::Bool(b) => js_get_boolean(env, *b, &mut handle),
                Value::Number(n) => js_create_double(env, *n, &mut handle),
                Value::Symbol(symbol) => return symbol.handle(self),
                Value::BigInt(bigint) => return bigint.handle(self),
                Value::String(string) => return string.handle(self),
                Value::Object(object) => return object.handle(self),
            }
        };
        assert_ok(status, "value conversion");
        handle
    }

    /// Read a handle into an embedder value. Pointer kinds take a new
    /// reference so they outlive the current scope.
    #[allow(non_upper_case_globals)]
    pub(crate) fn to_embedder(&self, handle: *mut js_value_t) -> Value {
        let env = self.env();
        let mut kind = js_undefined;
        // SAFETY: handle is live in the current scope
        assert_ok(unsafe { js_typeof(env, handle, &mut kind) }, "js_typeof");

        match kind {
            js_undefined => Value::Undefined,
            js_null => Value::Null,
            js_boolean => {
                let mut b = false;
                // SAFETY: handle is a boolean
                assert_ok(unsafe { js_get_value_bool(env, handle, &mut b) }, "js_get_value_bool");
                Value::Bool(b)
            }
            js_number => {
                let mut n = 0.0;
                // SAFETY: handle is a number
                assert_ok(unsafe { js_get_value_double(env, handle, &mut n) }, "js_get_value_double");
                Value::Number(n)
            }
            js_string => Value::String(JsString::from_reference(self.capture(handle))),
            js_symbol => Value::Symbol(Symbol::from_reference(self.capture(handle))),
            js_bigint => Value::BigInt(BigInt::from_reference(self.capture(handle))),
            js_object | js_function | js_external => Value::Object(Object::from_reference(self.capture(handle))),
            other => {
                warn!(kind = other, "unknown engine value type, mapping to null");
                Value::Null
            }
        }
    }

    /// Resolve `reference` inside an escapable scope and promote the handle
    /// to the caller's scope
    pub(crate) fn escape_reference(&self, reference: &Reference) -> *mut js_value_t {
        let env = self.env();
        let mut scope = ptr::null_mut();
        // SAFETY: env is live
        assert_ok(
            unsafe { js_open_escapable_handle_scope(env, &mut scope) },
            "js_open_escapable_handle_scope",
        );
        let inner = reference.value(self);
        let mut escaped = ptr::null_mut();
        // SAFETY: scope is the innermost open scope and inner lives in it
        unsafe {
            assert_ok(js_escape_handle(env, scope, inner, &mut escaped), "js_escape_handle");
            assert_ok(js_close_escapable_handle_scope(env, scope), "js_close_escapable_handle_scope");
        }
        escaped
    }

    /// Take a counted reference to `handle`
    pub(crate) fn capture(&self, handle: *mut js_value_t) -> Reference {
        Reference::new(self, handle)
    }

    /// A string handle with the given UTF-8 content
    pub(crate) fn string_handle(&self, utf8: &[u8]) -> *mut js_value_t {
        let mut handle = ptr::null_mut();
        // SAFETY: utf8 is valid for its length
        let status = unsafe { js_create_string_utf8(self.env(), utf8.as_ptr(), utf8.len(), &mut handle) };
        assert_ok(status, "js_create_string_utf8");
        handle
    }

    /// Copy a string handle's content out: read the length, then fill.
    pub(crate) fn read_utf8(&self, handle: *mut js_value_t) -> JsiResult<String> {
        let env = self.env();
        let mut len = 0;
        // SAFETY: a null buffer asks for the byte length only
        let status = unsafe { js_get_value_string_utf8(env, handle, ptr::null_mut(), 0, &mut len) };
        self.check(status, "js_get_value_string_utf8")?;

        let mut buf = vec![0u8; len];
        let mut written = 0;
        // SAFETY: buf is writable for len bytes
        let status = unsafe { js_get_value_string_utf8(env, handle, buf.as_mut_ptr(), len, &mut written) };
        self.check(status, "js_get_value_string_utf8")?;
        buf.truncate(written);

        Ok(String::from_utf8(buf)?)
    }

    /// `String(value)`
    pub(crate) fn coerce_to_string(&self, value: &Value) -> JsiResult<JsString> {
        let _scope = self.scope();
        let handle = self.to_native(value);
        let mut string = ptr::null_mut();
        // SAFETY: handle is live in the current scope
        let status = unsafe { js_coerce_to_string(self.env(), handle, &mut string) };
        self.check(status, "js_coerce_to_string")?;
        Ok(JsString::from_reference(self.capture(string)))
    }

    /// `===` on the values behind two references
    pub(crate) fn strict_equals_references(&self, a: &Reference, b: &Reference) -> bool {
        let _scope = self.scope();
        let (a, b) = (a.value(self), b.value(self));
        let mut equal = false;
        // SAFETY: both handles are live in the current scope
        assert_ok(unsafe { js_strict_equals(self.env(), a, b, &mut equal) }, "js_strict_equals");
        equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Platform;

    #[test]
    fn test_immediates_round_trip() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let _scope = rt.scope();
        for value in [Value::Undefined, Value::Null, Value::Bool(true), Value::Number(-2.5)] {
            let back = rt.to_embedder(rt.to_native(&value));
            assert!(Value::strict_equals(&rt, &value, &back), "{value:?} changed to {back:?}");
        }
    }

    #[test]
    fn test_nan_survives_as_number() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let _scope = rt.scope();
        let back = rt.to_embedder(rt.to_native(&Value::Number(f64::NAN)));
        assert!(back.as_number().unwrap().is_nan());
    }

    #[test]
    fn test_functions_map_to_objects() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let value = rt.eval("String").unwrap();
        let object = value.as_object().unwrap();
        assert!(object.is_function(&rt));
    }

    #[test]
    fn test_read_utf8_multibyte() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let _scope = rt.scope();
        let text = "zürich → 東京";
        let handle = rt.string_handle(text.as_bytes());
        assert_eq!(rt.read_utf8(handle).unwrap(), text);
    }

    #[test]
    fn test_coerce_symbol_throws() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let symbol = rt.eval("Symbol('s')").unwrap();
        let err = symbol.to_js_string(&rt).unwrap_err();
        assert_eq!(err.as_js_error().unwrap().name(), "TypeError");
    }
}
