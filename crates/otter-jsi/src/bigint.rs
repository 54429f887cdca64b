//! BigInts

use std::ptr;

use otter_js_sys::*;

use crate::error::{JsiResult, assert_ok};
use crate::exception::JsError;
use crate::runtime::Runtime;
use crate::value::{Value, pointer_type};

pointer_type!(
    /// A JavaScript bigint
    BigInt
);

impl BigInt {
    pub fn from_i64(rt: &Runtime, value: i64) -> Self {
        let _scope = rt.scope();
        let mut handle = ptr::null_mut();
        // SAFETY: env is live
        assert_ok(
            unsafe { js_create_bigint_int64(rt.env(), value, &mut handle) },
            "js_create_bigint_int64",
        );
        Self::from_reference(rt.capture(handle))
    }

    pub fn from_u64(rt: &Runtime, value: u64) -> Self {
        let _scope = rt.scope();
        let mut handle = ptr::null_mut();
        // SAFETY: env is live
        assert_ok(
            unsafe { js_create_bigint_uint64(rt.env(), value, &mut handle) },
            "js_create_bigint_uint64",
        );
        Self::from_reference(rt.capture(handle))
    }

    /// Whether the value fits an `i64` exactly
    pub fn is_i64(&self, rt: &Runtime) -> bool {
        self.read_i64(rt).1
    }

    /// Whether the value fits a `u64` exactly
    pub fn is_u64(&self, rt: &Runtime) -> bool {
        self.read_u64(rt).1
    }

    /// Value modulo 2^64, as `i64`
    pub fn get_i64(&self, rt: &Runtime) -> i64 {
        self.read_i64(rt).0
    }

    /// Value modulo 2^64
    pub fn truncate(&self, rt: &Runtime) -> u64 {
        self.read_u64(rt).0
    }

    /// The exact value as `i64`, or a `RangeError` if it does not fit
    pub fn as_i64(&self, rt: &Runtime) -> JsiResult<i64> {
        match self.read_i64(rt) {
            (value, true) => Ok(value),
            (_, false) => Err(JsError::range_error(rt, "BigInt does not fit in int64").into()),
        }
    }

    /// The exact value as `u64`, or a `RangeError` if it does not fit
    pub fn as_u64(&self, rt: &Runtime) -> JsiResult<u64> {
        match self.read_u64(rt) {
            (value, true) => Ok(value),
            (_, false) => Err(JsError::range_error(rt, "BigInt does not fit in uint64").into()),
        }
    }

    /// Decimal digits through the engine's global `String`. Only radix 10
    /// is available.
    pub fn to_string(&self, rt: &Runtime, radix: u32) -> JsiResult<String> {
        if radix != 10 {
            return Err(JsError::range_error(rt, &format!("Unsupported BigInt radix {radix}")).into());
        }
        let string = rt.global().get_property_as_function(rt, "String")?;
        let digits = string.call(rt, &[Value::BigInt(self.clone())])?;
        digits.as_string()?.utf8(rt)
    }

    fn read_i64(&self, rt: &Runtime) -> (i64, bool) {
        let _scope = rt.scope();
        let (mut value, mut lossless) = (0, false);
        // SAFETY: the handle is a live bigint
        let status = unsafe { js_get_value_bigint_int64(rt.env(), self.handle(rt), &mut value, &mut lossless) };
        assert_ok(status, "js_get_value_bigint_int64");
        (value, lossless)
    }

    fn read_u64(&self, rt: &Runtime) -> (u64, bool) {
        let _scope = rt.scope();
        let (mut value, mut lossless) = (0, false);
        // SAFETY: the handle is a live bigint
        let status = unsafe { js_get_value_bigint_uint64(rt.env(), self.handle(rt), &mut value, &mut lossless) };
        assert_ok(status, "js_get_value_bigint_uint64");
        (value, lossless)
    }
}
