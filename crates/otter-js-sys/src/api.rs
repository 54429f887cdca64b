//! The `js_*` function family.
//!
//! Every entry point validates its pointers, returns `JS_EINVAL` for
//! malformed calls and `JS_PENDING_EXCEPTION` when it left an exception in
//! the environment's exception slot.

use std::ffi::{CStr, c_char, c_void};
use std::os::raw::c_int;
use std::ptr;
use std::rc::Rc;

use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

use crate::env::js_env_t;
use crate::event_loop::js_loop_t;
use crate::heap::{ArrayBufferData, ErrorKind, Finalizer, ObjectClass, PropertyKey, Value, Wrap};
use crate::platform::js_platform_t;
use crate::{
    JS_AUTO_LENGTH, JS_EINVAL, JS_OK, JS_PENDING_EXCEPTION, js_callback_info_t, js_delegate_callbacks_t,
    js_env_options_t, js_escapable_handle_scope_t, js_finalize_cb, js_function_cb, js_handle_scope_t, js_ref_t,
    js_type_tag_t, js_value_t, js_value_type_t,
};

macro_rules! env {
    ($env:expr) => {
        // SAFETY: callers pass null or an env created by js_create_env
        match unsafe { js_env_t::from_raw($env) } {
            Some(env) => env,
            None => return JS_EINVAL,
        }
    };
}

macro_rules! out {
    ($ptr:expr) => {
        // SAFETY: callers pass null or a writable result slot
        match unsafe { $ptr.as_mut() } {
            Some(slot) => slot,
            None => return JS_EINVAL,
        }
    };
}

macro_rules! value {
    ($env:expr, $handle:expr) => {
        match $env.handle($handle) {
            Some(value) => value,
            None => return JS_EINVAL,
        }
    };
}

macro_rules! complete {
    ($env:expr, $completion:expr) => {
        match $completion {
            Ok(value) => value,
            Err(exception) => {
                $env.set_exception(exception);
                return JS_PENDING_EXCEPTION;
            }
        }
    };
}

macro_rules! no_pending {
    ($env:expr) => {
        if $env.has_exception() {
            return JS_PENDING_EXCEPTION;
        }
    };
}

fn throw_status(env: &js_env_t, kind: ErrorKind, message: &str) -> c_int {
    env.set_exception(env.create_error(kind, message));
    JS_PENDING_EXCEPTION
}

/// Decode `len` bytes (or up to NUL for `JS_AUTO_LENGTH`) as UTF-8,
/// replacing invalid sequences.
///
/// # Safety
/// `data` must be valid for `len` bytes, or NUL-terminated for `JS_AUTO_LENGTH`.
unsafe fn utf8(data: *const u8, len: usize) -> String {
    if data.is_null() {
        return String::new();
    }
    let bytes = if len == JS_AUTO_LENGTH {
        // SAFETY: per the caller contract
        unsafe { CStr::from_ptr(data.cast::<c_char>()) }.to_bytes()
    } else {
        // SAFETY: per the caller contract
        unsafe { std::slice::from_raw_parts(data, len) }
    };
    String::from_utf8_lossy(bytes).into_owned()
}

/// # Safety
/// `argv` must be valid for `argc` handles.
unsafe fn arguments(env: &js_env_t, argc: usize, argv: *const *mut js_value_t) -> Option<Vec<Value>> {
    if argc == 0 {
        return Some(Vec::new());
    }
    if argv.is_null() {
        return None;
    }
    // SAFETY: per the caller contract
    let handles = unsafe { std::slice::from_raw_parts(argv, argc) };
    handles.iter().map(|handle| env.handle(*handle)).collect()
}

fn finalizer(cb: js_finalize_cb, data: *mut c_void, hint: *mut c_void) -> Option<Finalizer> {
    cb.map(|_| Finalizer { cb, data, hint })
}

// Environment lifecycle

/// Create an environment on `event_loop`. The environment keeps the loop
/// busy until it is destroyed and its close callback has run.
pub unsafe extern "C" fn js_create_env(
    event_loop: *mut js_loop_t,
    platform: *mut js_platform_t,
    options: *const js_env_options_t,
    result: *mut *mut js_env_t,
) -> c_int {
    let result = out!(result);
    // SAFETY: callers pass live loop and platform pointers
    let (Some(loop_ref), Some(platform_ref)) = (unsafe { event_loop.as_ref() }, unsafe { platform.as_ref() })
    else {
        return JS_EINVAL;
    };
    // SAFETY: options is null or points to a valid options struct
    let options = unsafe { options.as_ref() }.copied().unwrap_or_default();

    let expose_gc = options.expose_garbage_collection || platform_ref.options.expose_garbage_collection;
    let env = js_env_t::new(
        event_loop,
        platform,
        options,
        expose_gc,
        platform_ref.options.trace_garbage_collection,
    );

    loop_ref.ref_handle();
    platform_ref.envs.set(platform_ref.envs.get() + 1);
    *result = Box::into_raw(Box::new(env));
    JS_OK
}

/// Finalize every object of the environment and schedule its release on
/// the loop.
pub unsafe extern "C" fn js_destroy_env(env: *mut js_env_t) -> c_int {
    env!(env);
    // SAFETY: the env is live and not yet destroyed
    unsafe { js_env_t::destroy(env) };
    JS_OK
}

/// Run a full collection now. Finalizers of collected objects are queued on
/// the loop.
pub unsafe extern "C" fn js_request_garbage_collection(env: *mut js_env_t) -> c_int {
    env!(env).collect_garbage();
    JS_OK
}

// Handle scopes

pub unsafe extern "C" fn js_open_handle_scope(env: *mut js_env_t, result: *mut *mut js_handle_scope_t) -> c_int {
    let env = env!(env);
    *out!(result) = env.open_scope(false);
    JS_OK
}

pub unsafe extern "C" fn js_close_handle_scope(env: *mut js_env_t, scope: *mut js_handle_scope_t) -> c_int {
    if env!(env).close_scope(scope) { JS_OK } else { JS_EINVAL }
}

pub unsafe extern "C" fn js_open_escapable_handle_scope(
    env: *mut js_env_t,
    result: *mut *mut js_escapable_handle_scope_t,
) -> c_int {
    let env = env!(env);
    *out!(result) = env.open_scope(true).cast();
    JS_OK
}

pub unsafe extern "C" fn js_close_escapable_handle_scope(
    env: *mut js_env_t,
    scope: *mut js_escapable_handle_scope_t,
) -> c_int {
    if env!(env).close_scope(scope.cast()) { JS_OK } else { JS_EINVAL }
}

/// Promote `escapee` into the parent of `scope`. Each escapable scope may
/// escape a single value.
pub unsafe extern "C" fn js_escape_handle(
    env: *mut js_env_t,
    scope: *mut js_escapable_handle_scope_t,
    escapee: *mut js_value_t,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    let value = value!(env, escapee);
    match env.escape(scope.cast(), value) {
        Some(handle) => {
            *result = handle;
            JS_OK
        }
        None => JS_EINVAL,
    }
}

// References

/// Create a reference with an initial `count`. A count of zero makes the
/// reference weak: it no longer keeps the value alive.
pub unsafe extern "C" fn js_create_reference(
    env: *mut js_env_t,
    value: *mut js_value_t,
    count: u32,
    result: *mut *mut js_ref_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    let value = value!(env, value);
    *result = env.create_reference(value, count);
    JS_OK
}

pub unsafe extern "C" fn js_delete_reference(env: *mut js_env_t, reference: *mut js_ref_t) -> c_int {
    if env!(env).delete_reference(reference) { JS_OK } else { JS_EINVAL }
}

pub unsafe extern "C" fn js_reference_ref(env: *mut js_env_t, reference: *mut js_ref_t, result: *mut u32) -> c_int {
    let env = env!(env);
    let Some(count) = env.reference_ref(reference) else {
        return JS_EINVAL;
    };
    // SAFETY: result is null or writable
    if let Some(result) = unsafe { result.as_mut() } {
        *result = count;
    }
    JS_OK
}

/// Decrement the count of `reference`. Fails if the count is already zero.
pub unsafe extern "C" fn js_reference_unref(env: *mut js_env_t, reference: *mut js_ref_t, result: *mut u32) -> c_int {
    let env = env!(env);
    let Some(count) = env.reference_unref(reference) else {
        return JS_EINVAL;
    };
    // SAFETY: result is null or writable
    if let Some(result) = unsafe { result.as_mut() } {
        *result = count;
    }
    JS_OK
}

/// Read the referenced value. Writes a null handle once a weak reference's
/// value has been collected.
pub unsafe extern "C" fn js_get_reference_value(
    env: *mut js_env_t,
    reference: *mut js_ref_t,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    match env.reference_value(reference) {
        Some(Some(value)) => *result = env.push_handle(value),
        Some(None) => *result = ptr::null_mut(),
        None => return JS_EINVAL,
    }
    JS_OK
}

// Scripts

/// Evaluate `source` (a string value) and produce its completion value.
pub unsafe extern "C" fn js_run_script(
    env: *mut js_env_t,
    file: *const c_char,
    len: usize,
    source: *mut js_value_t,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    no_pending!(env);
    let Value::String(source) = value!(env, source) else {
        return JS_EINVAL;
    };
    // SAFETY: file is valid for len bytes or NUL-terminated
    let file = unsafe { utf8(file.cast(), len) };
    let value = complete!(env, crate::script::run(env, &file, &source));
    *result = env.push_handle(value);
    JS_OK
}

// Primitives

pub unsafe extern "C" fn js_get_undefined(env: *mut js_env_t, result: *mut *mut js_value_t) -> c_int {
    let env = env!(env);
    *out!(result) = env.push_handle(Value::Undefined);
    JS_OK
}

pub unsafe extern "C" fn js_get_null(env: *mut js_env_t, result: *mut *mut js_value_t) -> c_int {
    let env = env!(env);
    *out!(result) = env.push_handle(Value::Null);
    JS_OK
}

pub unsafe extern "C" fn js_get_boolean(env: *mut js_env_t, value: bool, result: *mut *mut js_value_t) -> c_int {
    let env = env!(env);
    *out!(result) = env.push_handle(Value::Bool(value));
    JS_OK
}

pub unsafe extern "C" fn js_get_global(env: *mut js_env_t, result: *mut *mut js_value_t) -> c_int {
    let env = env!(env);
    *out!(result) = env.push_handle(Value::Object(env.intrinsics.global));
    JS_OK
}

pub unsafe extern "C" fn js_create_double(env: *mut js_env_t, value: f64, result: *mut *mut js_value_t) -> c_int {
    let env = env!(env);
    *out!(result) = env.push_handle(Value::Number(value));
    JS_OK
}

pub unsafe extern "C" fn js_get_value_bool(env: *mut js_env_t, value: *mut js_value_t, result: *mut bool) -> c_int {
    let env = env!(env);
    let result = out!(result);
    match value!(env, value) {
        Value::Bool(b) => {
            *result = b;
            JS_OK
        }
        _ => JS_EINVAL,
    }
}

pub unsafe extern "C" fn js_get_value_double(env: *mut js_env_t, value: *mut js_value_t, result: *mut f64) -> c_int {
    let env = env!(env);
    let result = out!(result);
    match value!(env, value) {
        Value::Number(n) => {
            *result = n;
            JS_OK
        }
        _ => JS_EINVAL,
    }
}

pub unsafe extern "C" fn js_typeof(env: *mut js_env_t, value: *mut js_value_t, result: *mut js_value_type_t) -> c_int {
    let env = env!(env);
    let result = out!(result);
    *result = env.type_of(&value!(env, value));
    JS_OK
}

pub unsafe extern "C" fn js_strict_equals(
    env: *mut js_env_t,
    a: *mut js_value_t,
    b: *mut js_value_t,
    result: *mut bool,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    *result = env.strict_equals(&value!(env, a), &value!(env, b));
    JS_OK
}

pub unsafe extern "C" fn js_instanceof(
    env: *mut js_env_t,
    object: *mut js_value_t,
    constructor: *mut js_value_t,
    result: *mut bool,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    no_pending!(env);
    let (object, constructor) = (value!(env, object), value!(env, constructor));
    *result = complete!(env, env.instance_of(&object, &constructor));
    JS_OK
}

// Strings

/// Create a string from `len` UTF-8 bytes, or up to the first NUL when
/// `len` is `JS_AUTO_LENGTH`.
pub unsafe extern "C" fn js_create_string_utf8(
    env: *mut js_env_t,
    data: *const u8,
    len: usize,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    if data.is_null() && len != 0 && len != JS_AUTO_LENGTH {
        return JS_EINVAL;
    }
    // SAFETY: data is valid for len bytes or NUL-terminated
    let string = unsafe { utf8(data, len) };
    *result = env.push_handle(Value::String(Rc::from(string)));
    JS_OK
}

/// Copy a string's UTF-8 bytes into `buf`.
///
/// With a null `buf`, writes the full byte length to `result`. Otherwise
/// copies at most `len` bytes, NUL-terminates when room remains and writes
/// the number of bytes copied.
pub unsafe extern "C" fn js_get_value_string_utf8(
    env: *mut js_env_t,
    value: *mut js_value_t,
    buf: *mut u8,
    len: usize,
    result: *mut usize,
) -> c_int {
    let env = env!(env);
    let Value::String(string) = value!(env, value) else {
        return JS_EINVAL;
    };
    let bytes = string.as_bytes();

    if buf.is_null() {
        *out!(result) = bytes.len();
        return JS_OK;
    }

    let copied = bytes.len().min(len);
    // SAFETY: buf is writable for len bytes
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), buf, copied);
        if copied < len {
            *buf.add(copied) = 0;
        }
    }
    // SAFETY: result is null or writable
    if let Some(result) = unsafe { result.as_mut() } {
        *result = copied;
    }
    JS_OK
}

/// `String(value)` semantics minus symbol description: symbols throw.
pub unsafe extern "C" fn js_coerce_to_string(
    env: *mut js_env_t,
    value: *mut js_value_t,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    no_pending!(env);
    let value = value!(env, value);
    let string = complete!(env, env.to_string(&value));
    *result = env.push_handle(Value::String(string));
    JS_OK
}

// BigInts

pub unsafe extern "C" fn js_create_bigint_int64(env: *mut js_env_t, value: i64, result: *mut *mut js_value_t) -> c_int {
    let env = env!(env);
    *out!(result) = env.push_handle(Value::BigInt(Rc::new(BigInt::from(value))));
    JS_OK
}

pub unsafe extern "C" fn js_create_bigint_uint64(env: *mut js_env_t, value: u64, result: *mut *mut js_value_t) -> c_int {
    let env = env!(env);
    *out!(result) = env.push_handle(Value::BigInt(Rc::new(BigInt::from(value))));
    JS_OK
}

/// Low 64 bits of the two's complement representation of `value`.
fn low_u64(value: &BigInt) -> u64 {
    let (sign, digits) = value.to_u64_digits();
    let low = digits.first().copied().unwrap_or(0);
    if sign == Sign::Minus { low.wrapping_neg() } else { low }
}

/// Read a bigint as `i64`, truncating modulo 2^64. `lossless` (nullable)
/// reports whether the value fit.
pub unsafe extern "C" fn js_get_value_bigint_int64(
    env: *mut js_env_t,
    value: *mut js_value_t,
    result: *mut i64,
    lossless: *mut bool,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    let Value::BigInt(bigint) = value!(env, value) else {
        return JS_EINVAL;
    };
    *result = low_u64(&bigint) as i64;
    // SAFETY: lossless is null or writable
    if let Some(lossless) = unsafe { lossless.as_mut() } {
        *lossless = bigint.to_i64().is_some();
    }
    JS_OK
}

/// Read a bigint as `u64`, truncating modulo 2^64. `lossless` (nullable)
/// reports whether the value fit.
pub unsafe extern "C" fn js_get_value_bigint_uint64(
    env: *mut js_env_t,
    value: *mut js_value_t,
    result: *mut u64,
    lossless: *mut bool,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    let Value::BigInt(bigint) = value!(env, value) else {
        return JS_EINVAL;
    };
    *result = low_u64(&bigint);
    // SAFETY: lossless is null or writable
    if let Some(lossless) = unsafe { lossless.as_mut() } {
        *lossless = bigint.to_u64().is_some();
    }
    JS_OK
}

// Objects and properties

pub unsafe extern "C" fn js_create_object(env: *mut js_env_t, result: *mut *mut js_value_t) -> c_int {
    let env = env!(env);
    *out!(result) = env.push_handle(env.alloc(ObjectClass::Ordinary));
    JS_OK
}

pub unsafe extern "C" fn js_get_property(
    env: *mut js_env_t,
    object: *mut js_value_t,
    key: *mut js_value_t,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    no_pending!(env);
    let (object, key) = (value!(env, object), value!(env, key));
    let key = complete!(env, env.to_property_key(&key));
    let value = complete!(env, env.get(&object, &key));
    *result = env.push_handle(value);
    JS_OK
}

pub unsafe extern "C" fn js_set_property(
    env: *mut js_env_t,
    object: *mut js_value_t,
    key: *mut js_value_t,
    value: *mut js_value_t,
) -> c_int {
    let env = env!(env);
    no_pending!(env);
    let (object, key, value) = (value!(env, object), value!(env, key), value!(env, value));
    let key = complete!(env, env.to_property_key(&key));
    complete!(env, env.set(&object, key, value));
    JS_OK
}

pub unsafe extern "C" fn js_has_property(
    env: *mut js_env_t,
    object: *mut js_value_t,
    key: *mut js_value_t,
    result: *mut bool,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    no_pending!(env);
    let (object, key) = (value!(env, object), value!(env, key));
    let key = complete!(env, env.to_property_key(&key));
    *result = complete!(env, env.has(&object, &key));
    JS_OK
}

pub unsafe extern "C" fn js_delete_property(
    env: *mut js_env_t,
    object: *mut js_value_t,
    key: *mut js_value_t,
    result: *mut bool,
) -> c_int {
    let env = env!(env);
    no_pending!(env);
    let (object, key) = (value!(env, object), value!(env, key));
    let key = complete!(env, env.to_property_key(&key));
    let deleted = complete!(env, env.delete(&object, &key));
    // SAFETY: result is null or writable
    if let Some(result) = unsafe { result.as_mut() } {
        *result = deleted;
    }
    JS_OK
}

pub unsafe extern "C" fn js_set_named_property(
    env: *mut js_env_t,
    object: *mut js_value_t,
    name: *const c_char,
    value: *mut js_value_t,
) -> c_int {
    let env = env!(env);
    no_pending!(env);
    let (object, value) = (value!(env, object), value!(env, value));
    // SAFETY: name is NUL-terminated
    let name = unsafe { utf8(name.cast(), JS_AUTO_LENGTH) };
    complete!(env, env.set(&object, PropertyKey::named(&name), value));
    JS_OK
}

/// Own enumerable string keys of `object` as an array.
pub unsafe extern "C" fn js_get_property_names(
    env: *mut js_env_t,
    object: *mut js_value_t,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    no_pending!(env);
    let object = value!(env, object);
    let keys = complete!(env, env.own_keys(&object));
    *result = env.push_handle(env.alloc(ObjectClass::Array(keys)));
    JS_OK
}

// Arrays

pub unsafe extern "C" fn js_create_array_with_length(
    env: *mut js_env_t,
    len: usize,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    if len > u32::MAX as usize {
        return throw_status(env, ErrorKind::RangeError, "Invalid array length");
    }
    *result = env.push_handle(env.alloc(ObjectClass::Array(vec![Value::Undefined; len])));
    JS_OK
}

pub unsafe extern "C" fn js_is_array(env: *mut js_env_t, value: *mut js_value_t, result: *mut bool) -> c_int {
    let env = env!(env);
    let result = out!(result);
    let value = value!(env, value);
    *result = env
        .with_object(&value, |data| matches!(data.class, ObjectClass::Array(_)))
        .unwrap_or(false);
    JS_OK
}

pub unsafe extern "C" fn js_get_array_length(env: *mut js_env_t, array: *mut js_value_t, result: *mut u32) -> c_int {
    let env = env!(env);
    let result = out!(result);
    let array = value!(env, array);
    let length = env
        .with_object(&array, |data| match &data.class {
            ObjectClass::Array(elements) => Some(elements.len()),
            _ => None,
        })
        .flatten();
    match length {
        Some(length) => {
            *result = length as u32;
            JS_OK
        }
        None => JS_EINVAL,
    }
}

pub unsafe extern "C" fn js_get_element(
    env: *mut js_env_t,
    object: *mut js_value_t,
    index: u32,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    no_pending!(env);
    let object = value!(env, object);
    let value = complete!(env, env.get(&object, &PropertyKey::named(&index.to_string())));
    *result = env.push_handle(value);
    JS_OK
}

pub unsafe extern "C" fn js_set_element(
    env: *mut js_env_t,
    object: *mut js_value_t,
    index: u32,
    value: *mut js_value_t,
) -> c_int {
    let env = env!(env);
    no_pending!(env);
    let (object, value) = (value!(env, object), value!(env, value));
    complete!(env, env.set(&object, PropertyKey::named(&index.to_string()), value));
    JS_OK
}

// Array buffers

/// Create a zero-filled, engine-owned buffer. `data` (nullable) receives
/// its backing store.
pub unsafe extern "C" fn js_create_arraybuffer(
    env: *mut js_env_t,
    len: usize,
    data: *mut *mut c_void,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    let buffer = env.alloc(ObjectClass::ArrayBuffer(ArrayBufferData::Owned(
        vec![0; len].into_boxed_slice(),
    )));
    // SAFETY: data is null or writable
    if let Some(data) = unsafe { data.as_mut() } {
        *data = env
            .array_buffer_info(&buffer)
            .map_or(ptr::null_mut(), |(bytes, _)| bytes.cast());
    }
    *result = env.push_handle(buffer);
    JS_OK
}

/// Create a buffer over embedder memory. `finalize_cb` runs once the buffer
/// is collected or the environment is destroyed.
pub unsafe extern "C" fn js_create_external_arraybuffer(
    env: *mut js_env_t,
    data: *mut c_void,
    len: usize,
    finalize_cb: js_finalize_cb,
    finalize_hint: *mut c_void,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    if data.is_null() && len != 0 {
        return JS_EINVAL;
    }
    let buffer = env.alloc(ObjectClass::ArrayBuffer(ArrayBufferData::External {
        data: data.cast(),
        len,
    }));
    if let Some(finalizer) = finalizer(finalize_cb, data, finalize_hint) {
        env.add_finalizer(&buffer, finalizer);
    }
    *result = env.push_handle(buffer);
    JS_OK
}

pub unsafe extern "C" fn js_is_arraybuffer(env: *mut js_env_t, value: *mut js_value_t, result: *mut bool) -> c_int {
    let env = env!(env);
    let result = out!(result);
    let value = value!(env, value);
    *result = env
        .with_object(&value, |data| matches!(data.class, ObjectClass::ArrayBuffer(_)))
        .unwrap_or(false);
    JS_OK
}

/// `data` and `len` are both nullable.
pub unsafe extern "C" fn js_get_arraybuffer_info(
    env: *mut js_env_t,
    arraybuffer: *mut js_value_t,
    data: *mut *mut c_void,
    len: *mut usize,
) -> c_int {
    let env = env!(env);
    let buffer = value!(env, arraybuffer);
    let Some((bytes, size)) = env.array_buffer_info(&buffer) else {
        return JS_EINVAL;
    };
    // SAFETY: data and len are null or writable
    unsafe {
        if let Some(data) = data.as_mut() {
            *data = bytes.cast();
        }
        if let Some(len) = len.as_mut() {
            *len = size;
        }
    }
    JS_OK
}

// Functions

pub unsafe extern "C" fn js_create_function(
    env: *mut js_env_t,
    name: *const c_char,
    len: usize,
    cb: js_function_cb,
    data: *mut c_void,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    if cb.is_none() {
        return JS_EINVAL;
    }
    // SAFETY: name is valid for len bytes or NUL-terminated
    let name = unsafe { utf8(name.cast(), len) };
    *result = env.push_handle(env.alloc_function(cb, data, &name));
    JS_OK
}

pub unsafe extern "C" fn js_call_function(
    env: *mut js_env_t,
    receiver: *mut js_value_t,
    function: *mut js_value_t,
    argc: usize,
    argv: *const *mut js_value_t,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    no_pending!(env);
    let (receiver, function) = (value!(env, receiver), value!(env, function));
    // SAFETY: argv is valid for argc handles
    let Some(args) = (unsafe { arguments(env, argc, argv) }) else {
        return JS_EINVAL;
    };
    let value = complete!(env, env.call(&function, receiver, &args));
    // SAFETY: result is null or writable
    if let Some(result) = unsafe { result.as_mut() } {
        *result = env.push_handle(value);
    }
    JS_OK
}

pub unsafe extern "C" fn js_new_instance(
    env: *mut js_env_t,
    constructor: *mut js_value_t,
    argc: usize,
    argv: *const *mut js_value_t,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    no_pending!(env);
    let constructor = value!(env, constructor);
    // SAFETY: argv is valid for argc handles
    let Some(args) = (unsafe { arguments(env, argc, argv) }) else {
        return JS_EINVAL;
    };
    let value = complete!(env, env.construct(&constructor, &args));
    *result = env.push_handle(value);
    JS_OK
}

/// Read the arguments of a native call.
///
/// `argc` is in/out: on input the capacity of `argv`, on output the actual
/// argument count. `argv` is filled up to its capacity and padded with
/// `undefined`. Every out pointer is nullable.
pub unsafe extern "C" fn js_get_callback_info(
    env: *mut js_env_t,
    info: *const js_callback_info_t,
    argc: *mut usize,
    argv: *mut *mut js_value_t,
    receiver: *mut *mut js_value_t,
    data: *mut *mut c_void,
) -> c_int {
    let env = env!(env);
    // SAFETY: info comes from the engine for the duration of the callback
    let Some(info) = (unsafe { info.as_ref() }) else {
        return JS_EINVAL;
    };

    // SAFETY: every out pointer is null or writable; argv holds *argc slots
    unsafe {
        if let Some(argc) = argc.as_mut() {
            if !argv.is_null() {
                for index in 0..*argc {
                    *argv.add(index) = match info.args.get(index) {
                        Some(handle) => *handle,
                        None => env.push_handle(Value::Undefined),
                    };
                }
            }
            *argc = info.args.len();
        }
        if let Some(receiver) = receiver.as_mut() {
            *receiver = info.receiver;
        }
        if let Some(data) = data.as_mut() {
            *data = info.data;
        }
    }
    JS_OK
}

// Wrapping and type tags

/// Attach native `data` to `object`. Throws if the object is already wrapped.
pub unsafe extern "C" fn js_wrap(
    env: *mut js_env_t,
    object: *mut js_value_t,
    data: *mut c_void,
    finalize_cb: js_finalize_cb,
    finalize_hint: *mut c_void,
) -> c_int {
    let env = env!(env);
    let object = value!(env, object);
    let wrapped = env.with_object_mut(&object, |target| {
        if target.wrap.is_some() {
            return false;
        }
        target.wrap = Some(Wrap {
            data,
            finalizer: finalizer(finalize_cb, data, finalize_hint),
        });
        true
    });
    match wrapped {
        Some(true) => JS_OK,
        Some(false) => throw_status(env, ErrorKind::Error, "Object is already wrapped"),
        None => JS_EINVAL,
    }
}

/// Read the data attached by `js_wrap`. Throws if the object is not wrapped.
pub unsafe extern "C" fn js_unwrap(env: *mut js_env_t, object: *mut js_value_t, result: *mut *mut c_void) -> c_int {
    let env = env!(env);
    let result = out!(result);
    let object = value!(env, object);
    match env.with_object(&object, |target| target.wrap.as_ref().map(|wrap| wrap.data)) {
        Some(Some(data)) => {
            *result = data;
            JS_OK
        }
        Some(None) => throw_status(env, ErrorKind::Error, "Object is not wrapped"),
        None => JS_EINVAL,
    }
}

/// Detach wrapped data without running its finalizer.
pub unsafe extern "C" fn js_remove_wrap(env: *mut js_env_t, object: *mut js_value_t, result: *mut *mut c_void) -> c_int {
    let env = env!(env);
    let object = value!(env, object);
    match env.with_object_mut(&object, |target| target.wrap.take()) {
        Some(Some(wrap)) => {
            // SAFETY: result is null or writable
            if let Some(result) = unsafe { result.as_mut() } {
                *result = wrap.data;
            }
            JS_OK
        }
        Some(None) => throw_status(env, ErrorKind::Error, "Object is not wrapped"),
        None => JS_EINVAL,
    }
}

/// Tag `object`. Throws if the object already carries a tag.
pub unsafe extern "C" fn js_add_type_tag(
    env: *mut js_env_t,
    object: *mut js_value_t,
    tag: *const js_type_tag_t,
) -> c_int {
    let env = env!(env);
    // SAFETY: tag is null or readable
    let Some(tag) = (unsafe { tag.as_ref() }).copied() else {
        return JS_EINVAL;
    };
    let object = value!(env, object);
    let tagged = env.with_object_mut(&object, |target| {
        if target.type_tag.is_some() {
            return false;
        }
        target.type_tag = Some(tag);
        true
    });
    match tagged {
        Some(true) => JS_OK,
        Some(false) => throw_status(env, ErrorKind::TypeError, "Object is already type tagged"),
        None => JS_EINVAL,
    }
}

pub unsafe extern "C" fn js_check_type_tag(
    env: *mut js_env_t,
    value: *mut js_value_t,
    tag: *const js_type_tag_t,
    result: *mut bool,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    // SAFETY: tag is null or readable
    let Some(tag) = (unsafe { tag.as_ref() }) else {
        return JS_EINVAL;
    };
    let value = value!(env, value);
    *result = env
        .with_object(&value, |target| target.type_tag.as_ref() == Some(tag))
        .unwrap_or(false);
    JS_OK
}

// Delegates and externals

/// Create an object whose property access is routed through `callbacks`.
pub unsafe extern "C" fn js_create_delegate(
    env: *mut js_env_t,
    callbacks: *const js_delegate_callbacks_t,
    data: *mut c_void,
    finalize_cb: js_finalize_cb,
    finalize_hint: *mut c_void,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    // SAFETY: callbacks is null or readable
    let Some(callbacks) = (unsafe { callbacks.as_ref() }).copied() else {
        return JS_EINVAL;
    };
    let delegate = env.alloc(ObjectClass::Delegate { callbacks, data });
    if let Some(finalizer) = finalizer(finalize_cb, data, finalize_hint) {
        env.add_finalizer(&delegate, finalizer);
    }
    *result = env.push_handle(delegate);
    JS_OK
}

pub unsafe extern "C" fn js_create_external(
    env: *mut js_env_t,
    data: *mut c_void,
    finalize_cb: js_finalize_cb,
    finalize_hint: *mut c_void,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    let external = env.alloc(ObjectClass::External(data));
    if let Some(finalizer) = finalizer(finalize_cb, data, finalize_hint) {
        env.add_finalizer(&external, finalizer);
    }
    *result = env.push_handle(external);
    JS_OK
}

// Errors and exceptions

unsafe fn create_error(
    env: *mut js_env_t,
    kind: ErrorKind,
    code: *mut js_value_t,
    message: *mut js_value_t,
    result: *mut *mut js_value_t,
) -> c_int {
    let env = env!(env);
    let result = out!(result);
    let Value::String(message) = value!(env, message) else {
        return JS_EINVAL;
    };
    let error = env.create_error(kind, &message);
    if let Some(code) = env.handle(code) {
        complete!(env, env.set(&error, PropertyKey::named("code"), code));
    }
    *result = env.push_handle(error);
    JS_OK
}

/// Create an `Error`. `code` is nullable; `message` must be a string.
pub unsafe extern "C" fn js_create_error(
    env: *mut js_env_t,
    code: *mut js_value_t,
    message: *mut js_value_t,
    result: *mut *mut js_value_t,
) -> c_int {
    // SAFETY: forwarded caller contract
    unsafe { create_error(env, ErrorKind::Error, code, message, result) }
}

pub unsafe extern "C" fn js_create_type_error(
    env: *mut js_env_t,
    code: *mut js_value_t,
    message: *mut js_value_t,
    result: *mut *mut js_value_t,
) -> c_int {
    // SAFETY: forwarded caller contract
    unsafe { create_error(env, ErrorKind::TypeError, code, message, result) }
}

pub unsafe extern "C" fn js_create_range_error(
    env: *mut js_env_t,
    code: *mut js_value_t,
    message: *mut js_value_t,
    result: *mut *mut js_value_t,
) -> c_int {
    // SAFETY: forwarded caller contract
    unsafe { create_error(env, ErrorKind::RangeError, code, message, result) }
}

pub unsafe extern "C" fn js_is_error(env: *mut js_env_t, value: *mut js_value_t, result: *mut bool) -> c_int {
    let env = env!(env);
    let result = out!(result);
    let value = value!(env, value);
    let error_prototype = env.intrinsics.error_prototype(ErrorKind::Error);
    let heap = env.heap.borrow();
    let mut current = value.as_object();
    let mut found = false;
    while let Some(id) = current {
        let Some(data) = heap.object(id) else { break };
        if matches!(data.class, ObjectClass::Error) || id == error_prototype {
            found = true;
            break;
        }
        current = data.prototype;
    }
    *result = found;
    JS_OK
}

/// Throw `error`. Always returns `JS_OK`; the exception is now pending.
pub unsafe extern "C" fn js_throw(env: *mut js_env_t, error: *mut js_value_t) -> c_int {
    let env = env!(env);
    let error = value!(env, error);
    env.set_exception(error);
    JS_OK
}

/// Throw a new `Error` with a NUL-terminated `message` and optional `code`.
pub unsafe extern "C" fn js_throw_error(env: *mut js_env_t, code: *const c_char, message: *const c_char) -> c_int {
    let env = env!(env);
    // SAFETY: message and code are null or NUL-terminated
    let message = unsafe { utf8(message.cast(), JS_AUTO_LENGTH) };
    let error = env.create_error(ErrorKind::Error, &message);
    if !code.is_null() {
        // SAFETY: code is NUL-terminated
        let code = unsafe { utf8(code.cast(), JS_AUTO_LENGTH) };
        complete!(env, env.set(&error, PropertyKey::named("code"), Value::String(Rc::from(code))));
    }
    env.set_exception(error);
    JS_OK
}

pub unsafe extern "C" fn js_is_exception_pending(env: *mut js_env_t, result: *mut bool) -> c_int {
    let env = env!(env);
    *out!(result) = env.has_exception();
    JS_OK
}

/// Take the pending exception, leaving none. Produces `undefined` when
/// nothing is pending.
pub unsafe extern "C" fn js_get_and_clear_last_exception(env: *mut js_env_t, result: *mut *mut js_value_t) -> c_int {
    let env = env!(env);
    let result = out!(result);
    let exception = env.take_exception().unwrap_or(Value::Undefined);
    *result = env.push_handle(exception);
    JS_OK
}
