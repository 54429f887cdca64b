//! End-to-end tests of the engine surface through the public `js_*` API.

use std::cell::Cell;
use std::ffi::{CStr, c_void};
use std::ptr;

use otter_js_sys::*;

struct Harness {
    event_loop: Box<js_loop_t>,
    platform: *mut js_platform_t,
    env: *mut js_env_t,
}

impl Harness {
    fn new() -> Self {
        Self::with_options(js_env_options_t {
            expose_garbage_collection: true,
            ..Default::default()
        })
    }

    fn with_options(options: js_env_options_t) -> Self {
        let mut event_loop = Box::new(js_loop_t::default());
        let mut platform = ptr::null_mut();
        let mut env = ptr::null_mut();
        unsafe {
            assert_eq!(js_loop_init(&mut *event_loop), JS_OK);
            assert_eq!(js_create_platform(&mut *event_loop, ptr::null(), &mut platform), JS_OK);
            assert_eq!(js_create_env(&mut *event_loop, platform, &options, &mut env), JS_OK);
        }
        Self {
            event_loop,
            platform,
            env,
        }
    }

    fn string(&self, s: &str) -> *mut js_value_t {
        let mut result = ptr::null_mut();
        unsafe {
            assert_eq!(js_create_string_utf8(self.env, s.as_ptr(), s.len(), &mut result), JS_OK);
        }
        result
    }

    fn read_string(&self, value: *mut js_value_t) -> String {
        unsafe {
            let mut len = 0;
            assert_eq!(js_get_value_string_utf8(self.env, value, ptr::null_mut(), 0, &mut len), JS_OK);
            let mut buf = vec![0u8; len];
            let mut written = 0;
            assert_eq!(
                js_get_value_string_utf8(self.env, value, buf.as_mut_ptr(), len, &mut written),
                JS_OK
            );
            assert_eq!(written, len);
            String::from_utf8(buf).unwrap()
        }
    }

    fn eval(&self, source: &str) -> Result<*mut js_value_t, *mut js_value_t> {
        let source = self.string(source);
        let mut result = ptr::null_mut();
        unsafe {
            match js_run_script(self.env, c"test.js".as_ptr(), JS_AUTO_LENGTH, source, &mut result) {
                JS_OK => Ok(result),
                JS_PENDING_EXCEPTION => {
                    let mut exception = ptr::null_mut();
                    assert_eq!(js_get_and_clear_last_exception(self.env, &mut exception), JS_OK);
                    Err(exception)
                }
                status => panic!("unexpected status {status}"),
            }
        }
    }

    fn eval_string(&self, source: &str) -> String {
        let value = self.eval(source).unwrap_or_else(|e| panic!("threw: {}", self.describe(e)));
        self.read_string(value)
    }

    fn eval_number(&self, source: &str) -> f64 {
        let value = self.eval(source).unwrap_or_else(|e| panic!("threw: {}", self.describe(e)));
        let mut n = 0.0;
        unsafe {
            assert_eq!(js_get_value_double(self.env, value, &mut n), JS_OK);
        }
        n
    }

    fn describe(&self, value: *mut js_value_t) -> String {
        let mut string = ptr::null_mut();
        unsafe {
            assert_eq!(js_coerce_to_string(self.env, value, &mut string), JS_OK);
        }
        self.read_string(string)
    }

    fn global(&self) -> *mut js_value_t {
        let mut global = ptr::null_mut();
        unsafe {
            assert_eq!(js_get_global(self.env, &mut global), JS_OK);
        }
        global
    }

    fn drain(&mut self) {
        unsafe {
            js_loop_run(&mut *self.event_loop, JS_RUN_DEFAULT);
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        unsafe {
            assert_eq!(js_destroy_env(self.env), JS_OK);
            js_loop_run(&mut *self.event_loop, JS_RUN_DEFAULT);
            assert_eq!(js_destroy_platform(self.platform), JS_OK);
            js_loop_run(&mut *self.event_loop, JS_RUN_DEFAULT);
            assert_eq!(js_loop_close(&mut *self.event_loop), JS_OK);
        }
    }
}

#[test]
fn test_script_arithmetic_and_strings() {
    let harness = Harness::new();
    assert_eq!(harness.eval_number("1 + 2 * 3"), 7.0);
    assert_eq!(harness.eval_number("let x = 10; x = x % 4; x"), 2.0);
    assert_eq!(harness.eval_string("'a' + 1 + true"), "a1true");
    assert_eq!(harness.eval_string("typeof 1n"), "bigint");
    assert_eq!(harness.eval_string("typeof notDeclared"), "undefined");
    assert_eq!(harness.eval_string("String(123456n)"), "123456");
    assert_eq!(harness.eval_string("String(0.1 + 0.2)"), "0.30000000000000004");
}

#[test]
fn test_symbol_to_string_uses_description() {
    let harness = Harness::new();
    assert_eq!(harness.eval_string("String(Symbol('foo'))"), "Symbol(foo)");
    assert_eq!(harness.eval_string("String(Symbol())"), "Symbol()");

    let error = harness.eval("'' + Symbol('x')").unwrap_err();
    assert!(harness.describe(error).starts_with("TypeError"));
}

#[test]
fn test_errors_carry_name_message_and_stack() {
    let harness = Harness::new();
    let error = harness.eval("throw new RangeError('bad')").unwrap_err();
    assert_eq!(harness.describe(error), "RangeError: bad");

    let mut is_error = false;
    unsafe {
        assert_eq!(js_is_error(harness.env, error, &mut is_error), JS_OK);
    }
    assert!(is_error);

    let error = harness.eval("missing").unwrap_err();
    assert_eq!(harness.describe(error), "ReferenceError: missing is not defined");

    let error = harness.eval("1 +").unwrap_err();
    assert!(harness.describe(error).starts_with("SyntaxError"));
    assert!(harness.describe(error).contains("test.js:1:"));
}

#[test]
fn test_json_round_trip_preserves_key_order() {
    let harness = Harness::new();
    assert_eq!(
        harness.eval_string("JSON.stringify(JSON.parse('{\"b\":1,\"a\":[true,null,\"x\"]}'))"),
        "{\"b\":1,\"a\":[true,null,\"x\"]}"
    );
    let error = harness.eval("JSON.parse('{')").unwrap_err();
    assert!(harness.describe(error).starts_with("SyntaxError"));
}

#[test]
fn test_get_value_string_utf8_two_phase() {
    let harness = Harness::new();
    let value = harness.string("héllo");
    unsafe {
        let mut len = 0;
        assert_eq!(js_get_value_string_utf8(harness.env, value, ptr::null_mut(), 0, &mut len), JS_OK);
        assert_eq!(len, 6);

        let mut buf = [0xffu8; 4];
        let mut written = 0;
        assert_eq!(js_get_value_string_utf8(harness.env, value, buf.as_mut_ptr(), 3, &mut written), JS_OK);
        assert_eq!(written, 3);
        assert_eq!(&buf[..4], &[b'h', 0xc3, 0xa9, 0xff]);

        let mut roomy = [0xffu8; 8];
        js_get_value_string_utf8(harness.env, value, roomy.as_mut_ptr(), roomy.len(), &mut written);
        assert_eq!(written, 6);
        assert_eq!(roomy[6], 0);
    }
}

#[test]
fn test_bigint_truncation_is_modular() {
    let harness = Harness::new();
    let value = harness.eval("18446744073709551617n").unwrap();
    unsafe {
        let mut lossless = true;
        let mut unsigned = 0u64;
        assert_eq!(js_get_value_bigint_uint64(harness.env, value, &mut unsigned, &mut lossless), JS_OK);
        assert_eq!(unsigned, 1);
        assert!(!lossless);

        let negative = harness.eval("-1n").unwrap();
        assert_eq!(js_get_value_bigint_uint64(harness.env, negative, &mut unsigned, &mut lossless), JS_OK);
        assert_eq!(unsigned, u64::MAX);
        assert!(!lossless);

        let mut signed = 0i64;
        assert_eq!(js_get_value_bigint_int64(harness.env, negative, &mut signed, &mut lossless), JS_OK);
        assert_eq!(signed, -1);
        assert!(lossless);
    }
}

unsafe extern "C" fn add_numbers(env: *mut js_env_t, info: *mut js_callback_info_t) -> *mut js_value_t {
    unsafe {
        let mut argc = 3usize;
        let mut argv = [ptr::null_mut(); 3];
        let mut data = ptr::null_mut();
        js_get_callback_info(env, info, &mut argc, argv.as_mut_ptr(), ptr::null_mut(), &mut data);
        assert_eq!(argc, 2);

        let mut third_type = -1;
        js_typeof(env, argv[2], &mut third_type);
        assert_eq!(third_type, js_undefined);

        let (mut a, mut b) = (0.0, 0.0);
        js_get_value_double(env, argv[0], &mut a);
        js_get_value_double(env, argv[1], &mut b);
        let offset = *(data as *const f64);

        let mut result = ptr::null_mut();
        js_create_double(env, a + b + offset, &mut result);
        result
    }
}

#[test]
fn test_native_function_receives_arguments_and_data() {
    let harness = Harness::new();
    let mut offset = 0.5f64;
    unsafe {
        let mut function = ptr::null_mut();
        assert_eq!(
            js_create_function(
                harness.env,
                c"add".as_ptr(),
                JS_AUTO_LENGTH,
                Some(add_numbers),
                (&mut offset as *mut f64).cast(),
                &mut function,
            ),
            JS_OK
        );
        assert_eq!(js_set_named_property(harness.env, harness.global(), c"add".as_ptr(), function), JS_OK);
    }
    assert_eq!(harness.eval_number("add(1, 2)"), 3.5);
    assert_eq!(harness.eval_string("typeof add"), "function");
}

unsafe extern "C" fn count_then_fetch(env: *mut js_env_t, info: *mut js_callback_info_t) -> *mut js_value_t {
    unsafe {
        let mut argc = 0usize;
        assert_eq!(
            js_get_callback_info(env, info, &mut argc, ptr::null_mut(), ptr::null_mut(), ptr::null_mut()),
            JS_OK
        );
        assert_eq!(argc, 3);

        let mut argv = vec![ptr::null_mut(); argc];
        let mut receiver = ptr::null_mut();
        let mut data = ptr::null_mut();
        assert_eq!(
            js_get_callback_info(env, info, &mut argc, argv.as_mut_ptr(), &mut receiver, &mut data),
            JS_OK
        );
        assert!(!receiver.is_null());
        assert!(argv.iter().all(|arg| !arg.is_null()));
        *(data as *mut usize) += argc;
        receiver
    }
}

#[test]
fn test_callback_info_counts_then_fetches() {
    let harness = Harness::new();
    let mut seen = 0usize;
    unsafe {
        let mut function = ptr::null_mut();
        assert_eq!(
            js_create_function(
                harness.env,
                c"method".as_ptr(),
                JS_AUTO_LENGTH,
                Some(count_then_fetch),
                (&mut seen as *mut usize).cast(),
                &mut function,
            ),
            JS_OK
        );
        assert_eq!(js_set_named_property(harness.env, harness.global(), c"method".as_ptr(), function), JS_OK);
    }
    assert_eq!(
        harness.eval_string("let holder = { method: method, tag: 'holder' }; holder.method(1, 2, 3).tag"),
        "holder"
    );
    assert_eq!(seen, 3);
}

unsafe extern "C" fn throw_nope(env: *mut js_env_t, _info: *mut js_callback_info_t) -> *mut js_value_t {
    unsafe {
        js_throw_error(env, ptr::null(), c"nope".as_ptr());
    }
    ptr::null_mut()
}

#[test]
fn test_native_exception_propagates_to_caller() {
    let harness = Harness::new();
    unsafe {
        let mut function = ptr::null_mut();
        js_create_function(harness.env, c"thrower".as_ptr(), JS_AUTO_LENGTH, Some(throw_nope), ptr::null_mut(), &mut function);

        let mut undefined = ptr::null_mut();
        js_get_undefined(harness.env, &mut undefined);

        let mut result = ptr::null_mut();
        assert_eq!(
            js_call_function(harness.env, undefined, function, 0, ptr::null(), &mut result),
            JS_PENDING_EXCEPTION
        );

        let mut pending = false;
        js_is_exception_pending(harness.env, &mut pending);
        assert!(pending);

        let mut exception = ptr::null_mut();
        js_get_and_clear_last_exception(harness.env, &mut exception);
        assert_eq!(harness.describe(exception), "Error: nope");

        js_is_exception_pending(harness.env, &mut pending);
        assert!(!pending);
    }
}

thread_local! {
    static FINALIZED: Cell<usize> = const { Cell::new(0) };
}

unsafe extern "C" fn count_finalize(_env: *mut js_env_t, _data: *mut c_void, _hint: *mut c_void) {
    FINALIZED.with(|count| count.set(count.get() + 1));
}

#[test]
fn test_collected_wrap_finalizer_runs_on_loop() {
    FINALIZED.with(|count| count.set(0));
    let mut harness = Harness::new();
    unsafe {
        let mut scope = ptr::null_mut();
        js_open_handle_scope(harness.env, &mut scope);
        let mut object = ptr::null_mut();
        js_create_object(harness.env, &mut object);
        assert_eq!(js_wrap(harness.env, object, ptr::null_mut(), Some(count_finalize), ptr::null_mut()), JS_OK);
        assert_eq!(
            js_wrap(harness.env, object, ptr::null_mut(), None, ptr::null_mut()),
            JS_PENDING_EXCEPTION
        );
        let mut exception = ptr::null_mut();
        js_get_and_clear_last_exception(harness.env, &mut exception);
        js_close_handle_scope(harness.env, scope);

        js_request_garbage_collection(harness.env);
    }
    assert_eq!(FINALIZED.with(Cell::get), 0);
    harness.drain();
    assert_eq!(FINALIZED.with(Cell::get), 1);
}

#[test]
fn test_weak_reference_clears_after_collection() {
    let harness = Harness::new();
    unsafe {
        let mut scope = ptr::null_mut();
        js_open_handle_scope(harness.env, &mut scope);
        let mut object = ptr::null_mut();
        js_create_object(harness.env, &mut object);

        let mut strong = ptr::null_mut();
        let mut weak = ptr::null_mut();
        js_create_reference(harness.env, object, 1, &mut strong);
        js_create_reference(harness.env, object, 0, &mut weak);
        js_close_handle_scope(harness.env, scope);

        js_request_garbage_collection(harness.env);
        let mut value = ptr::null_mut();
        js_open_handle_scope(harness.env, &mut scope);
        js_get_reference_value(harness.env, weak, &mut value);
        assert!(!value.is_null());
        js_close_handle_scope(harness.env, scope);

        let mut count = 1;
        assert_eq!(js_reference_unref(harness.env, strong, &mut count), JS_OK);
        assert_eq!(count, 0);
        assert_eq!(js_reference_unref(harness.env, strong, &mut count), JS_EINVAL);

        js_request_garbage_collection(harness.env);
        js_get_reference_value(harness.env, weak, &mut value);
        assert!(value.is_null());

        assert_eq!(js_delete_reference(harness.env, weak), JS_OK);
        assert_eq!(js_delete_reference(harness.env, strong), JS_OK);
        assert_eq!(js_delete_reference(harness.env, strong), JS_EINVAL);
    }
}

#[test]
fn test_escapable_scope_promotes_one_value() {
    let harness = Harness::new();
    unsafe {
        let mut outer = ptr::null_mut();
        js_open_handle_scope(harness.env, &mut outer);

        let mut scope = ptr::null_mut();
        js_open_escapable_handle_scope(harness.env, &mut scope);
        let inner = harness.string("kept");
        let mut escaped = ptr::null_mut();
        assert_eq!(js_escape_handle(harness.env, scope, inner, &mut escaped), JS_OK);
        assert_eq!(js_escape_handle(harness.env, scope, inner, &mut escaped), JS_EINVAL);
        assert_eq!(js_close_escapable_handle_scope(harness.env, scope), JS_OK);

        assert_eq!(harness.read_string(escaped), "kept");
        assert_eq!(js_close_handle_scope(harness.env, outer), JS_OK);
    }
}

#[test]
fn test_scopes_close_in_order() {
    let harness = Harness::new();
    unsafe {
        let (mut first, mut second) = (ptr::null_mut(), ptr::null_mut());
        js_open_handle_scope(harness.env, &mut first);
        js_open_handle_scope(harness.env, &mut second);
        assert_eq!(js_close_handle_scope(harness.env, first), JS_EINVAL);
        assert_eq!(js_close_handle_scope(harness.env, second), JS_OK);
        assert_eq!(js_close_handle_scope(harness.env, first), JS_OK);
    }
}

const TAG: js_type_tag_t = js_type_tag_t {
    lower: 0x1234,
    upper: 0x5678,
};

#[test]
fn test_type_tags_are_exclusive() {
    let harness = Harness::new();
    unsafe {
        let mut object = ptr::null_mut();
        js_create_object(harness.env, &mut object);

        let mut tagged = true;
        js_check_type_tag(harness.env, object, &TAG, &mut tagged);
        assert!(!tagged);

        assert_eq!(js_add_type_tag(harness.env, object, &TAG), JS_OK);
        js_check_type_tag(harness.env, object, &TAG, &mut tagged);
        assert!(tagged);

        let other = js_type_tag_t { lower: 1, upper: 2 };
        js_check_type_tag(harness.env, object, &other, &mut tagged);
        assert!(!tagged);

        assert_eq!(js_add_type_tag(harness.env, object, &other), JS_PENDING_EXCEPTION);
        let mut exception = ptr::null_mut();
        js_get_and_clear_last_exception(harness.env, &mut exception);
    }
}

unsafe extern "C" fn delegate_get(env: *mut js_env_t, property: *mut js_value_t, _data: *mut c_void) -> *mut js_value_t {
    unsafe {
        let mut buf = [0u8; 16];
        let mut len = 0;
        js_get_value_string_utf8(env, property, buf.as_mut_ptr(), buf.len(), &mut len);
        if &buf[..len] != b"answer" {
            return ptr::null_mut();
        }
        let mut result = ptr::null_mut();
        js_create_double(env, 42.0, &mut result);
        result
    }
}

unsafe extern "C" fn delegate_set(
    env: *mut js_env_t,
    _property: *mut js_value_t,
    _value: *mut js_value_t,
    _data: *mut c_void,
) -> bool {
    unsafe {
        js_throw_error(env, ptr::null(), c"read only".as_ptr());
    }
    false
}

unsafe extern "C" fn delegate_keys(env: *mut js_env_t, _data: *mut c_void) -> *mut js_value_t {
    unsafe {
        let mut array = ptr::null_mut();
        js_create_array_with_length(env, 1, &mut array);
        let mut name = ptr::null_mut();
        js_create_string_utf8(env, b"answer".as_ptr(), 6, &mut name);
        js_set_element(env, array, 0, name);
        array
    }
}

#[test]
fn test_delegate_intercepts_property_access() {
    let harness = Harness::new();
    let callbacks = js_delegate_callbacks_t {
        get: Some(delegate_get),
        set: Some(delegate_set),
        own_keys: Some(delegate_keys),
        ..Default::default()
    };
    unsafe {
        let mut delegate = ptr::null_mut();
        assert_eq!(
            js_create_delegate(harness.env, &callbacks, ptr::null_mut(), None, ptr::null_mut(), &mut delegate),
            JS_OK
        );
        js_set_named_property(harness.env, harness.global(), c"host".as_ptr(), delegate);
    }
    assert_eq!(harness.eval_number("host.answer"), 42.0);
    assert_eq!(harness.eval_string("typeof host.other"), "undefined");
    assert_eq!(harness.eval_string("JSON.stringify(Object.keys(host))"), "[\"answer\"]");

    let error = harness.eval("host.answer = 1").unwrap_err();
    assert_eq!(harness.describe(error), "Error: read only");
}

#[test]
fn test_arraybuffer_shares_backing_store() {
    let harness = Harness::new();
    unsafe {
        let mut data = ptr::null_mut();
        let mut buffer = ptr::null_mut();
        assert_eq!(js_create_arraybuffer(harness.env, 4, &mut data, &mut buffer), JS_OK);
        *(data as *mut u8).add(2) = 7;

        let mut read = ptr::null_mut();
        let mut len = 0;
        assert_eq!(js_get_arraybuffer_info(harness.env, buffer, &mut read, &mut len), JS_OK);
        assert_eq!(len, 4);
        assert_eq!(*(read as *const u8).add(2), 7);
    }
}

#[test]
fn test_call_depth_limit_throws_range_error() {
    let harness = Harness::with_options(js_env_options_t {
        expose_garbage_collection: false,
        max_call_depth: 0,
    });
    let error = harness.eval("String(1)").unwrap_err();
    assert!(harness.describe(error).starts_with("RangeError"));
}

#[test]
fn test_environment_destroy_finalizes_everything() {
    FINALIZED.with(|count| count.set(0));
    {
        let harness = Harness::new();
        unsafe {
            let mut external = ptr::null_mut();
            js_create_external(harness.env, ptr::null_mut(), Some(count_finalize), ptr::null_mut(), &mut external);
            let mut reference = ptr::null_mut();
            js_create_reference(harness.env, external, 1, &mut reference);
        }
    }
    assert_eq!(FINALIZED.with(Cell::get), 1);
}

#[test]
fn test_platform_reports_identity() {
    let harness = Harness::new();
    unsafe {
        let mut identifier = ptr::null();
        let mut version = ptr::null();
        js_get_platform_identifier(harness.platform, &mut identifier);
        js_get_platform_version(harness.platform, &mut version);
        assert_eq!(CStr::from_ptr(identifier).to_str().unwrap(), "otter-js");
        assert!(!CStr::from_ptr(version).to_bytes().is_empty());

        assert_eq!(js_destroy_platform(harness.platform), JS_EINVAL);
    }
}

#[test]
fn test_loop_stays_alive_until_handles_close() {
    let mut event_loop = Box::new(js_loop_t::default());
    let mut platform = ptr::null_mut();
    unsafe {
        assert_eq!(js_loop_init(&mut *event_loop), JS_OK);
        let mut alive = true;
        assert_eq!(js_loop_alive(&mut *event_loop, &mut alive), JS_OK);
        assert!(!alive);

        assert_eq!(js_create_platform(&mut *event_loop, ptr::null(), &mut platform), JS_OK);
        assert_eq!(js_loop_alive(&mut *event_loop, &mut alive), JS_OK);
        assert!(alive);
        assert_eq!(js_loop_close(&mut *event_loop), JS_EBUSY);

        assert_eq!(js_destroy_platform(platform), JS_OK);
        assert_eq!(js_loop_run(&mut *event_loop, JS_RUN_DEFAULT), 0);
        assert_eq!(js_loop_alive(&mut *event_loop, &mut alive), JS_OK);
        assert!(!alive);
        assert_eq!(js_loop_close(&mut *event_loop), JS_OK);
    }
}
