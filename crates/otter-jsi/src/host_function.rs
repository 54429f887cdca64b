//! Native closures exposed to script as functions
//!
//! The closure lives in a heap binding attached to the function object with
//! `js_wrap`; the wrap's finalizer frees it when the function is collected
//! or the runtime is torn down. A type tag marks the object so
//! [`Function::get_host_function`] can recover the closure.

use std::ffi::c_void;
use std::ptr;
use std::rc::{Rc, Weak};

use otter_js_sys::*;
use tracing::trace;

use crate::error::{JsiResult, assert_ok, fatal};
use crate::function::Function;
use crate::object::Object;
use crate::runtime::{Runtime, RuntimeInner};
use crate::string::PropNameId;
use crate::value::Value;

/// A native function callable from script: `(runtime, this, arguments)`
///
/// Returning `Err` throws into the calling script. A
/// [`JsiError::Js`](crate::JsiError::Js) is rethrown with its original
/// value; any other error becomes an `Error` with the same message.
pub type HostFunction = Rc<dyn Fn(&Runtime, &Value, &[Value]) -> JsiResult<Value>>;

const HOST_FUNCTION_TAG: js_type_tag_t = js_type_tag_t {
    lower: 0xfab8_af59_4a3d_4e86,
    upper: 0xbede_afdd_fc1e_f064,
};

struct HostFunctionBinding {
    runtime: Weak<RuntimeInner>,
    function: HostFunction,
}

impl Function {
    /// Expose `function` to script as a function named `name` whose
    /// `length` is `param_count`.
    pub fn create_from_host_function(
        rt: &Runtime,
        name: &PropNameId,
        param_count: u32,
        function: HostFunction,
    ) -> JsiResult<Function> {
        let name = name.utf8(rt)?;
        let _scope = rt.scope();
        let env = rt.env();

        let binding = Box::into_raw(Box::new(HostFunctionBinding {
            runtime: rt.downgrade(),
            function,
        }));

        let mut handle = ptr::null_mut();
        // SAFETY: name is valid for its length; the binding outlives the
        // function through the wrap below
        let status = unsafe {
            js_create_function(
                env,
                name.as_ptr().cast(),
                name.len(),
                Some(call_host_function),
                binding.cast(),
                &mut handle,
            )
        };
        if let Err(error) = rt.check(status, "js_create_function") {
            // SAFETY: the engine did not take the binding
            drop(unsafe { Box::from_raw(binding) });
            return Err(error);
        }

        // SAFETY: a fresh function is neither wrapped nor tagged
        unsafe {
            assert_ok(
                js_wrap(env, handle, binding.cast(), Some(finalize_host_function), ptr::null_mut()),
                "js_wrap",
            );
            assert_ok(js_add_type_tag(env, handle, &HOST_FUNCTION_TAG), "js_add_type_tag");
        }

        let host = Function::from_object(Object::from_reference(rt.capture(handle)));
        host.set_property(rt, "length", param_count)?;
        Ok(host)
    }

    /// Whether this function was created by [`Function::create_from_host_function`]
    pub fn is_host_function(&self, rt: &Runtime) -> bool {
        let _scope = rt.scope();
        has_tag(rt, self.handle(rt))
    }

    /// The closure behind a host function
    pub fn get_host_function(&self, rt: &Runtime) -> Option<HostFunction> {
        let _scope = rt.scope();
        let handle = self.handle(rt);
        if !has_tag(rt, handle) {
            return None;
        }
        let mut data = ptr::null_mut();
        // SAFETY: tagged functions are always wrapped
        let status = unsafe { js_unwrap(rt.env(), handle, &mut data) };
        if status != JS_OK {
            fatal("host function tag present without its binding");
        }
        // SAFETY: the wrap data is the binding created above
        let binding = unsafe { &*data.cast::<HostFunctionBinding>() };
        Some(binding.function.clone())
    }
}

fn has_tag(rt: &Runtime, handle: *mut js_value_t) -> bool {
    let mut tagged = false;
    // SAFETY: handle is live in the current scope
    let status = unsafe { js_check_type_tag(rt.env(), handle, &HOST_FUNCTION_TAG, &mut tagged) };
    assert_ok(status, "js_check_type_tag");
    tagged
}

unsafe extern "C" fn call_host_function(env: *mut js_env_t, info: *mut js_callback_info_t) -> *mut js_value_t {
    let mut argc = 0;
    // SAFETY: info is valid for the duration of the callback
    let status = unsafe {
        js_get_callback_info(env, info, &mut argc, ptr::null_mut(), ptr::null_mut(), ptr::null_mut())
    };
    assert_ok(status, "js_get_callback_info");

    let mut argv = vec![ptr::null_mut(); argc];
    let mut receiver = ptr::null_mut();
    let mut data = ptr::null_mut();
    // SAFETY: argv has room for argc handles
    let status = unsafe { js_get_callback_info(env, info, &mut argc, argv.as_mut_ptr(), &mut receiver, &mut data) };
    assert_ok(status, "js_get_callback_info");

    // SAFETY: data is the binding registered in create_from_host_function,
    // kept alive by the function being called
    let binding = unsafe { &*data.cast::<HostFunctionBinding>() };
    let Some(rt) = Runtime::upgrade(&binding.runtime) else {
        return ptr::null_mut();
    };
    let function = binding.function.clone();

    let this = rt.to_embedder(receiver);
    let args: Vec<Value> = argv.iter().map(|arg| rt.to_embedder(*arg)).collect();
    trace!(argc = args.len(), "host function call");

    // The engine's callback scope owns the returned handle
    match function(&rt, &this, &args) {
        Ok(value) => rt.to_native(&value),
        Err(error) => {
            trace!(%error, "host function threw");
            rt.throw_into_engine(error);
            ptr::null_mut()
        }
    }
}

unsafe extern "C" fn finalize_host_function(_env: *mut js_env_t, data: *mut c_void, _hint: *mut c_void) {
    // SAFETY: data is the binding leaked in create_from_host_function; the
    // engine finalizes each wrap once
    drop(unsafe { Box::from_raw(data.cast::<HostFunctionBinding>()) });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Platform;
    use crate::error::JsiError;
    use std::cell::Cell;

    fn host_fn(f: impl Fn(&Runtime, &Value, &[Value]) -> JsiResult<Value> + 'static) -> HostFunction {
        Rc::new(f)
    }

    #[test]
    fn test_host_function_arity_and_name() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let name = PropNameId::for_ascii(&rt, "add").unwrap();
        let add = Function::create_from_host_function(
            &rt,
            &name,
            2,
            host_fn(|_, _, args| Ok(Value::from(args[0].as_number()? + args[1].as_number()?))),
        )
        .unwrap();

        assert_eq!(add.get_property(&rt, "length").unwrap().as_number().unwrap(), 2.0);
        let fn_name = add.get_property(&rt, "name").unwrap();
        assert_eq!(fn_name.as_string().unwrap().utf8(&rt).unwrap(), "add");
        assert_eq!(add.call(&rt, &[Value::from(2), Value::from(3)]).unwrap().as_number().unwrap(), 5.0);
    }

    #[test]
    fn test_missing_arguments_are_absent() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let name = PropNameId::for_ascii(&rt, "count").unwrap();
        let count = Function::create_from_host_function(
            &rt,
            &name,
            3,
            host_fn(|_, _, args| Ok(Value::from(args.len() as u32))),
        )
        .unwrap();
        rt.global().set_property(&rt, "count", count).unwrap();
        assert_eq!(rt.eval("count(1)").unwrap().as_number().unwrap(), 1.0);
    }

    #[test]
    fn test_receiver_is_passed() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let name = PropNameId::for_ascii(&rt, "self").unwrap();
        let identity = Function::create_from_host_function(&rt, &name, 0, host_fn(|_, this, _| Ok(this.clone()))).unwrap();
        let receiver = Object::new(&rt).unwrap();
        let returned = identity.call_with_this(&rt, &receiver, &[]).unwrap();
        assert!(Object::strict_equals(&rt, returned.as_object().unwrap(), &receiver));
    }

    #[test]
    fn test_get_host_function_returns_same_closure() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let name = PropNameId::for_ascii(&rt, "f").unwrap();
        let closure = host_fn(|_, _, _| Ok(Value::Undefined));
        let function = Function::create_from_host_function(&rt, &name, 0, closure.clone()).unwrap();

        assert!(function.is_host_function(&rt));
        let recovered = function.get_host_function(&rt).unwrap();
        assert!(Rc::ptr_eq(&recovered, &closure));

        let script_fn = rt.eval("String").unwrap().into_object().unwrap().as_function(&rt).unwrap();
        assert!(!script_fn.is_host_function(&rt));
        assert!(script_fn.get_host_function(&rt).is_none());
    }

    #[test]
    fn test_native_error_becomes_script_exception() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let name = PropNameId::for_ascii(&rt, "fail").unwrap();
        let fail = Function::create_from_host_function(
            &rt,
            &name,
            0,
            host_fn(|_, _, _| Err(JsiError::native("disk full"))),
        )
        .unwrap();
        let err = fail.call(&rt, &[]).unwrap_err();
        let js = err.as_js_error().unwrap();
        assert_eq!(js.name(), "Error");
        assert_eq!(js.message(), "disk full");
    }

    #[test]
    fn test_closure_released_on_collection() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let name = PropNameId::for_ascii(&rt, "tick").unwrap();
        let tick = Function::create_from_host_function(
            &rt,
            &name,
            0,
            host_fn(move |_, _, _| {
                counter.set(counter.get() + 1);
                Ok(Value::Undefined)
            }),
        )
        .unwrap();
        tick.call(&rt, &[]).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(Rc::strong_count(&calls), 2);

        drop(tick);
        rt.collect_garbage().unwrap();
        assert_eq!(Rc::strong_count(&calls), 1);
    }
}
