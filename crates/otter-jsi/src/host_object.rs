//! Native objects with script-visible properties
//!
//! A host object is an engine delegate whose `get`, `set` and `own_keys`
//! interceptors forward to a [`HostObject`] implementation. Errors returned
//! by the implementation are thrown into the engine before the interceptor
//! returns, so script sees them as ordinary exceptions.

use std::ffi::c_void;
use std::ptr;
use std::rc::{Rc, Weak};

use otter_js_sys::*;
use tracing::trace;

use crate::error::{JsiResult, assert_ok, fatal};
use crate::exception::JsError;
use crate::object::Object;
use crate::runtime::{Runtime, RuntimeInner};
use crate::string::PropNameId;
use crate::value::Value;

/// Property behavior for a native object exposed to script
pub trait HostObject {
    /// Read `name`. Defaults to `undefined` for every property.
    fn get(&self, _rt: &Runtime, _name: &PropNameId) -> JsiResult<Value> {
        Ok(Value::Undefined)
    }

    /// Write `name`. The default rejects every assignment with a `TypeError`.
    fn set(&self, rt: &Runtime, name: &PropNameId, _value: &Value) -> JsiResult<()> {
        let name = name.utf8(rt).unwrap_or_default();
        Err(JsError::type_error(
            rt,
            &format!("Cannot assign to property '{name}' on HostObject with default setter"),
        )
        .into())
    }

    /// Names reported to `Object.keys` and friends, in order
    fn get_property_names(&self, _rt: &Runtime) -> JsiResult<Vec<PropNameId>> {
        Ok(Vec::new())
    }
}

const HOST_OBJECT_TAG: js_type_tag_t = js_type_tag_t {
    lower: 0xc709_6ad6_f55c_4256,
    upper: 0x8083_785f_64f2_82fc,
};

struct HostObjectBinding {
    runtime: Weak<RuntimeInner>,
    object: Rc<dyn HostObject>,
}

impl HostObjectBinding {
    /// # Safety
    /// `data` must be a binding registered by `Object::from_host_object`
    /// whose delegate is still alive.
    unsafe fn resolve(data: *mut c_void) -> Option<(Runtime, Rc<dyn HostObject>)> {
        // SAFETY: per the caller contract
        let binding = unsafe { &*data.cast::<HostObjectBinding>() };
        let rt = Runtime::upgrade(&binding.runtime)?;
        Some((rt, binding.object.clone()))
    }
}

impl Object {
    /// Expose `host` to script as an object
    pub fn from_host_object(rt: &Runtime, host: Rc<dyn HostObject>) -> JsiResult<Object> {
        let _scope = rt.scope();
        let env = rt.env();

        let binding = Box::into_raw(Box::new(HostObjectBinding {
            runtime: rt.downgrade(),
            object: host,
        }));
        let callbacks = js_delegate_callbacks_t {
            get: Some(host_object_get),
            set: Some(host_object_set),
            own_keys: Some(host_object_own_keys),
            ..Default::default()
        };

        let mut handle = ptr::null_mut();
        // SAFETY: the finalizer owns the binding from here on
        let status = unsafe {
            js_create_delegate(
                env,
                &callbacks,
                binding.cast(),
                Some(finalize_host_object),
                ptr::null_mut(),
                &mut handle,
            )
        };
        if let Err(error) = rt.check(status, "js_create_delegate") {
            // SAFETY: the engine did not take the binding
            drop(unsafe { Box::from_raw(binding) });
            return Err(error);
        }

        // SAFETY: a fresh delegate is neither wrapped nor tagged. The wrap
        // carries no finalizer: the delegate's own finalizer frees the binding.
        unsafe {
            assert_ok(js_wrap(env, handle, binding.cast(), None, ptr::null_mut()), "js_wrap");
            assert_ok(js_add_type_tag(env, handle, &HOST_OBJECT_TAG), "js_add_type_tag");
        }

        Ok(Object::from_reference(rt.capture(handle)))
    }

    /// Whether this object was created by [`Object::from_host_object`]
    pub fn is_host_object(&self, rt: &Runtime) -> bool {
        let _scope = rt.scope();
        let mut tagged = false;
        // SAFETY: the handle is live in the current scope
        let status = unsafe { js_check_type_tag(rt.env(), self.handle(rt), &HOST_OBJECT_TAG, &mut tagged) };
        assert_ok(status, "js_check_type_tag");
        tagged
    }

    /// The implementation behind a host object
    pub fn get_host_object(&self, rt: &Runtime) -> Option<Rc<dyn HostObject>> {
        if !self.is_host_object(rt) {
            return None;
        }
        let _scope = rt.scope();
        let mut data = ptr::null_mut();
        // SAFETY: tagged objects are always wrapped
        let status = unsafe { js_unwrap(rt.env(), self.handle(rt), &mut data) };
        if status != JS_OK {
            fatal("host object tag present without its binding");
        }
        // SAFETY: the wrap data is the binding created in from_host_object
        let binding = unsafe { &*data.cast::<HostObjectBinding>() };
        Some(binding.object.clone())
    }
}

unsafe extern "C" fn host_object_get(
    _env: *mut js_env_t,
    property: *mut js_value_t,
    data: *mut c_void,
) -> *mut js_value_t {
    // SAFETY: the engine passes the data registered with the delegate
    let Some((rt, host)) = (unsafe { HostObjectBinding::resolve(data) }) else {
        return ptr::null_mut();
    };
    let name = PropNameId::from_reference(rt.capture(property));
    trace!("host object get");

    match host.get(&rt, &name) {
        Ok(value) => rt.to_native(&value),
        Err(error) => {
            rt.throw_into_engine(error);
            ptr::null_mut()
        }
    }
}

unsafe extern "C" fn host_object_set(
    _env: *mut js_env_t,
    property: *mut js_value_t,
    value: *mut js_value_t,
    data: *mut c_void,
) -> bool {
    // SAFETY: the engine passes the data registered with the delegate
    let Some((rt, host)) = (unsafe { HostObjectBinding::resolve(data) }) else {
        return false;
    };
    let name = PropNameId::from_reference(rt.capture(property));
    let value = rt.to_embedder(value);
    trace!("host object set");

    match host.set(&rt, &name, &value) {
        Ok(()) => true,
        Err(error) => {
            rt.throw_into_engine(error);
            false
        }
    }
}

unsafe extern "C" fn host_object_own_keys(env: *mut js_env_t, data: *mut c_void) -> *mut js_value_t {
    // SAFETY: the engine passes the data registered with the delegate
    let Some((rt, host)) = (unsafe { HostObjectBinding::resolve(data) }) else {
        return ptr::null_mut();
    };

    let names = match host.get_property_names(&rt) {
        Ok(names) => names,
        Err(error) => {
            rt.throw_into_engine(error);
            return ptr::null_mut();
        }
    };

    let mut array = ptr::null_mut();
    // SAFETY: env is the delegate's env
    assert_ok(
        unsafe { js_create_array_with_length(env, names.len(), &mut array) },
        "js_create_array_with_length",
    );
    for (index, name) in names.iter().enumerate() {
        let Ok(index) = u32::try_from(index) else {
            fatal("host object reported more than u32::MAX property names");
        };
        // SAFETY: array is live in the callback scope; the element too
        let status = unsafe { js_set_element(env, array, index, name.handle(&rt)) };
        assert_ok(status, "js_set_element");
    }
    array
}

unsafe extern "C" fn finalize_host_object(_env: *mut js_env_t, data: *mut c_void, _hint: *mut c_void) {
    // SAFETY: data is the binding leaked in from_host_object; the delegate
    // is finalized once
    drop(unsafe { Box::from_raw(data.cast::<HostObjectBinding>()) });
}
