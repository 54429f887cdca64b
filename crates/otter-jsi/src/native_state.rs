//! Native state attached to ordinary objects

use std::any::Any;
use std::ffi::c_void;
use std::ptr;
use std::rc::Rc;

use otter_js_sys::*;

use crate::error::{JsiResult, assert_ok, fatal};
use crate::object::Object;
use crate::runtime::Runtime;

/// Marker for values that can be attached to an object with
/// [`Object::set_native_state`]
pub trait NativeState: Any {}

const NATIVE_STATE_TAG: js_type_tag_t = js_type_tag_t {
    lower: 0x5a84_bf0d_0e22_401b,
    upper: 0x8585_64a9_aca3_52c2,
};

struct NativeStateBinding {
    state: Rc<dyn NativeState>,
    any: Rc<dyn Any>,
}

impl Object {
    pub fn has_native_state(&self, rt: &Runtime) -> bool {
        let _scope = rt.scope();
        has_tag(rt, self.handle(rt))
    }

    pub fn get_native_state(&self, rt: &Runtime) -> Option<Rc<dyn NativeState>> {
        let _scope = rt.scope();
        binding(rt, self.handle(rt)).map(|binding| binding.state.clone())
    }

    /// The attached state, if there is one of type `T`
    pub fn get_native_state_as<T: NativeState>(&self, rt: &Runtime) -> Option<Rc<T>> {
        let _scope = rt.scope();
        let any = binding(rt, self.handle(rt))?.any.clone();
        any.downcast::<T>().ok()
    }

    /// Attach `state`, replacing any state set before. The state is released
    /// when the object is collected.
    ///
    /// Host objects and host functions already carry a native binding and
    /// reject native state with the engine's exception.
    pub fn set_native_state<T: NativeState>(&self, rt: &Runtime, state: Rc<T>) -> JsiResult<()> {
        let _scope = rt.scope();
        let env = rt.env();
        let handle = self.handle(rt);

        let tagged = has_tag(rt, handle);
        if tagged {
            let mut previous = ptr::null_mut();
            // SAFETY: tagged objects carry a native state binding
            let status = unsafe { js_remove_wrap(env, handle, &mut previous) };
            if status != JS_OK {
                fatal("native state tag present without its binding");
            }
            // SAFETY: removing the wrap dropped its finalizer, so the binding
            // is ours to free
            drop(unsafe { Box::from_raw(previous.cast::<NativeStateBinding>()) });
        }

        let binding = Box::into_raw(Box::new(NativeStateBinding {
            state: state.clone(),
            any: state,
        }));
        // SAFETY: handle is live in the current scope; the finalizer owns
        // the binding once the wrap succeeds
        let status = unsafe { js_wrap(env, handle, binding.cast(), Some(finalize_native_state), ptr::null_mut()) };
        if let Err(error) = rt.check(status, "js_wrap") {
            // SAFETY: the wrap was rejected, the binding is still ours
            drop(unsafe { Box::from_raw(binding) });
            return Err(error);
        }

        if !tagged {
            // SAFETY: the object was not tagged before
            assert_ok(unsafe { js_add_type_tag(env, handle, &NATIVE_STATE_TAG) }, "js_add_type_tag");
        }
        Ok(())
    }
}

fn has_tag(rt: &Runtime, handle: *mut js_value_t) -> bool {
    let mut tagged = false;
    // SAFETY: handle is live in the current scope
    let status = unsafe { js_check_type_tag(rt.env(), handle, &NATIVE_STATE_TAG, &mut tagged) };
    assert_ok(status, "js_check_type_tag");
    tagged
}

fn binding<'a>(rt: &Runtime, handle: *mut js_value_t) -> Option<&'a NativeStateBinding> {
    if !has_tag(rt, handle) {
        return None;
    }
    let mut data = ptr::null_mut();
    // SAFETY: tagged objects carry a native state binding
    let status = unsafe { js_unwrap(rt.env(), handle, &mut data) };
    if status != JS_OK {
        fatal("native state tag present without its binding");
    }
    // SAFETY: the binding lives until the object is finalized, and callers
    // clone out of it while the handle keeps the object alive
    Some(unsafe { &*data.cast::<NativeStateBinding>() })
}

unsafe extern "C" fn finalize_native_state(_env: *mut js_env_t, data: *mut c_void, _hint: *mut c_void) {
    // SAFETY: data is the binding leaked in set_native_state
    drop(unsafe { Box::from_raw(data.cast::<NativeStateBinding>()) });
}
