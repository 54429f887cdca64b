//! Owning and weak wrappers around engine reference slots
//!
//! Every pointer-like value the bridge hands out (strings, symbols, bigints,
//! objects, property names) holds exactly one [`Reference`]. A reference
//! starts with a count of one; cloning it increments the engine-side count
//! and dropping it decrements, deleting the slot when the count reaches
//! zero. All pointer kinds clone through this one implementation.
//!
//! References do not keep their runtime alive. Dropping one after its
//! runtime is gone is a no-op: the environment's teardown already released
//! every slot.

use std::ptr;
use std::rc::{Rc, Weak};

use otter_js_sys::*;

use crate::error::{assert_ok, fatal};
use crate::runtime::{Runtime, RuntimeInner};

/// One strong count on an engine reference slot
pub(crate) struct Reference {
    runtime: Weak<RuntimeInner>,
    raw: *mut js_ref_t,
}

impl Reference {
    /// Capture `value` in a fresh slot with a count of one.
    pub(crate) fn new(rt: &Runtime, value: *mut js_value_t) -> Self {
        Self {
            runtime: rt.downgrade(),
            raw: create_reference(rt, value, 1),
        }
    }

    /// Resolve the slot to a handle in the current handle scope.
    #[track_caller]
    pub(crate) fn value(&self, rt: &Runtime) -> *mut js_value_t {
        self.ensure_runtime(rt);
        let value = reference_value(rt, self.raw);
        if value.is_null() {
            fatal("strong reference lost its value");
        }
        value
    }

    pub(crate) fn belongs_to(&self, rt: &Runtime) -> bool {
        Weak::as_ptr(&self.runtime) == Rc::as_ptr(&rt.inner)
    }

    #[track_caller]
    fn ensure_runtime(&self, rt: &Runtime) {
        if !self.belongs_to(rt) {
            fatal("value used with a runtime other than the one that created it");
        }
    }

    #[cfg(test)]
    pub(crate) fn count(&self, rt: &Runtime) -> u32 {
        let mut count = 0;
        // SAFETY: the slot is live while self exists
        unsafe {
            assert_ok(js_reference_ref(rt.env(), self.raw, &mut count), "js_reference_ref");
            assert_ok(js_reference_unref(rt.env(), self.raw, &mut count), "js_reference_unref");
        }
        count
    }
}

impl Clone for Reference {
    #[track_caller]
    fn clone(&self) -> Self {
        let Some(runtime) = self.runtime.upgrade() else {
            fatal("value cloned after its runtime was dropped");
        };
        // SAFETY: the slot is live while self exists and the env is alive
        let status = unsafe { js_reference_ref(runtime.env(), self.raw, ptr::null_mut()) };
        assert_ok(status, "js_reference_ref");
        Self {
            runtime: self.runtime.clone(),
            raw: self.raw,
        }
    }
}

impl Drop for Reference {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        let env = runtime.env();

        let mut count = 0;
        // SAFETY: this reference holds one count on the live slot
        assert_ok(unsafe { js_reference_unref(env, self.raw, &mut count) }, "js_reference_unref");
        if count == 0 {
            // SAFETY: no other holder is left
            assert_ok(unsafe { js_delete_reference(env, self.raw) }, "js_delete_reference");
        }
    }
}

/// A reference slot with a count of zero: observes its value without
/// keeping it alive
pub(crate) struct WeakReference {
    runtime: Weak<RuntimeInner>,
    raw: *mut js_ref_t,
}

impl WeakReference {
    pub(crate) fn new(rt: &Runtime, value: *mut js_value_t) -> Self {
        Self {
            runtime: rt.downgrade(),
            raw: create_reference(rt, value, 0),
        }
    }

    /// A handle to the value, or `None` once it has been collected
    #[track_caller]
    pub(crate) fn lock(&self, rt: &Runtime) -> Option<*mut js_value_t> {
        if Weak::as_ptr(&self.runtime) != Rc::as_ptr(&rt.inner) {
            fatal("weak object used with a runtime other than the one that created it");
        }
        let value = reference_value(rt, self.raw);
        (!value.is_null()).then_some(value)
    }
}

impl Drop for WeakReference {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            // SAFETY: weak slots are owned by exactly one WeakReference
            let status = unsafe { js_delete_reference(runtime.env(), self.raw) };
            assert_ok(status, "js_delete_reference");
        }
    }
}

#[track_caller]
fn create_reference(rt: &Runtime, value: *mut js_value_t, count: u32) -> *mut js_ref_t {
    let mut raw = ptr::null_mut();
    // SAFETY: value is a live handle in rt's env
    let status = unsafe { js_create_reference(rt.env(), value, count, &mut raw) };
    assert_ok(status, "js_create_reference");
    raw
}

#[track_caller]
fn reference_value(rt: &Runtime, raw: *mut js_ref_t) -> *mut js_value_t {
    let mut value = ptr::null_mut();
    // SAFETY: raw is a live slot in rt's env
    let status = unsafe { js_get_reference_value(rt.env(), raw, &mut value) };
    assert_ok(status, "js_get_reference_value");
    value
}
