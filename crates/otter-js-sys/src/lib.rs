//! Native engine surface for the Otter embedding bridge
//!
//! This crate exposes a C-shaped engine API: opaque handle types, integer
//! status codes, plain function-pointer callbacks with opaque `data`
//! pointers, and a `js_*` function family covering references, values,
//! properties, arrays, array buffers, functions, wrap/type tags, delegate
//! objects, exceptions and platform/environment/loop lifecycle.
//!
//! Callers must treat every handle as opaque. `js_value_t` handles are only
//! valid until the handle scope they were created in is closed; use
//! `js_create_reference` to keep a value across scopes.
//!
//! Every function returns `JS_OK` on success and a negative status on
//! failure. `JS_PENDING_EXCEPTION` means an exception was placed in the
//! environment's exception slot and must be drained with
//! `js_get_and_clear_last_exception`.
//!
//! The engine behind the surface is an in-process reference engine: a
//! precise mark/sweep heap plus a small expression language for
//! `js_run_script`.

#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]
#![allow(clippy::missing_safety_doc)]

use std::ffi::c_void;
use std::os::raw::c_int;

mod api;
mod builtins;
mod env;
mod event_loop;
mod heap;
mod platform;
mod script;

pub use api::*;
pub use env::js_env_t;
pub use event_loop::{js_loop_alive, js_loop_close, js_loop_init, js_loop_run, js_loop_t};
pub use platform::{
    js_create_platform, js_destroy_platform, js_get_platform_identifier, js_get_platform_version, js_platform_t,
};

// Status codes
pub const JS_OK: c_int = 0;
pub const JS_PENDING_EXCEPTION: c_int = -1;
pub const JS_EINVAL: c_int = -2;
pub const JS_EBUSY: c_int = -16;

/// Pass as a string length to read up to the first NUL byte.
pub const JS_AUTO_LENGTH: usize = usize::MAX;

// Loop run modes
pub type js_run_mode_t = c_int;
pub const JS_RUN_DEFAULT: js_run_mode_t = 0;
pub const JS_RUN_ONCE: js_run_mode_t = 1;

/// Opaque value handle, valid until its handle scope closes.
#[repr(C)]
pub struct js_value_t {
    _private: [u8; 0],
}

/// Opaque reference slot with an engine-managed count.
#[repr(C)]
pub struct js_ref_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct js_handle_scope_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct js_escapable_handle_scope_t {
    _private: [u8; 0],
}

/// Arguments, receiver and trampoline data of a native function call.
pub struct js_callback_info_t {
    pub(crate) receiver: *mut js_value_t,
    pub(crate) args: Vec<*mut js_value_t>,
    pub(crate) data: *mut c_void,
}

/// 128-bit tag attached to an object to identify its native payload.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct js_type_tag_t {
    pub lower: u64,
    pub upper: u64,
}

// Value types reported by `js_typeof`
pub type js_value_type_t = c_int;
pub const js_undefined: js_value_type_t = 0;
pub const js_null: js_value_type_t = 1;
pub const js_boolean: js_value_type_t = 2;
pub const js_number: js_value_type_t = 3;
pub const js_string: js_value_type_t = 4;
pub const js_symbol: js_value_type_t = 5;
pub const js_object: js_value_type_t = 6;
pub const js_function: js_value_type_t = 7;
pub const js_external: js_value_type_t = 8;
pub const js_bigint: js_value_type_t = 9;

// Callback types
pub type js_function_cb =
    Option<unsafe extern "C" fn(env: *mut js_env_t, info: *mut js_callback_info_t) -> *mut js_value_t>;

pub type js_finalize_cb =
    Option<unsafe extern "C" fn(env: *mut js_env_t, data: *mut c_void, finalize_hint: *mut c_void)>;

pub type js_delegate_get_cb = Option<
    unsafe extern "C" fn(env: *mut js_env_t, property: *mut js_value_t, data: *mut c_void) -> *mut js_value_t,
>;

pub type js_delegate_has_cb =
    Option<unsafe extern "C" fn(env: *mut js_env_t, property: *mut js_value_t, data: *mut c_void) -> bool>;

pub type js_delegate_set_cb = Option<
    unsafe extern "C" fn(
        env: *mut js_env_t,
        property: *mut js_value_t,
        value: *mut js_value_t,
        data: *mut c_void,
    ) -> bool,
>;

pub type js_delegate_delete_property_cb =
    Option<unsafe extern "C" fn(env: *mut js_env_t, property: *mut js_value_t, data: *mut c_void) -> bool>;

pub type js_delegate_own_keys_cb =
    Option<unsafe extern "C" fn(env: *mut js_env_t, data: *mut c_void) -> *mut js_value_t>;

/// Property interceptors of a delegate object. Unset entries fall back to
/// ordinary property semantics on the delegate itself.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct js_delegate_callbacks_t {
    pub get: js_delegate_get_cb,
    pub has: js_delegate_has_cb,
    pub set: js_delegate_set_cb,
    pub delete_property: js_delegate_delete_property_cb,
    pub own_keys: js_delegate_own_keys_cb,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct js_platform_options_t {
    /// Expose a `gc()` global in every environment of this platform.
    pub expose_garbage_collection: bool,
    /// Log each collection cycle (requires the `gc_logging` feature).
    pub trace_garbage_collection: bool,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct js_env_options_t {
    /// Expose a `gc()` global in this environment.
    pub expose_garbage_collection: bool,
    /// Nesting limit for function calls before a `RangeError` is thrown.
    pub max_call_depth: u32,
}

impl Default for js_env_options_t {
    fn default() -> Self {
        Self {
            expose_garbage_collection: false,
            max_call_depth: 512,
        }
    }
}
