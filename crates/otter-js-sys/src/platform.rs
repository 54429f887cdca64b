//! Process-level engine state shared by environments.

use std::cell::Cell;
use std::ffi::{CStr, c_char};
use std::os::raw::c_int;

use crate::event_loop::js_loop_t;
use crate::{JS_EINVAL, JS_OK, js_platform_options_t};

const IDENTIFIER: &CStr = c"otter-js";
const VERSION: &CStr = match CStr::from_bytes_with_nul(concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes()) {
    Ok(version) => version,
    Err(_) => c"0.0.0",
};

pub struct js_platform_t {
    pub(crate) options: js_platform_options_t,
    pub(crate) event_loop: *mut js_loop_t,
    pub(crate) envs: Cell<usize>,
    destroyed: Cell<bool>,
}

pub unsafe extern "C" fn js_create_platform(
    event_loop: *mut js_loop_t,
    options: *const js_platform_options_t,
    result: *mut *mut js_platform_t,
) -> c_int {
    // SAFETY: caller passes a live loop and a writable result slot
    let (Some(loop_ref), Some(result)) = (unsafe { event_loop.as_ref() }, unsafe { result.as_mut() }) else {
        return JS_EINVAL;
    };

    // SAFETY: options is either null or points to a valid options struct
    let options = unsafe { options.as_ref() }.copied().unwrap_or_default();

    loop_ref.ref_handle();

    *result = Box::into_raw(Box::new(js_platform_t {
        options,
        event_loop,
        envs: Cell::new(0),
        destroyed: Cell::new(false),
    }));
    JS_OK
}

/// Destroy a platform. All of its environments must have been destroyed.
/// The platform is released by a close callback on its loop.
pub unsafe extern "C" fn js_destroy_platform(platform: *mut js_platform_t) -> c_int {
    // SAFETY: caller passes a platform created by js_create_platform
    let Some(platform_ref) = (unsafe { platform.as_ref() }) else {
        return JS_EINVAL;
    };
    if platform_ref.destroyed.get() || platform_ref.envs.get() > 0 {
        return JS_EINVAL;
    }
    platform_ref.destroyed.set(true);

    let event_loop = platform_ref.event_loop;
    // SAFETY: the loop outlives every platform created on it
    unsafe { &*event_loop }.enqueue(move || {
        // SAFETY: this close callback is the sole owner of the platform now
        unsafe {
            drop(Box::from_raw(platform));
            (*event_loop).unref_handle();
        }
    });
    JS_OK
}

pub unsafe extern "C" fn js_get_platform_identifier(
    platform: *mut js_platform_t,
    result: *mut *const c_char,
) -> c_int {
    // SAFETY: caller passes valid pointers
    let (Some(_), Some(result)) = (unsafe { platform.as_ref() }, unsafe { result.as_mut() }) else {
        return JS_EINVAL;
    };
    *result = IDENTIFIER.as_ptr();
    JS_OK
}

pub unsafe extern "C" fn js_get_platform_version(
    platform: *mut js_platform_t,
    result: *mut *const c_char,
) -> c_int {
    // SAFETY: caller passes valid pointers
    let (Some(_), Some(result)) = (unsafe { platform.as_ref() }, unsafe { result.as_mut() }) else {
        return JS_EINVAL;
    };
    *result = VERSION.as_ptr();
    JS_OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::{js_loop_close, js_loop_init, js_loop_run};
    use crate::{JS_EBUSY, JS_RUN_DEFAULT};
    use std::ptr;

    #[test]
    fn test_platform_lifecycle_drains_loop() {
        let mut event_loop = js_loop_t::default();
        unsafe {
            assert_eq!(js_loop_init(&mut event_loop), JS_OK);

            let mut platform = ptr::null_mut();
            assert_eq!(js_create_platform(&mut event_loop, ptr::null(), &mut platform), JS_OK);

            let mut identifier = ptr::null();
            assert_eq!(js_get_platform_identifier(platform, &mut identifier), JS_OK);
            assert_eq!(CStr::from_ptr(identifier).to_str().unwrap(), "otter-js");

            assert_eq!(js_destroy_platform(platform), JS_OK);
            assert_eq!(js_loop_close(&mut event_loop), JS_EBUSY);
            js_loop_run(&mut event_loop, JS_RUN_DEFAULT);
            assert_eq!(js_loop_close(&mut event_loop), JS_OK);
        }
    }

    #[test]
    fn test_version_matches_crate() {
        assert_eq!(VERSION.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
    }
}
