//! Engine platform and event loop ownership
//!
//! A [`Platform`] is the engine's process-level state plus the loop that
//! drives it. Runtimes keep their platform alive; the platform is destroyed
//! once the last clone and the last runtime created on it are gone.
//!
//! Each thread also has a lazily created shared platform. Tearing it down
//! is explicit and one-shot: after [`Platform::teardown_shared`] the thread
//! cannot create another one.

use std::cell::RefCell;
use std::ffi::CStr;
use std::marker::PhantomData;
use std::ptr;
use std::rc::Rc;

use otter_js_sys::*;
use tracing::{debug, warn};

use crate::config::PlatformConfig;
use crate::error::{JsiError, JsiResult, assert_ok, fatal};

/// Allocate and initialize a loop. The caller owns the returned pointer and
/// frees it with `Box::from_raw` after [`close_loop`].
pub(crate) fn new_loop() -> *mut js_loop_t {
    let event_loop = Box::into_raw(Box::new(js_loop_t::default()));
    // SAFETY: freshly allocated, exclusively owned loop
    assert_ok(unsafe { js_loop_init(event_loop) }, "js_loop_init");
    event_loop
}

/// Close `event_loop`, draining it while close reports pending work.
pub(crate) fn close_loop(event_loop: *mut js_loop_t, owner: &'static str) {
    loop {
        // SAFETY: the loop is initialized and owned by the caller
        match unsafe { js_loop_close(event_loop) } {
            JS_OK => return,
            JS_EBUSY => {
                warn!(owner, "event loop busy on close, draining pending work");
                // SAFETY: as above; the loop is not running
                let status = unsafe { js_loop_run(event_loop, JS_RUN_DEFAULT) };
                if status < 0 {
                    fatal(&format!("js_loop_run failed with status {status} while closing {owner} loop"));
                }
            }
            status => fatal(&format!("js_loop_close failed with status {status}")),
        }
    }
}

struct PlatformInner {
    raw: *mut js_platform_t,
    event_loop: *mut js_loop_t,
    config: PlatformConfig,
}

impl Drop for PlatformInner {
    fn drop(&mut self) {
        debug!("destroying platform");

        // SAFETY: every runtime holds a clone of its platform, so no env is
        // left on this platform once the last clone drops
        assert_ok(unsafe { js_destroy_platform(self.raw) }, "js_destroy_platform");

        close_loop(self.event_loop, "platform");

        // SAFETY: the loop was leaked in new_loop and is closed now
        drop(unsafe { Box::from_raw(self.event_loop) });
    }
}

/// Handle to the engine's platform state and its driving loop
///
/// Cloning shares the same platform.
#[derive(Clone)]
pub struct Platform {
    inner: Rc<PlatformInner>,
    /// Marker to make this type !Send + !Sync
    _not_send: PhantomData<*mut ()>,
}

enum SharedPlatform {
    Uninit,
    Live(Platform),
    TornDown,
}

thread_local! {
    static SHARED: RefCell<SharedPlatform> = const { RefCell::new(SharedPlatform::Uninit) };
}

impl Platform {
    /// Create a platform with default settings
    pub fn new() -> JsiResult<Self> {
        Self::with_config(PlatformConfig::default())
    }

    /// Create a platform
    pub fn with_config(config: PlatformConfig) -> JsiResult<Self> {
        let event_loop = new_loop();
        let options = config.to_options();

        let mut raw = ptr::null_mut();
        // SAFETY: the loop is initialized and outlives the platform
        let status = unsafe { js_create_platform(event_loop, &options, &mut raw) };
        if status != JS_OK {
            close_loop(event_loop, "platform");
            // SAFETY: nothing was registered on the loop
            drop(unsafe { Box::from_raw(event_loop) });
            return Err(JsiError::native(format!("js_create_platform failed with status {status}")));
        }

        debug!(
            expose_gc = config.expose_garbage_collection,
            trace_gc = config.trace_garbage_collection,
            "created platform"
        );

        Ok(Self {
            inner: Rc::new(PlatformInner {
                raw,
                event_loop,
                config,
            }),
            _not_send: PhantomData,
        })
    }

    /// The calling thread's shared platform, created on first use
    pub fn shared() -> JsiResult<Self> {
        SHARED.with(|shared| {
            let mut shared = shared.borrow_mut();
            match &*shared {
                SharedPlatform::Live(platform) => Ok(platform.clone()),
                SharedPlatform::TornDown => Err(JsiError::PlatformTornDown),
                SharedPlatform::Uninit => {
                    let platform = Self::new()?;
                    *shared = SharedPlatform::Live(platform.clone());
                    Ok(platform)
                }
            }
        })
    }

    /// Release the calling thread's shared platform.
    ///
    /// Returns `true` if a live shared platform was released. Safe to call
    /// any number of times; runtimes still using the platform keep it alive
    /// until they drop.
    pub fn teardown_shared() -> bool {
        let released = SHARED.with(|shared| std::mem::replace(&mut *shared.borrow_mut(), SharedPlatform::TornDown));
        match released {
            SharedPlatform::Live(platform) => {
                debug!("tearing down shared platform");
                drop(platform);
                true
            }
            SharedPlatform::Uninit | SharedPlatform::TornDown => false,
        }
    }

    pub(crate) fn raw(&self) -> *mut js_platform_t {
        self.inner.raw
    }

    /// Settings the platform was created with
    pub fn config(&self) -> &PlatformConfig {
        &self.inner.config
    }

    /// Engine identifier, e.g. `otter-js`
    pub fn identifier(&self) -> String {
        let mut identifier = ptr::null();
        // SAFETY: the platform is alive
        assert_ok(
            unsafe { js_get_platform_identifier(self.inner.raw, &mut identifier) },
            "js_get_platform_identifier",
        );
        read_static_str(identifier)
    }

    /// Engine version string
    pub fn version(&self) -> String {
        let mut version = ptr::null();
        // SAFETY: the platform is alive
        assert_ok(
            unsafe { js_get_platform_version(self.inner.raw, &mut version) },
            "js_get_platform_version",
        );
        read_static_str(version)
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("identifier", &self.identifier())
            .field("config", &self.inner.config)
            .finish()
    }
}

fn read_static_str(pointer: *const std::ffi::c_char) -> String {
    if pointer.is_null() {
        fatal("platform returned a null string");
    }
    // SAFETY: the engine returns static NUL-terminated strings
    unsafe { CStr::from_ptr(pointer) }.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_identity() {
        let platform = Platform::new().unwrap();
        assert_eq!(platform.identifier(), "otter-js");
        assert!(!platform.version().is_empty());
    }

    #[test]
    fn test_clones_share_platform() {
        let platform = Platform::new().unwrap();
        let clone = platform.clone();
        assert_eq!(platform.raw(), clone.raw());
    }

    #[test]
    fn test_shared_platform_teardown_is_one_shot() {
        // The shared slot is per thread; run on a fresh one.
        std::thread::spawn(|| {
            let first = Platform::shared().unwrap();
            let second = Platform::shared().unwrap();
            assert_eq!(first.raw(), second.raw());
            drop((first, second));

            assert!(Platform::teardown_shared());
            assert!(!Platform::teardown_shared());
            assert!(matches!(Platform::shared(), Err(JsiError::PlatformTornDown)));
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_teardown_before_first_use() {
        std::thread::spawn(|| {
            assert!(!Platform::teardown_shared());
            assert!(Platform::shared().is_err());
        })
        .join()
        .unwrap();
    }
}
