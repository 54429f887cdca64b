//! Runtime: one engine environment on its own event loop
//!
//! A [`Runtime`] owns a `js_env_t` and the loop it runs on, and keeps its
//! [`Platform`] alive. Every value handed to embedder code holds a
//! reference slot in this environment; see [`crate::reference`].

use std::marker::PhantomData;
use std::ptr;
use std::rc::{Rc, Weak};

use otter_js_sys::*;
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::error::{JsiError, JsiResult, assert_ok};
use crate::instrumentation::{INERT_INSTRUMENTATION, Instrumentation};
use crate::object::Object;
use crate::platform::{Platform, close_loop, new_loop};
use crate::script::{Buffer, PreparedJavaScript, StringBuffer};
use crate::value::Value;

pub(crate) struct RuntimeInner {
    env: *mut js_env_t,
    event_loop: *mut js_loop_t,
    platform: Platform,
}

impl RuntimeInner {
    pub(crate) fn env(&self) -> *mut js_env_t {
        self.env
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        debug!("destroying runtime environment");

        // SAFETY: the env was created in Runtime::with_config and is destroyed once
        let status = unsafe { js_destroy_env(self.env) };
        assert_ok(status, "js_destroy_env");

        close_loop(self.event_loop, "runtime");

        // SAFETY: the loop was leaked in new_loop and is closed now
        drop(unsafe { Box::from_raw(self.event_loop) });
    }
}

/// A JavaScript execution environment
///
/// # Thread Safety
///
/// This type is `!Send` and `!Sync`: the environment and every value
/// created in it belong to the thread that owns its loop.
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
    /// Marker to make this type !Send + !Sync
    _not_send: PhantomData<*mut ()>,
}

impl Runtime {
    /// Create a runtime on `platform` with default settings
    pub fn new(platform: &Platform) -> JsiResult<Self> {
        Self::with_config(platform, RuntimeConfig::default())
    }

    /// Create a runtime on `platform`
    pub fn with_config(platform: &Platform, config: RuntimeConfig) -> JsiResult<Self> {
        let event_loop = new_loop();
        let options = config.to_options();

        let mut env = ptr::null_mut();
        // SAFETY: the loop is initialized and the platform is alive for the
        // lifetime of the returned runtime, which holds a clone of it
        let status = unsafe { js_create_env(event_loop, platform.raw(), &options, &mut env) };
        if status != JS_OK {
            close_loop(event_loop, "runtime");
            // SAFETY: the loop never had an env attached and is closed
            drop(unsafe { Box::from_raw(event_loop) });
            return Err(JsiError::native(format!("js_create_env failed with status {status}")));
        }

        debug!(
            expose_gc = config.expose_garbage_collection,
            max_call_depth = config.max_call_depth,
            "created runtime environment"
        );

        Ok(Self::from_inner(Rc::new(RuntimeInner {
            env,
            event_loop,
            platform: platform.clone(),
        })))
    }

    pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
        Self {
            inner,
            _not_send: PhantomData,
        }
    }

    /// Recover a runtime inside an engine callback. `None` once the
    /// runtime is being torn down.
    pub(crate) fn upgrade(weak: &Weak<RuntimeInner>) -> Option<Self> {
        weak.upgrade().map(Self::from_inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn env(&self) -> *mut js_env_t {
        self.inner.env
    }

    /// The platform this runtime was created on
    pub fn platform(&self) -> &Platform {
        &self.inner.platform
    }

    // Scripts

    /// Evaluate a script and return its completion value
    pub fn evaluate_javascript(&self, buffer: &dyn Buffer, source_url: &str) -> JsiResult<Value> {
        let _scope = self.scope();
        let env = self.env();
        let bytes = buffer.data();

        let mut source = ptr::null_mut();
        // SAFETY: bytes is valid for its length
        let status = unsafe { js_create_string_utf8(env, bytes.as_ptr(), bytes.len(), &mut source) };
        self.check(status, "js_create_string_utf8")?;

        let mut result = ptr::null_mut();
        // SAFETY: source_url is valid for its length; source is a live handle
        let status = unsafe {
            js_run_script(
                env,
                source_url.as_ptr().cast(),
                source_url.len(),
                source,
                &mut result,
            )
        };
        self.check(status, "js_run_script")?;

        Ok(self.to_embedder(result))
    }

    /// Evaluate a script given as a string slice
    pub fn eval(&self, source: &str) -> JsiResult<Value> {
        self.evaluate_javascript(&StringBuffer::new(source), "<eval>")
    }

    /// Pair a script with its source URL for later evaluation.
    ///
    /// The engine has no separate compile step, so this does no work up
    /// front.
    pub fn prepare_javascript(&self, buffer: Rc<dyn Buffer>, source_url: impl Into<String>) -> PreparedJavaScript {
        PreparedJavaScript::new(buffer, source_url.into())
    }

    /// Evaluate a script returned by [`Runtime::prepare_javascript`]
    pub fn evaluate_prepared_javascript(&self, prepared: &PreparedJavaScript) -> JsiResult<Value> {
        self.evaluate_javascript(prepared.buffer(), prepared.source_url())
    }

    /// Microtasks run whenever control returns from script to native code,
    /// so there is never anything left to drain.
    pub fn drain_microtasks(&self, _max_microtasks_hint: i32) -> JsiResult<bool> {
        Ok(true)
    }

    /// The global object
    pub fn global(&self) -> Object {
        let _scope = self.scope();
        let mut global = ptr::null_mut();
        // SAFETY: env is live
        assert_ok(unsafe { js_get_global(self.env(), &mut global) }, "js_get_global");
        Object::from_reference(self.capture(global))
    }

    /// Engine identifier reported by the platform
    pub fn description(&self) -> String {
        self.inner.platform.identifier()
    }

    /// No inspector is available for this engine
    pub fn is_inspectable(&self) -> bool {
        false
    }

    /// Instrumentation hooks; all inert for this engine
    pub fn instrumentation(&self) -> &'static dyn Instrumentation {
        &INERT_INSTRUMENTATION
    }

    /// Run a full collection and the finalizers it queued.
    ///
    /// Fails if called from a finalizer, where the loop is already running.
    pub fn collect_garbage(&self) -> JsiResult<()> {
        // SAFETY: env is live
        assert_ok(
            unsafe { js_request_garbage_collection(self.env()) },
            "js_request_garbage_collection",
        );
        // SAFETY: the loop is owned by this runtime and initialized
        let status = unsafe { js_loop_run(self.inner.event_loop, JS_RUN_DEFAULT) };
        if status < 0 {
            return Err(JsiError::Unsupported("garbage collection while the event loop is running"));
        }
        Ok(())
    }

    // Scopes

    /// Open a handle scope. Scopes must be popped in reverse order.
    pub fn push_scope(&self) -> ScopeState {
        let mut raw = ptr::null_mut();
        // SAFETY: env is live
        assert_ok(unsafe { js_open_handle_scope(self.env(), &mut raw) }, "js_open_handle_scope");
        ScopeState {
            raw,
            _not_send: PhantomData,
        }
    }

    /// Close a scope opened by [`Runtime::push_scope`]
    pub fn pop_scope(&self, state: ScopeState) {
        // SAFETY: env is live; the scope came from push_scope
        let status = unsafe { js_close_handle_scope(self.env(), state.raw) };
        assert_ok(status, "js_close_handle_scope");
    }

    pub(crate) fn scope(&self) -> Scope<'_> {
        Scope::new(self)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").field("env", &self.inner.env).finish()
    }
}

/// Token for a scope opened with [`Runtime::push_scope`]
#[must_use = "scopes must be popped with Runtime::pop_scope"]
pub struct ScopeState {
    raw: *mut js_handle_scope_t,
    _not_send: PhantomData<*mut ()>,
}

/// RAII handle scope. Engine handles created while it is alive are
/// released when it drops; values already returned to the caller are not
/// affected.
pub struct Scope<'rt> {
    runtime: &'rt Runtime,
    state: Option<ScopeState>,
}

impl<'rt> Scope<'rt> {
    pub fn new(runtime: &'rt Runtime) -> Self {
        Self {
            runtime,
            state: Some(runtime.push_scope()),
        }
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.runtime.pop_scope(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_description_is_platform_identifier() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        assert_eq!(rt.description(), "otter-js");
        assert!(!rt.is_inspectable());
        assert!(rt.drain_microtasks(-1).unwrap());
    }

    #[test]
    fn test_eval_completion_value() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let value = rt.eval("1 + 1").unwrap();
        assert_eq!(value.as_number().unwrap(), 2.0);
    }

    #[test]
    fn test_nested_scopes_pop_in_order() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let outer = rt.push_scope();
        {
            let _inner = Scope::new(&rt);
            rt.eval("'scoped'").unwrap();
        }
        rt.pop_scope(outer);
    }

    #[test]
    #[should_panic(expected = "js_close_handle_scope failed")]
    fn test_out_of_order_pop_is_fatal() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let outer = rt.push_scope();
        let _inner = rt.push_scope();
        rt.pop_scope(outer);
    }

    #[test]
    fn test_runtime_outlives_dropped_platform_handle() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        drop(platform);
        assert_eq!(rt.eval("40 + 2").unwrap().as_number().unwrap(), 42.0);
    }
}
