//! Configuration for platforms and runtimes.

use otter_js_sys::{js_env_options_t, js_platform_options_t};

/// Platform settings, applied to every runtime created on the platform.
#[derive(Debug, Clone, Default)]
pub struct PlatformConfig {
    /// Expose a `gc()` global in every environment.
    /// Default: false
    pub expose_garbage_collection: bool,

    /// Log each collection cycle. Needs the engine's `gc_logging` feature.
    /// Default: false
    pub trace_garbage_collection: bool,
}

impl PlatformConfig {
    /// Create a platform config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether `gc()` is exposed to scripts.
    pub fn expose_garbage_collection(mut self, expose: bool) -> Self {
        self.expose_garbage_collection = expose;
        self
    }

    /// Set whether collection cycles are logged.
    pub fn trace_garbage_collection(mut self, trace: bool) -> Self {
        self.trace_garbage_collection = trace;
        self
    }

    pub(crate) fn to_options(&self) -> js_platform_options_t {
        js_platform_options_t {
            expose_garbage_collection: self.expose_garbage_collection,
            trace_garbage_collection: self.trace_garbage_collection,
        }
    }
}

/// Per-runtime settings.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Expose a `gc()` global in this runtime even if the platform does not.
    /// Default: false
    pub expose_garbage_collection: bool,

    /// Nested call limit before a `RangeError` is thrown. Host functions
    /// and host object accessors count towards it.
    /// Default: 512
    pub max_call_depth: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            expose_garbage_collection: false,
            max_call_depth: js_env_options_t::default().max_call_depth,
        }
    }
}

impl RuntimeConfig {
    /// Create a runtime config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by the environment:
    ///
    /// - `OTTER_JSI_EXPOSE_GC`: truthy values expose `gc()`
    /// - `OTTER_JSI_MAX_CALL_DEPTH`: nested call limit
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("OTTER_JSI_EXPOSE_GC") {
            config.expose_garbage_collection = parse_env_truthy(&value);
        }
        if let Some(depth) = parse_env_u32("OTTER_JSI_MAX_CALL_DEPTH") {
            config.max_call_depth = depth;
        }
        config
    }

    /// Set whether `gc()` is exposed to scripts.
    pub fn expose_garbage_collection(mut self, expose: bool) -> Self {
        self.expose_garbage_collection = expose;
        self
    }

    /// Set the nested call limit.
    pub fn max_call_depth(mut self, depth: u32) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub(crate) fn to_options(&self) -> js_env_options_t {
        js_env_options_t {
            expose_garbage_collection: self.expose_garbage_collection,
            max_call_depth: self.max_call_depth,
        }
    }
}

/// Anything but an empty string or an explicit "off" spelling counts as set
fn parse_env_truthy(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    !matches!(value.as_str(), "" | "0" | "false" | "off" | "no")
}

fn parse_env_u32(var_name: &str) -> Option<u32> {
    std::env::var(var_name).ok()?.trim().parse().ok()
}
