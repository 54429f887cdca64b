// Host callbacks are `unsafe extern "C"` functions handed to the engine;
// their raw pointer arguments are validated by the engine contract.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

//! Embedding interface for the otter-js engine.
//!
//! This crate bridges a JSI-style object model (runtimes, values, host
//! objects, host functions) onto the C-shaped `js_*` surface of
//! [`otter_js_sys`].
//!
//! # Example
//!
//! ```
//! use otter_jsi::{Platform, Runtime};
//!
//! let platform = Platform::new().unwrap();
//! let rt = Runtime::new(&platform).unwrap();
//! let result = rt.eval("1 + 1").unwrap();
//! assert_eq!(result.as_number().unwrap(), 2.0);
//! ```
//!
//! # Values and references
//!
//! Strings, symbols, bigints and objects hold a counted reference slot in
//! the runtime that created them. Cloning one bumps the count, dropping it
//! releases the count. A value must only be used with its own runtime;
//! passing it to another is a fatal error.
//!
//! # Thread Safety
//!
//! All types in this crate are `!Send` and `!Sync`: an engine environment
//! and its values belong to the thread that created them.
//!
//! ## Example: Wrong (won't compile)
//!
//! ```compile_fail
//! use otter_jsi::{Platform, Runtime};
//! use std::thread;
//!
//! let platform = Platform::new().unwrap();
//! let rt = Runtime::new(&platform).unwrap();
//! thread::spawn(move || {
//!     rt.eval("1 + 1"); // Error: Runtime is !Send
//! });
//! ```

mod array_buffer;
mod bigint;
mod config;
mod convert;
mod error;
mod exception;
mod function;
mod host_function;
mod host_object;
mod instrumentation;
mod native_state;
mod object;
mod platform;
mod reference;
mod runtime;
mod script;
mod string;
mod symbol;
mod value;

pub use array_buffer::{ArrayBuffer, MutableBuffer, VecBuffer};
pub use bigint::BigInt;
pub use config::{PlatformConfig, RuntimeConfig};
pub use error::{JsiError, JsiResult};
pub use exception::JsError;
pub use function::Function;
pub use host_function::HostFunction;
pub use host_object::HostObject;
pub use instrumentation::{HeapStatsCallback, HeapStatsUpdate, InertInstrumentation, Instrumentation};
pub use native_state::NativeState;
pub use object::{Array, Object, WeakObject};
pub use platform::Platform;
pub use runtime::{Runtime, Scope, ScopeState};
pub use script::{Buffer, PreparedJavaScript, StringBuffer};
pub use string::{AsPropertyKey, JsString, PropNameId};
pub use symbol::Symbol;
pub use value::Value;

// Re-export the engine surface for direct access when needed
pub use otter_js_sys;
