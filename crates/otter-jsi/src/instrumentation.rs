//! Instrumentation hooks
//!
//! The engine exposes no heap statistics, sampling or profiling, so the
//! only implementation is inert. Trace dumps report
//! [`JsiError::Unsupported`] rather than producing an empty artifact.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::error::{JsiError, JsiResult};

/// One heap fragment update: `(fragment id, object count, byte size)`
pub type HeapStatsUpdate = (u64, u64, u64);

/// Receives `(last seen object id, timestamp, updates)` while heap object
/// tracking is on
pub type HeapStatsCallback = Box<dyn FnMut(u64, Duration, Vec<HeapStatsUpdate>)>;

/// Heap and profiling introspection for a runtime
pub trait Instrumentation {
    /// Summary of recorded collections
    fn recorded_gc_stats(&self) -> String;

    /// Named heap counters
    fn heap_info(&self, include_expensive: bool) -> HashMap<String, i64>;

    fn collect_garbage(&self, cause: &str);

    fn start_tracking_heap_object_stack_traces(&self, callback: HeapStatsCallback);

    fn stop_tracking_heap_object_stack_traces(&self);

    fn start_heap_sampling(&self, sampling_interval: usize);

    fn stop_heap_sampling(&self, out: &mut dyn Write) -> JsiResult<()>;

    fn create_snapshot_to_file(&self, path: &Path) -> JsiResult<()>;

    fn create_snapshot_to_stream(&self, out: &mut dyn Write) -> JsiResult<()>;

    fn flush_and_disable_bridge_traffic_trace(&self) -> JsiResult<String>;

    fn write_basic_block_profile_trace_to_file(&self, path: &Path) -> JsiResult<()>;

    fn dump_profiler_symbols_to_file(&self, path: &Path) -> JsiResult<()>;
}

/// Instrumentation that records nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct InertInstrumentation;

pub(crate) static INERT_INSTRUMENTATION: InertInstrumentation = InertInstrumentation;

impl Instrumentation for InertInstrumentation {
    fn recorded_gc_stats(&self) -> String {
        String::new()
    }

    fn heap_info(&self, _include_expensive: bool) -> HashMap<String, i64> {
        HashMap::new()
    }

    fn collect_garbage(&self, _cause: &str) {}

    fn start_tracking_heap_object_stack_traces(&self, _callback: HeapStatsCallback) {}

    fn stop_tracking_heap_object_stack_traces(&self) {}

    fn start_heap_sampling(&self, _sampling_interval: usize) {}

    fn stop_heap_sampling(&self, _out: &mut dyn Write) -> JsiResult<()> {
        Ok(())
    }

    fn create_snapshot_to_file(&self, _path: &Path) -> JsiResult<()> {
        Ok(())
    }

    fn create_snapshot_to_stream(&self, _out: &mut dyn Write) -> JsiResult<()> {
        Ok(())
    }

    fn flush_and_disable_bridge_traffic_trace(&self) -> JsiResult<String> {
        Err(JsiError::Unsupported("bridge traffic trace"))
    }

    fn write_basic_block_profile_trace_to_file(&self, _path: &Path) -> JsiResult<()> {
        Err(JsiError::Unsupported("basic block profile trace"))
    }

    fn dump_profiler_symbols_to_file(&self, _path: &Path) -> JsiResult<()> {
        Err(JsiError::Unsupported("profiler symbol dump"))
    }
}
