//! Single-threaded task loop driving platforms and environments.
//!
//! The loop owns a FIFO of deferred tasks (close callbacks, deferred
//! finalizers) and a count of active handles. It can only be closed once
//! both are empty, mirroring libuv's `UV_EBUSY` contract.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::os::raw::c_int;

use crate::{JS_EBUSY, JS_EINVAL, JS_OK, JS_RUN_DEFAULT, JS_RUN_ONCE, js_run_mode_t};

type Task = Box<dyn FnOnce()>;

/// Embedder-allocated event loop.
///
/// Allocate with `Default`, then call `js_loop_init` before use.
#[derive(Default)]
pub struct js_loop_t {
    tasks: RefCell<VecDeque<Task>>,
    active_handles: Cell<usize>,
    initialized: Cell<bool>,
    running: Cell<bool>,
}

impl js_loop_t {
    pub(crate) fn enqueue(&self, task: impl FnOnce() + 'static) {
        self.tasks.borrow_mut().push_back(Box::new(task));
    }

    pub(crate) fn ref_handle(&self) {
        self.active_handles.set(self.active_handles.get() + 1);
    }

    pub(crate) fn unref_handle(&self) {
        self.active_handles.set(self.active_handles.get().saturating_sub(1));
    }

    fn run_one(&self) -> bool {
        // The borrow must end before the task runs; tasks may enqueue more work.
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    fn has_pending(&self) -> bool {
        !self.tasks.borrow().is_empty()
    }
}

pub unsafe extern "C" fn js_loop_init(event_loop: *mut js_loop_t) -> c_int {
    // SAFETY: caller passes a valid, exclusively owned loop
    let Some(event_loop) = (unsafe { event_loop.as_ref() }) else {
        return JS_EINVAL;
    };
    if event_loop.initialized.get() {
        return JS_EINVAL;
    }
    event_loop.initialized.set(true);
    JS_OK
}

/// Run deferred tasks. Returns 1 if work remains afterwards, 0 otherwise.
pub unsafe extern "C" fn js_loop_run(event_loop: *mut js_loop_t, mode: js_run_mode_t) -> c_int {
    // SAFETY: caller passes a loop initialized by js_loop_init
    let Some(event_loop) = (unsafe { event_loop.as_ref() }) else {
        return JS_EINVAL;
    };
    if !event_loop.initialized.get() || event_loop.running.get() {
        return JS_EINVAL;
    }

    event_loop.running.set(true);
    match mode {
        JS_RUN_ONCE => {
            event_loop.run_one();
        }
        JS_RUN_DEFAULT => while event_loop.run_one() {},
        _ => {
            event_loop.running.set(false);
            return JS_EINVAL;
        }
    }
    event_loop.running.set(false);

    c_int::from(event_loop.has_pending())
}

pub unsafe extern "C" fn js_loop_alive(event_loop: *mut js_loop_t, result: *mut bool) -> c_int {
    // SAFETY: caller passes valid pointers
    let (Some(event_loop), Some(result)) = (unsafe { event_loop.as_ref() }, unsafe { result.as_mut() })
    else {
        return JS_EINVAL;
    };
    *result = event_loop.has_pending() || event_loop.active_handles.get() > 0;
    JS_OK
}

/// Close the loop. Fails with `JS_EBUSY` while tasks or active handles remain;
/// run the loop and retry.
pub unsafe extern "C" fn js_loop_close(event_loop: *mut js_loop_t) -> c_int {
    // SAFETY: caller passes a loop initialized by js_loop_init
    let Some(event_loop) = (unsafe { event_loop.as_ref() }) else {
        return JS_EINVAL;
    };
    if !event_loop.initialized.get() {
        return JS_EINVAL;
    }
    if event_loop.has_pending() || event_loop.active_handles.get() > 0 {
        return JS_EBUSY;
    }
    event_loop.initialized.set(false);
    JS_OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_close_requires_drained_loop() {
        let mut event_loop = js_loop_t::default();
        unsafe {
            assert_eq!(js_loop_init(&mut event_loop), JS_OK);

            let ran = Rc::new(Cell::new(0));
            let counter = ran.clone();
            event_loop.enqueue(move || counter.set(counter.get() + 1));

            assert_eq!(js_loop_close(&mut event_loop), JS_EBUSY);
            assert_eq!(js_loop_run(&mut event_loop, JS_RUN_DEFAULT), 0);
            assert_eq!(ran.get(), 1);
            assert_eq!(js_loop_close(&mut event_loop), JS_OK);
        }
    }

    #[test]
    fn test_active_handles_keep_loop_busy() {
        let mut event_loop = js_loop_t::default();
        unsafe {
            js_loop_init(&mut event_loop);
            event_loop.ref_handle();
            assert_eq!(js_loop_close(&mut event_loop), JS_EBUSY);

            let mut alive = false;
            js_loop_alive(&mut event_loop, &mut alive);
            assert!(alive);

            event_loop.unref_handle();
            assert_eq!(js_loop_close(&mut event_loop), JS_OK);
        }
    }

    #[test]
    fn test_tasks_enqueued_by_tasks_run_in_same_drain() {
        let mut event_loop = js_loop_t::default();
        unsafe {
            js_loop_init(&mut event_loop);
            let order = Rc::new(RefCell::new(Vec::new()));

            let loop_ptr: *const js_loop_t = &event_loop;
            let outer = order.clone();
            event_loop.enqueue(move || {
                outer.borrow_mut().push(1);
                let inner = outer.clone();
                (*loop_ptr).enqueue(move || inner.borrow_mut().push(2));
            });

            assert_eq!(js_loop_run(&mut event_loop, JS_RUN_ONCE), 1);
            assert_eq!(js_loop_run(&mut event_loop, JS_RUN_DEFAULT), 0);
            assert_eq!(*order.borrow(), vec![1, 2]);
        }
    }
}
