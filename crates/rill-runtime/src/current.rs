//! Ambient access to the currently executing process.
//!
//! While a worker polls a process, that process is installed in a
//! thread-local slot so the process-facing API (`current()`, `send()`,
//! `defer()`, ...) can reach it without explicit parameter passing. The slot
//! is cleared when the poll - including any exit protocol - finishes.

use std::cell::RefCell;
use std::sync::Arc;

use crate::process::Process;

/// The process a worker thread is currently executing, plus the worker's
/// index (needed by pinning).
pub(crate) struct CurrentProcess {
    pub(crate) process: Arc<Process>,
    pub(crate) worker: usize,
}

thread_local! {
    static CURRENT: RefCell<Option<CurrentProcess>> = const { RefCell::new(None) };
}

/// Installs `process` as the thread's current process for the guard's
/// lifetime.
pub(crate) fn enter(worker: usize, process: Arc<Process>) -> CurrentGuard {
    CURRENT.with(|slot| {
        *slot.borrow_mut() = Some(CurrentProcess { process, worker });
    });
    CurrentGuard { _private: () }
}

/// Clears the thread-local slot on drop.
pub(crate) struct CurrentGuard {
    _private: (),
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        CURRENT.with(|slot| {
            *slot.borrow_mut() = None;
        });
    }
}

/// Runs `f` with the current process.
///
/// # Panics
///
/// Panics if called outside of a Rill process context.
pub(crate) fn with_current<R>(f: impl FnOnce(&CurrentProcess) -> R) -> R {
    CURRENT.with(|slot| {
        let borrow = slot.borrow();
        let current = borrow
            .as_ref()
            .expect("not called from within a Rill process");
        f(current)
    })
}

/// Runs `f` with the current process, or returns `None` outside a process.
pub(crate) fn try_with_current<R>(f: impl FnOnce(&CurrentProcess) -> R) -> Option<R> {
    CURRENT.with(|slot| slot.borrow().as_ref().map(f))
}
