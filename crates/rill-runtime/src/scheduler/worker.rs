//! Worker threads.
//!
//! Each worker loops: find a runnable process (pinned queue, then local
//! queue, then the injector, then stealing from siblings), poll its
//! instruction stream until it yields control, handle the outcome, repeat.
//! A worker that finds nothing parks until a wake arrives.

use crossbeam_deque::{Steal, Worker as LocalQueue};
use crossbeam_utils::sync::Parker;
use rill_core::ExitReason;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::current;
use crate::error::RuntimeError;
use crate::process::{unwind_reason, Process};
use crate::runtime::RuntimeShared;

/// How often (in scheduling ticks) a worker checks the injector before its
/// local queue, so queued-but-never-local processes are not starved.
const INJECTOR_CHECK_INTERVAL: u32 = 61;

/// Upper bound on a park; shutdown and rare cross-queue races are re-checked
/// at least this often.
const PARK_TIMEOUT: Duration = Duration::from_millis(100);

/// Spawns the fixed worker set. If any thread fails to spawn, the pool is
/// shut down and the error is returned: this is a runtime-fatal condition no
/// process can recover from.
pub(crate) fn spawn_workers(
    shared: &Arc<RuntimeShared>,
    locals: Vec<LocalQueue<Arc<Process>>>,
    parkers: Vec<Parker>,
) -> Result<Vec<JoinHandle<()>>, RuntimeError> {
    let mut handles = Vec::with_capacity(locals.len());
    for (index, (local, parker)) in locals.into_iter().zip(parkers).enumerate() {
        let worker_shared = shared.clone();
        let result = std::thread::Builder::new()
            .name(format!("rill-worker-{index}"))
            .spawn(move || {
                WorkerThread {
                    index,
                    local,
                    shared: worker_shared,
                    parker,
                    tick: 0,
                }
                .run()
            });
        match result {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                tracing::error!(worker = index, error = %err, "failed to spawn scheduler worker");
                shared.scheduler.shutdown();
                for handle in handles {
                    let _ = handle.join();
                }
                return Err(RuntimeError::WorkerSpawn(err));
            }
        }
    }
    Ok(handles)
}

struct WorkerThread {
    index: usize,
    local: LocalQueue<Arc<Process>>,
    shared: Arc<RuntimeShared>,
    parker: Parker,
    tick: u32,
}

impl WorkerThread {
    fn run(mut self) {
        tracing::trace!(worker = self.index, "worker started");
        loop {
            if self.shared.scheduler.is_shutdown() {
                break;
            }
            match self.next_process() {
                Some(process) => self.run_process(process),
                None => self.parker.park_timeout(PARK_TIMEOUT),
            }
        }
        tracing::trace!(worker = self.index, "worker stopped");
    }

    fn next_process(&mut self) -> Option<Arc<Process>> {
        self.tick = self.tick.wrapping_add(1);

        // Pinned work is only runnable here; it goes first.
        if let Some(process) = self.shared.scheduler.pop_pinned(self.index) {
            return Some(process);
        }
        // Fairness: periodically prefer the injector over local work so a
        // busy worker cannot starve globally queued processes forever.
        if self.tick % INJECTOR_CHECK_INTERVAL == 0 {
            if let Some(process) = self.take_injected() {
                return Some(process);
            }
        }
        if let Some(process) = self.local.pop() {
            return Some(process);
        }
        if let Some(process) = self.take_injected() {
            return Some(process);
        }
        self.steal_from_siblings()
    }

    fn take_injected(&self) -> Option<Arc<Process>> {
        loop {
            match self
                .shared
                .scheduler
                .injector()
                .steal_batch_and_pop(&self.local)
            {
                Steal::Success(process) => return Some(process),
                Steal::Empty => return None,
                Steal::Retry => {}
            }
        }
    }

    fn steal_from_siblings(&self) -> Option<Arc<Process>> {
        let stealers = self.shared.scheduler.stealers();
        for (victim, stealer) in stealers.iter().enumerate() {
            if victim == self.index {
                continue;
            }
            loop {
                match stealer.steal_batch_and_pop(&self.local) {
                    Steal::Success(process) => return Some(process),
                    Steal::Empty => break,
                    Steal::Retry => {}
                }
            }
        }
        None
    }

    /// Polls a process until it yields control, then applies the outcome:
    /// park on `Pending`, exit protocol on completion or unwind.
    fn run_process(&self, process: Arc<Process>) {
        if !process.transition_to_running() {
            // Terminated while queued.
            return;
        }

        let waker = Waker::from(process.clone());
        let mut cx = Context::from_waker(&waker);

        let _guard = current::enter(self.index, process.clone());

        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut slot = process.future_slot().lock();
            match slot.as_mut() {
                Some(future) => future.as_mut().poll(&mut cx),
                None => Poll::Ready(()),
            }
        }));

        match result {
            Ok(Poll::Pending) => {
                if !process.finish_poll() {
                    // Notified mid-poll; it is runnable again already.
                    self.shared.scheduler.enqueue(process);
                }
            }
            Ok(Poll::Ready(())) => self.retire(process, ExitReason::Normal),
            Err(payload) => self.retire(process, unwind_reason(payload)),
        }
    }

    /// The exit protocol: drop the instruction stream, drain deferred
    /// cleanup innermost-first, invoke the panic handler (panics only),
    /// then remove the process from the table.
    ///
    /// Runs with the dying process still installed as current, so deferred
    /// blocks and the handler can send messages on its behalf.
    fn retire(&self, process: Arc<Process>, reason: ExitReason) {
        *process.future_slot().lock() = None;

        process.run_remaining_defers();

        if let ExitReason::Panic(message) = &reason {
            match process.take_panic_handler() {
                Some(handler) => {
                    let message = message.clone();
                    if catch_unwind(AssertUnwindSafe(move || handler(message))).is_err() {
                        tracing::error!(pid = %process.pid(), "panic handler itself panicked");
                    }
                }
                None => {
                    tracing::error!(pid = %process.pid(), message = %message, "process panicked");
                }
            }
        }

        process.mark_terminated(reason.clone());
        self.shared.table.remove(process.pid());
        tracing::trace!(pid = %process.pid(), reason = %reason, "process exited");

        if process.is_root() {
            self.shared.notify_root_exit(reason);
        }
    }
}
