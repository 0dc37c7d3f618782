//! Scheduler pool.
//!
//! A fixed set of OS worker threads cooperatively multiplexes the runtime's
//! processes (M:N). Each worker owns a FIFO run-queue; spawned and woken
//! processes land in a shared injector from which idle workers pull, and
//! workers steal from each other's queues under starvation. A process pinned
//! to a worker is routed through that worker's private pinned queue, which is
//! never stolen from.

mod timer;
mod worker;

pub(crate) use timer::TimerHandle;
pub(crate) use worker::spawn_workers;

use crossbeam_deque::{Injector, Stealer, Worker as LocalQueue};
use crossbeam_utils::sync::Unparker;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::process::Process;

/// Scheduler state shared between workers, wakers, and the spawn path.
pub(crate) struct SchedulerShared {
    /// Queue for newly spawned and woken unpinned processes.
    injector: Injector<Arc<Process>>,
    /// Per-worker pinned queues. Only the owning worker pops.
    pinned: Vec<Mutex<VecDeque<Arc<Process>>>>,
    /// Stealers over every worker's local queue.
    stealers: Vec<Stealer<Arc<Process>>>,
    /// One unparker per worker.
    unparkers: Vec<Unparker>,
    /// Round-robin cursor for picking a worker to unpark.
    next_unpark: AtomicUsize,
    shutdown: AtomicBool,
}

impl SchedulerShared {
    pub(crate) fn new(
        locals: &[LocalQueue<Arc<Process>>],
        unparkers: Vec<Unparker>,
    ) -> Self {
        Self {
            injector: Injector::new(),
            pinned: locals.iter().map(|_| Mutex::new(VecDeque::new())).collect(),
            stealers: locals.iter().map(|q| q.stealer()).collect(),
            unparkers,
            next_unpark: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Makes a runnable process available to the pool.
    ///
    /// Pinned processes go to their worker's private queue; everything else
    /// goes through the injector so any worker can pick it up.
    pub(crate) fn enqueue(&self, process: Arc<Process>) {
        match process.pinned_worker() {
            Some(index) => {
                self.pinned[index].lock().push_back(process);
                self.unparkers[index].unpark();
            }
            None => {
                self.injector.push(process);
                self.unpark_one();
            }
        }
    }

    pub(crate) fn injector(&self) -> &Injector<Arc<Process>> {
        &self.injector
    }

    pub(crate) fn stealers(&self) -> &[Stealer<Arc<Process>>] {
        &self.stealers
    }

    pub(crate) fn pop_pinned(&self, worker: usize) -> Option<Arc<Process>> {
        self.pinned[worker].lock().pop_front()
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stops the pool. Workers drain out of their loops on the next
    /// iteration.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        for unparker in &self.unparkers {
            unparker.unpark();
        }
    }

    fn unpark_one(&self) {
        if self.unparkers.is_empty() {
            return;
        }
        let index = self.next_unpark.fetch_add(1, Ordering::Relaxed) % self.unparkers.len();
        self.unparkers[index].unpark();
    }
}
