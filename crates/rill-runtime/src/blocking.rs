//! Blocking pool.
//!
//! Scheduler workers must never sit in a blocking system call. A process
//! performing one hands its closure to this auxiliary pool, the worker moves
//! on to other runnable processes, and the process is woken (as `Runnable`)
//! when the closure finishes.
//!
//! The pool is elastic: a new thread is spawned when a job arrives and no
//! thread is idle, up to a cap; idle threads retire after a keep-alive.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    queue: Mutex<VecDeque<Job>>,
    cvar: Condvar,
    max_threads: usize,
    keep_alive: Duration,
    /// Threads currently alive.
    total: AtomicUsize,
    /// Threads currently waiting for work.
    idle: AtomicUsize,
    shutdown: AtomicBool,
}

/// The auxiliary thread pool absorbing blocking calls off scheduler workers.
pub(crate) struct BlockingPool {
    inner: Arc<Inner>,
}

impl BlockingPool {
    pub(crate) fn new(max_threads: usize, keep_alive: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                cvar: Condvar::new(),
                max_threads: max_threads.max(1),
                keep_alive,
                total: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Queues a job. Grows the pool if every thread is busy and the cap
    /// allows; otherwise the job waits for a thread to free up.
    pub(crate) fn submit(&self, job: Job) {
        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(job);
        }
        if self.inner.idle.load(Ordering::Acquire) > 0 {
            self.inner.cvar.notify_one();
        } else if self.inner.total.load(Ordering::Acquire) < self.inner.max_threads {
            self.spawn_thread();
        }
        // All threads busy and at cap: the queued job waits.
    }

    fn spawn_thread(&self) {
        self.inner.total.fetch_add(1, Ordering::AcqRel);
        let inner = self.inner.clone();
        let result = std::thread::Builder::new()
            .name("rill-blocking".to_string())
            .spawn(move || blocking_thread(inner));
        if let Err(err) = result {
            let remaining = self.inner.total.fetch_sub(1, Ordering::AcqRel) - 1;
            tracing::error!(error = %err, "failed to spawn blocking-pool thread");
            if remaining == 0 {
                // Nothing will ever run the queued job: infrastructure
                // failure, not recoverable by any process.
                std::process::abort();
            }
        }
    }

    /// Number of live pool threads.
    #[cfg(test)]
    pub(crate) fn thread_count(&self) -> usize {
        self.inner.total.load(Ordering::Acquire)
    }

    pub(crate) fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.cvar.notify_all();
    }
}

fn blocking_thread(inner: Arc<Inner>) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if inner.shutdown.load(Ordering::Acquire) {
                    break None;
                }
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                inner.idle.fetch_add(1, Ordering::AcqRel);
                let timed_out = inner
                    .cvar
                    .wait_for(&mut queue, inner.keep_alive)
                    .timed_out();
                inner.idle.fetch_sub(1, Ordering::AcqRel);
                if timed_out && queue.is_empty() {
                    break None;
                }
            }
        };
        match job {
            Some(job) => job(),
            None => break,
        }
    }
    inner.total.fetch_sub(1, Ordering::AcqRel);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Instant;

    #[test]
    fn test_runs_job() {
        let pool = BlockingPool::new(4, Duration::from_millis(200));
        let (tx, rx) = mpsc::channel();
        pool.submit(Box::new(move || {
            tx.send(42).unwrap();
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        pool.shutdown();
    }

    #[test]
    fn test_grows_under_simultaneous_blocking() {
        let pool = BlockingPool::new(4, Duration::from_millis(200));
        let (tx, rx) = mpsc::channel();
        // Four jobs that each hold a thread until all four are running.
        let barrier = Arc::new(std::sync::Barrier::new(4));
        for _ in 0..4 {
            let tx = tx.clone();
            let barrier = barrier.clone();
            pool.submit(Box::new(move || {
                barrier.wait();
                tx.send(()).unwrap();
            }));
        }
        for _ in 0..4 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        pool.shutdown();
    }

    #[test]
    fn test_respects_thread_cap() {
        let pool = BlockingPool::new(2, Duration::from_millis(200));
        let (tx, rx) = mpsc::channel();
        for i in 0..6 {
            let tx = tx.clone();
            pool.submit(Box::new(move || {
                std::thread::sleep(Duration::from_millis(10));
                tx.send(i).unwrap();
            }));
            assert!(pool.thread_count() <= 2);
        }
        for _ in 0..6 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        pool.shutdown();
    }

    #[test]
    fn test_idle_threads_retire() {
        let pool = BlockingPool::new(4, Duration::from_millis(20));
        let (tx, rx) = mpsc::channel();
        pool.submit(Box::new(move || {
            tx.send(()).unwrap();
        }));
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let start = Instant::now();
        while pool.thread_count() > 0 {
            assert!(
                start.elapsed() < Duration::from_secs(5),
                "idle blocking thread never retired"
            );
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}
