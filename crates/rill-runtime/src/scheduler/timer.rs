//! Timer thread.
//!
//! A single thread owns a min-heap of deadlines and wakes parked processes
//! when their deadline passes. All deadlines are `std::time::Instant`
//! (monotonic); the runtime guarantees a minimum wait only - actual latency
//! is bounded below by the deadline and above by scheduling.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::task::Waker;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::error::RuntimeError;

struct Entry {
    deadline: Instant,
    /// Registration order; keeps comparisons total for equal deadlines.
    seq: u64,
    waker: Waker,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest deadline
        // on top.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct State {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    shutdown: bool,
}

struct Inner {
    state: Mutex<State>,
    cvar: Condvar,
}

/// Handle for registering deadlines with the timer thread.
#[derive(Clone)]
pub(crate) struct TimerHandle {
    inner: Arc<Inner>,
}

impl TimerHandle {
    /// Starts the timer thread.
    pub(crate) fn start() -> Result<(TimerHandle, JoinHandle<()>), RuntimeError> {
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            cvar: Condvar::new(),
        });
        let thread_inner = inner.clone();
        let thread = std::thread::Builder::new()
            .name("rill-timer".to_string())
            .spawn(move || timer_loop(thread_inner))
            .map_err(RuntimeError::TimerSpawn)?;
        Ok((TimerHandle { inner }, thread))
    }

    /// Registers `waker` to be woken once `deadline` has passed.
    pub(crate) fn register(&self, deadline: Instant, waker: Waker) {
        let mut state = self.inner.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Entry {
            deadline,
            seq,
            waker,
        });
        // The new entry may be earlier than what the thread is sleeping on.
        self.inner.cvar.notify_one();
    }

    pub(crate) fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.shutdown = true;
        self.inner.cvar.notify_one();
    }
}

fn timer_loop(inner: Arc<Inner>) {
    let mut due: Vec<Waker> = Vec::new();
    loop {
        {
            let mut state = inner.state.lock();
            loop {
                if state.shutdown {
                    return;
                }
                let now = Instant::now();
                while state
                    .heap
                    .peek()
                    .is_some_and(|entry| entry.deadline <= now)
                {
                    if let Some(entry) = state.heap.pop() {
                        due.push(entry.waker);
                    }
                }
                if !due.is_empty() {
                    break;
                }
                match state.heap.peek().map(|entry| entry.deadline) {
                    Some(deadline) => {
                        inner.cvar.wait_until(&mut state, deadline);
                    }
                    None => {
                        inner.cvar.wait(&mut state);
                    }
                }
            }
        }
        // Wake outside the lock: wakes re-enter the scheduler.
        for waker in due.drain(..) {
            waker.wake();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;
    use std::time::Duration;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_timer_fires_after_deadline() {
        let (timer, thread) = TimerHandle::start().unwrap();
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));

        let start = Instant::now();
        timer.register(
            start + Duration::from_millis(10),
            Waker::from(counter.clone()),
        );

        while counter.0.load(Ordering::SeqCst) == 0 {
            assert!(start.elapsed() < Duration::from_secs(5), "timer never fired");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(start.elapsed() >= Duration::from_millis(10));

        timer.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn test_earlier_registration_preempts_sleep() {
        let (timer, thread) = TimerHandle::start().unwrap();
        let late = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let early = Arc::new(CountingWaker(AtomicUsize::new(0)));

        let now = Instant::now();
        timer.register(now + Duration::from_secs(60), Waker::from(late.clone()));
        timer.register(now + Duration::from_millis(5), Waker::from(early.clone()));

        while early.0.load(Ordering::SeqCst) == 0 {
            assert!(now.elapsed() < Duration::from_secs(5), "early timer stuck behind late one");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(late.0.load(Ordering::SeqCst), 0);

        timer.shutdown();
        thread.join().unwrap();
    }
}
