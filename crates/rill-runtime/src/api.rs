//! The process-facing API surface.
//!
//! These free functions operate on the process currently executing on the
//! calling worker thread. They are what the instruction-execution layer (and
//! Rust-level process bodies) call to interact with the runtime.
//!
//! Unless noted otherwise, every function here panics if called outside of a
//! Rill process context.

use rill_core::{Pid, Term};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use crate::current as current_process;
use crate::mailbox::Receive;
use crate::process::{Process, UnwindCause, WaitKind};
use crate::runtime::spawn_on;

/// Spawns a child process in the caller's runtime.
///
/// Asynchronous: the child's pid is returned immediately; the child is
/// registered and runnable but has not necessarily run yet.
///
/// # Example
///
/// ```ignore
/// let child = rill_runtime::spawn(|| async {
///     println!("hello from {}", rill_runtime::current());
/// });
/// ```
pub fn spawn<F, Fut>(f: F) -> Pid
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    current_process::with_current(|cur| spawn_on(cur.process.shared(), f, false))
}

/// Returns the identifier of the calling process.
pub fn current() -> Pid {
    current_process::with_current(|cur| cur.process.pid())
}

/// Returns the calling process's pid, or `None` outside a process context.
pub fn try_current() -> Option<Pid> {
    current_process::try_with_current(|cur| cur.process.pid())
}

/// Sends a typed message to another process.
///
/// Never fails: sending to a dead or unknown pid silently drops the message,
/// since senders may race with termination. The value is encoded into a
/// fresh buffer at the call site; ownership of that buffer moves to the
/// receiver.
pub fn send<M: Term>(pid: Pid, msg: &M) {
    send_raw(pid, msg.encode());
}

/// Sends raw bytes to another process. Same contract as [`send`].
pub fn send_raw(pid: Pid, data: Vec<u8>) {
    current_process::with_current(|cur| {
        if let Some(handle) = cur.process.shared().table.lookup(pid) {
            let _ = handle.send_raw(data);
        }
    });
}

/// Receives the next message from the calling process's own mailbox.
///
/// With no timeout, waits until a message arrives. With a timeout, returns
/// `None` once at least `timeout` has elapsed with nothing queued - a
/// normal outcome, not an error. Messages come back oldest first.
///
/// Only the owning process can receive from its mailbox; there is no way to
/// construct a receive for another process.
pub async fn receive(timeout: Option<Duration>) -> Option<Vec<u8>> {
    Receive::new(timeout).await
}

/// Ends the calling process immediately and unconditionally.
///
/// No further instructions in its stream run. Deferred blocks registered
/// before this point still run: termination is an unwind cause, not a bypass
/// of cleanup. No panic handler is invoked and nothing is reported.
pub fn terminate() -> ! {
    std::panic::panic_any(UnwindCause::Terminate)
}

/// Voluntarily yields the worker thread.
///
/// With no duration this is a bare cooperative yield - the process becomes
/// runnable again as soon as the scheduler revisits it - and doubles as the
/// preemption point the instruction-execution layer must call periodically.
/// With a duration, the process will not become runnable again until at
/// least that much wall-clock time has elapsed (it may take longer, never
/// less; the clock is monotonic).
pub async fn suspend(duration: Option<Duration>) {
    match duration {
        None => YieldNow { yielded: false }.await,
        Some(duration) => {
            Sleep {
                duration,
                deadline: None,
                registered: false,
            }
            .await
        }
    }
}

/// Runs `f` on a blocking-pool thread, parking the calling process until the
/// result is ready.
///
/// The calling worker is freed to run other processes meanwhile; the
/// process's identity, mailbox, and state are unaffected by the migration.
/// A panic inside `f` resumes on the worker, so the process unwinds through
/// its normal panic protocol.
pub async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let slot = Arc::new(JobSlot {
        result: parking_lot::Mutex::new(None),
        waker: parking_lot::Mutex::new(None),
    });
    let job_slot = slot.clone();
    current_process::with_current(|cur| {
        cur.process.set_wait(WaitKind::Io);
        cur.process.shared().blocking.submit(Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(f));
            *job_slot.result.lock() = Some(result);
            let waker = job_slot.waker.lock().take();
            if let Some(waker) = waker {
                waker.wake();
            }
        }));
    });
    BlockingResult { slot }.await
}

/// Runs `fut` with the calling process pinned to its current OS worker
/// thread, for thread-local-storage-sensitive foreign calls.
///
/// Every resumption inside the block is dispatched to the same worker.
/// Unpins afterwards (also on unwind) and returns the block's result; nested
/// pinned blocks restore the outer pin.
pub async fn pinned<F: Future>(fut: F) -> F::Output {
    struct PinGuard {
        process: Arc<Process>,
        prev: usize,
    }

    impl Drop for PinGuard {
        fn drop(&mut self) {
            self.process.set_pinned_raw(self.prev);
        }
    }

    let _guard = current_process::with_current(|cur| PinGuard {
        prev: cur.process.pin_to(cur.worker),
        process: cur.process.clone(),
    });
    fut.await
}

/// Raises an unrecoverable error in the calling process.
///
/// Unwinds the process's call stack, running deferred blocks scope by scope,
/// then invokes the registered panic handler (if any) with `message`, then
/// terminates the process. Never affects any other process.
pub fn panic(message: impl Into<String>) -> ! {
    std::panic::panic_any(UnwindCause::Panic(message.into()))
}

/// Registers `handler` to run if this process panics, after deferred cleanup
/// and before teardown. Registering again replaces the previous handler.
///
/// With no handler registered, an unhandled panic is reported to the
/// diagnostic stream and only this process terminates (unless it is the
/// root process, in which case `Runtime::run` reports it to the embedder).
pub fn panicking(handler: impl FnOnce(String) + Send + 'static) {
    current_process::with_current(|cur| cur.process.set_panic_handler(Box::new(handler)));
}

/// Registers `block` to run when the immediately enclosing scope exits,
/// whether by normal completion, `terminate()`, or a panic.
///
/// Blocks registered in the same scope run in reverse registration order.
/// Outside any [`scoped`] block, the process's root scope is the enclosing
/// scope, and its defers run at process exit.
pub fn defer(block: impl FnOnce() + Send + 'static) {
    current_process::with_current(|cur| cur.process.defer(Box::new(block)));
}

/// Brackets a lexical scope for [`defer`].
///
/// The instruction-execution layer wraps each source-level block in one of
/// these. On normal exit the scope's deferred blocks run (last-deferred
/// first); on unwind they run as part of the unwind, still innermost-first.
pub async fn scoped<F: Future>(fut: F) -> F::Output {
    let index = current_process::with_current(|cur| cur.process.push_scope());
    let output = fut.await;
    current_process::with_current(|cur| cur.process.pop_scope(index));
    output
}

struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

struct Sleep {
    duration: Duration,
    deadline: Option<Instant>,
    registered: bool,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let deadline = *this
            .deadline
            .get_or_insert_with(|| Instant::now() + this.duration);
        if Instant::now() >= deadline {
            current_process::with_current(|cur| cur.process.set_wait(WaitKind::None));
            return Poll::Ready(());
        }
        current_process::with_current(|cur| {
            if !this.registered {
                cur.process
                    .shared()
                    .timer
                    .register(deadline, cx.waker().clone());
                this.registered = true;
            }
            cur.process.set_wait(WaitKind::Timer);
        });
        Poll::Pending
    }
}

struct JobSlot<T> {
    result: parking_lot::Mutex<Option<std::thread::Result<T>>>,
    waker: parking_lot::Mutex<Option<Waker>>,
}

struct BlockingResult<T> {
    slot: Arc<JobSlot<T>>,
}

impl<T> Future for BlockingResult<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        // Waker first, then result: the job publishes the result before
        // taking the waker, so this order cannot miss a completion.
        *self.slot.waker.lock() = Some(cx.waker().clone());
        let result = self.slot.result.lock().take();
        match result {
            Some(Ok(value)) => {
                current_process::with_current(|cur| cur.process.set_wait(WaitKind::None));
                Poll::Ready(value)
            }
            // Re-raise the job's panic in the owning process.
            Some(Err(payload)) => std::panic::resume_unwind(payload),
            None => Poll::Pending,
        }
    }
}
