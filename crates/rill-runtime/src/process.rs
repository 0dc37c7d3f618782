//! Process state and handles.
//!
//! A process is a unit of isolated execution:
//! it owns exactly one mailbox, its instruction stream (a boxed future
//! supplied by the loader), a LIFO stack of deferred-cleanup scopes, an
//! optional panic handler, and a pinning slot. Everything except the mailbox
//! push path is private to the process itself; external actors interact only
//! through a [`ProcessHandle`].

use parking_lot::Mutex;
use rill_core::{ExitReason, Pid, Term};
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Wake;

use crate::error::SendError;
use crate::mailbox::{Envelope, Mailbox};
use crate::runtime::RuntimeShared;

/// The instruction stream of a process, as lowered by the loader.
pub(crate) type ProcessFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A deferred cleanup block.
pub(crate) type DeferFn = Box<dyn FnOnce() + Send + 'static>;

/// A registered panic handler. Invoked at most once, with the panic message.
pub(crate) type PanicHandler = Box<dyn FnOnce(String) + Send + 'static>;

/// Scheduling states. `TERMINATED` is absorbing.
mod sched {
    /// Sitting in a run queue, waiting for a worker.
    pub const SCHEDULED: u8 = 0;
    /// Being polled by a worker right now.
    pub const RUNNING: u8 = 1;
    /// Woken while running; the worker re-enqueues after the poll.
    pub const NOTIFIED: u8 = 2;
    /// Parked, waiting for a wake (message, timer, blocking result).
    pub const IDLE: u8 = 3;
    /// Gone. No transitions leave this state.
    pub const TERMINATED: u8 = 4;
}

/// Why an idle process is parked. Purely observational; the wake path does
/// not depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum WaitKind {
    /// Not parked on anything in particular.
    None = 0,
    /// Parked in a (possibly timed) receive.
    Mailbox = 1,
    /// Parked in a timed suspend.
    Timer = 2,
    /// Parked on a blocking-pool handoff.
    Io = 3,
}

impl WaitKind {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => WaitKind::Mailbox,
            2 => WaitKind::Timer,
            3 => WaitKind::Io,
            _ => WaitKind::None,
        }
    }
}

/// Sentinel for "not pinned to any worker".
pub(crate) const UNPINNED: usize = usize::MAX;

/// Externally observable process state, per the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// In a run queue, waiting for a worker thread.
    Runnable,
    /// Executing on a worker thread.
    Running,
    /// Parked on a receive or a blocking handoff.
    Blocked,
    /// Parked on a timer.
    Suspended,
    /// Finished. Absorbing.
    Terminated,
}

/// The cause carried by a runtime-initiated unwind.
///
/// `terminate()` and `panic(msg)` both end a process by unwinding its stack
/// so that deferred cleanup runs; this payload tells the worker which exit
/// protocol to apply afterwards.
pub(crate) enum UnwindCause {
    /// Explicit `terminate()`: run defers, invoke no handler, report nothing.
    Terminate,
    /// `panic(msg)` or a fault promoted to a panic.
    Panic(String),
}

/// Translates a caught unwind payload into an exit reason.
///
/// Raw panics from executed instructions (plain `panic!` with a string) are
/// folded into the panic protocol, per the instruction-layer contract.
pub(crate) fn unwind_reason(payload: Box<dyn Any + Send>) -> ExitReason {
    match payload.downcast::<UnwindCause>() {
        Ok(cause) => match *cause {
            UnwindCause::Terminate => ExitReason::Terminated,
            UnwindCause::Panic(msg) => ExitReason::Panic(msg),
        },
        Err(payload) => {
            if let Some(msg) = payload.downcast_ref::<&'static str>() {
                ExitReason::Panic((*msg).to_string())
            } else if let Some(msg) = payload.downcast_ref::<String>() {
                ExitReason::Panic(msg.clone())
            } else {
                ExitReason::Panic("process panicked".to_string())
            }
        }
    }
}

/// State only ever touched by the owning process or by the worker retiring
/// it, but reachable through clonable handles, hence the lock.
struct Body {
    /// Defer scopes, outermost first. Each scope runs LIFO.
    scopes: Vec<Vec<DeferFn>>,
    /// Registered panic handler, if any. Re-registering replaces.
    panic_handler: Option<PanicHandler>,
    /// Exit reason, recorded at termination.
    exit_reason: Option<ExitReason>,
}

/// A lightweight, isolated process.
pub(crate) struct Process {
    pid: Pid,
    shared: Arc<RuntimeShared>,
    /// The instruction stream. Taken (dropped) at retirement.
    future: Mutex<Option<ProcessFuture>>,
    sched: AtomicU8,
    wait: AtomicU8,
    /// Worker index this process is pinned to, or [`UNPINNED`].
    pinned: AtomicUsize,
    /// Whether this is the runtime's root process.
    root: bool,
    mailbox: Mailbox,
    body: Mutex<Body>,
}

impl Process {
    /// Creates a process ready to be enqueued (born `Runnable`).
    pub(crate) fn new(
        pid: Pid,
        shared: Arc<RuntimeShared>,
        future: ProcessFuture,
        root: bool,
    ) -> Self {
        Self {
            pid,
            shared,
            future: Mutex::new(Some(future)),
            sched: AtomicU8::new(sched::SCHEDULED),
            wait: AtomicU8::new(WaitKind::None as u8),
            pinned: AtomicUsize::new(UNPINNED),
            root,
            mailbox: Mailbox::new(),
            body: Mutex::new(Body {
                // The root scope always exists.
                scopes: vec![Vec::new()],
                panic_handler: None,
                exit_reason: None,
            }),
        }
    }

    pub(crate) fn pid(&self) -> Pid {
        self.pid
    }

    pub(crate) fn is_root(&self) -> bool {
        self.root
    }

    pub(crate) fn shared(&self) -> &Arc<RuntimeShared> {
        &self.shared
    }

    pub(crate) fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub(crate) fn future_slot(&self) -> &Mutex<Option<ProcessFuture>> {
        &self.future
    }

    pub(crate) fn set_wait(&self, kind: WaitKind) {
        self.wait.store(kind as u8, Ordering::Relaxed);
    }

    /// Current lifecycle state.
    pub(crate) fn status(&self) -> ProcessStatus {
        match self.sched.load(Ordering::Acquire) {
            sched::SCHEDULED => ProcessStatus::Runnable,
            sched::RUNNING | sched::NOTIFIED => ProcessStatus::Running,
            sched::TERMINATED => ProcessStatus::Terminated,
            _ => match WaitKind::from_u8(self.wait.load(Ordering::Relaxed)) {
                WaitKind::Timer => ProcessStatus::Suspended,
                _ => ProcessStatus::Blocked,
            },
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.sched.load(Ordering::Acquire) != sched::TERMINATED
    }

    /// `Runnable -> Running`. Fails only if the process terminated while
    /// queued, in which case the worker must skip it.
    pub(crate) fn transition_to_running(&self) -> bool {
        self.sched
            .compare_exchange(
                sched::SCHEDULED,
                sched::RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Called by the worker after a `Pending` poll. Returns `true` if the
    /// process parked; `false` if it was notified mid-poll and must be
    /// re-enqueued by the caller.
    pub(crate) fn finish_poll(&self) -> bool {
        if self
            .sched
            .compare_exchange(
                sched::RUNNING,
                sched::IDLE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            true
        } else {
            // NOTIFIED: a wake landed during the poll.
            self.sched.store(sched::SCHEDULED, Ordering::Release);
            false
        }
    }

    pub(crate) fn mark_terminated(&self, reason: ExitReason) {
        self.body.lock().exit_reason = Some(reason);
        self.sched.store(sched::TERMINATED, Ordering::Release);
    }

    /// Worker index this process is pinned to, if any.
    pub(crate) fn pinned_worker(&self) -> Option<usize> {
        match self.pinned.load(Ordering::Acquire) {
            UNPINNED => None,
            index => Some(index),
        }
    }

    /// Pins to `worker`, returning the previous raw value so nested pinned
    /// blocks restore correctly.
    pub(crate) fn pin_to(&self, worker: usize) -> usize {
        self.pinned.swap(worker, Ordering::AcqRel)
    }

    pub(crate) fn set_pinned_raw(&self, raw: usize) {
        self.pinned.store(raw, Ordering::Release);
    }

    /// Opens a new defer scope; returns its index for the matching pop.
    pub(crate) fn push_scope(&self) -> usize {
        let mut body = self.body.lock();
        body.scopes.push(Vec::new());
        body.scopes.len() - 1
    }

    /// Closes scopes down to and including `index`, running their deferred
    /// blocks innermost-first, LIFO within each scope.
    pub(crate) fn pop_scope(&self, index: usize) {
        loop {
            let scope = {
                let mut body = self.body.lock();
                if body.scopes.len() <= index {
                    return;
                }
                body.scopes.pop()
            };
            let Some(scope) = scope else { return };
            run_defers(self.pid, scope);
        }
    }

    /// Registers a deferred block in the innermost open scope.
    pub(crate) fn defer(&self, f: DeferFn) {
        let mut body = self.body.lock();
        match body.scopes.last_mut() {
            Some(scope) => scope.push(f),
            // The root scope is never popped while the process lives.
            None => body.scopes.push(vec![f]),
        }
    }

    /// Drains every remaining scope, innermost first. Used at retirement,
    /// on both the normal and the unwind path.
    pub(crate) fn run_remaining_defers(&self) {
        loop {
            let scope = self.body.lock().scopes.pop();
            let Some(scope) = scope else { break };
            run_defers(self.pid, scope);
        }
    }

    /// Replaces the panic handler.
    pub(crate) fn set_panic_handler(&self, handler: PanicHandler) {
        self.body.lock().panic_handler = Some(handler);
    }

    pub(crate) fn take_panic_handler(&self) -> Option<PanicHandler> {
        self.body.lock().panic_handler.take()
    }

    pub(crate) fn exit_reason(&self) -> Option<ExitReason> {
        self.body.lock().exit_reason.clone()
    }

    /// Re-enqueues this process if it is parked.
    ///
    /// At most one enqueue ever results from any number of concurrent wakes:
    /// the `IDLE -> SCHEDULED` transition is a CAS, and wakes landing during
    /// a poll latch the `NOTIFIED` bit instead.
    pub(crate) fn wake(self: &Arc<Self>) {
        loop {
            let state = self.sched.load(Ordering::Acquire);
            match state {
                sched::IDLE => {
                    if self
                        .sched
                        .compare_exchange(
                            sched::IDLE,
                            sched::SCHEDULED,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        self.shared.scheduler.enqueue(self.clone());
                        return;
                    }
                }
                sched::RUNNING => {
                    if self
                        .sched
                        .compare_exchange(
                            sched::RUNNING,
                            sched::NOTIFIED,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        return;
                    }
                }
                // Already queued, already notified, or gone.
                _ => return,
            }
        }
    }
}

/// Runs one scope's defers in reverse registration order. A defer that
/// panics is reported and must not prevent the remaining cleanup.
fn run_defers(pid: Pid, mut scope: Vec<DeferFn>) {
    while let Some(f) = scope.pop() {
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).is_err() {
            tracing::error!(pid = %pid, "deferred block panicked during cleanup");
        }
    }
}

impl Wake for Process {
    fn wake(self: Arc<Self>) {
        Process::wake(&self);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        Process::wake(self);
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("status", &self.status())
            .finish()
    }
}

/// A handle to a running process.
///
/// Clonable and shareable. The only mutation it permits is a mailbox push;
/// everything else is read-only observation. This is what enforces process
/// isolation at the type level.
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<Process>,
}

impl ProcessHandle {
    pub(crate) fn new(inner: Arc<Process>) -> Self {
        Self { inner }
    }

    /// Returns the process identifier.
    pub fn pid(&self) -> Pid {
        self.inner.pid
    }

    /// Sends a raw message (bytes) to the process.
    pub fn send_raw(&self, data: Vec<u8>) -> Result<(), SendError> {
        if !self.inner.is_alive() {
            return Err(SendError::ProcessTerminated(self.inner.pid));
        }
        self.inner.mailbox.push(Envelope::new(data));
        Ok(())
    }

    /// Sends a typed message to the process.
    pub fn send<M: Term>(&self, msg: &M) -> Result<(), SendError> {
        self.send_raw(msg.encode())
    }

    /// Returns `true` if the process has not terminated.
    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    /// Returns the process's current lifecycle state.
    pub fn status(&self) -> ProcessStatus {
        self.inner.status()
    }

    /// Returns the exit reason if the process has terminated.
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.inner.exit_reason()
    }

    /// Number of messages waiting in the mailbox.
    pub fn mailbox_len(&self) -> usize {
        self.inner.mailbox.len()
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.inner.pid)
            .field("alive", &self.is_alive())
            .finish()
    }
}
