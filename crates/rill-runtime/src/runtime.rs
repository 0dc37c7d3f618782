//! The Rill runtime.
//!
//! A [`Runtime`] is fully self contained: it owns its process table,
//! scheduler pool, blocking pool, and timer, so multiple instances can run
//! isolated in the same OS process. State is exposed only through the narrow
//! process/handle APIs, never as ambient globals.

use crossbeam_deque::Worker as LocalQueue;
use crossbeam_utils::sync::Parker;
use parking_lot::{Condvar, Mutex};
use rill_core::{ExitReason, Pid, Term};
use std::future::Future;
use std::sync::{Arc, Once};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::blocking::BlockingPool;
use crate::error::{RuntimeError, SendError};
use crate::process::{Process, ProcessHandle, ProcessStatus, UnwindCause};
use crate::scheduler::{spawn_workers, SchedulerShared, TimerHandle};
use crate::table::ProcessTable;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of scheduler worker threads. Defaults to the available CPU
    /// parallelism.
    pub workers: usize,
    /// Cap on blocking-pool threads, bounding thread creation when many
    /// processes block simultaneously.
    pub max_blocking_threads: usize,
    /// How long an idle blocking-pool thread lingers before retiring.
    pub blocking_keep_alive: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_blocking_threads: 64,
            blocking_keep_alive: Duration::from_secs(10),
        }
    }
}

struct RootExit {
    slot: Mutex<Option<ExitReason>>,
    cvar: Condvar,
}

/// Everything the workers, wakers, and API surface share.
pub(crate) struct RuntimeShared {
    pub(crate) table: ProcessTable,
    pub(crate) scheduler: SchedulerShared,
    pub(crate) blocking: BlockingPool,
    pub(crate) timer: TimerHandle,
    root_exit: RootExit,
}

impl RuntimeShared {
    pub(crate) fn notify_root_exit(&self, reason: ExitReason) {
        let mut slot = self.root_exit.slot.lock();
        *slot = Some(reason);
        self.root_exit.cvar.notify_all();
    }

    fn wait_root_exit(&self) -> ExitReason {
        let mut slot = self.root_exit.slot.lock();
        loop {
            if let Some(reason) = slot.take() {
                return reason;
            }
            self.root_exit.cvar.wait(&mut slot);
        }
    }
}

/// The runtime: process table, scheduler pool, blocking pool, timer.
///
/// # Example
///
/// ```
/// use rill_runtime::{Config, Runtime};
///
/// let runtime = Runtime::new().unwrap();
/// runtime
///     .run(|| async {
///         let me = rill_runtime::current();
///         println!("root process is {me}");
///     })
///     .unwrap();
/// ```
pub struct Runtime {
    shared: Arc<RuntimeShared>,
    workers: Vec<JoinHandle<()>>,
    timer_thread: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Creates a runtime with the default [`Config`].
    ///
    /// # Errors
    ///
    /// Fails if a worker or timer thread cannot be spawned. That is a
    /// runtime-fatal condition: no process can recover from it, so the
    /// runtime refuses to start.
    pub fn new() -> Result<Self, RuntimeError> {
        Self::with_config(Config::default())
    }

    /// Creates a runtime with an explicit configuration.
    pub fn with_config(config: Config) -> Result<Self, RuntimeError> {
        install_panic_hook();

        let worker_count = config.workers.max(1);
        let locals: Vec<LocalQueue<Arc<Process>>> =
            (0..worker_count).map(|_| LocalQueue::new_fifo()).collect();
        let parkers: Vec<Parker> = (0..worker_count).map(|_| Parker::new()).collect();
        let unparkers = parkers.iter().map(|p| p.unparker().clone()).collect();

        let (timer, timer_thread) = TimerHandle::start()?;

        let shared = Arc::new(RuntimeShared {
            table: ProcessTable::new(),
            scheduler: SchedulerShared::new(&locals, unparkers),
            blocking: BlockingPool::new(config.max_blocking_threads, config.blocking_keep_alive),
            timer,
            root_exit: RootExit {
                slot: Mutex::new(None),
                cvar: Condvar::new(),
            },
        });

        let workers = match spawn_workers(&shared, locals, parkers) {
            Ok(workers) => workers,
            Err(err) => {
                shared.timer.shutdown();
                shared.blocking.shutdown();
                let _ = timer_thread.join();
                return Err(err);
            }
        };

        tracing::debug!(workers = worker_count, "runtime started");

        Ok(Self {
            shared,
            workers,
            timer_thread: Some(timer_thread),
        })
    }

    /// Returns a clonable handle to this runtime.
    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            shared: self.shared.clone(),
        }
    }

    /// Spawns a process. Asynchronous: the child is registered and enqueued
    /// before this returns, but has not necessarily run.
    pub fn spawn<F, Fut>(&self, f: F) -> Pid
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        spawn_on(&self.shared, f, false)
    }

    /// Spawns `f` as the root process and blocks until it exits.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::RootPanic`] if the root process panics, so
    /// the embedder can exit with a non-zero status. Panics in non-root
    /// processes never surface here.
    pub fn run<F, Fut>(&self, f: F) -> Result<(), RuntimeError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        {
            let mut slot = self.shared.root_exit.slot.lock();
            *slot = None;
        }
        spawn_on(&self.shared, f, true);
        match self.shared.wait_root_exit() {
            ExitReason::Panic(message) => Err(RuntimeError::RootPanic(message)),
            _ => Ok(()),
        }
    }

    /// Number of live processes.
    pub fn process_count(&self) -> usize {
        self.shared.table.len()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shared.scheduler.shutdown();
        self.shared.blocking.shutdown();
        self.shared.timer.shutdown();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        if let Some(timer) = self.timer_thread.take() {
            let _ = timer.join();
        }
    }
}

/// A clonable handle to a runtime.
///
/// Lets embedders (and tests) spawn processes and send messages from outside
/// any process context.
#[derive(Clone)]
pub struct RuntimeHandle {
    shared: Arc<RuntimeShared>,
}

impl RuntimeHandle {
    /// Spawns a process. See [`Runtime::spawn`].
    pub fn spawn<F, Fut>(&self, f: F) -> Pid
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        spawn_on(&self.shared, f, false)
    }

    /// Sends raw bytes to a process.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::ProcessNotFound`] for a dead or unknown pid.
    /// (The process-facing `send` swallows this, per the send contract.)
    pub fn send_raw(&self, pid: Pid, data: Vec<u8>) -> Result<(), SendError> {
        match self.shared.table.lookup(pid) {
            Some(handle) => handle.send_raw(data),
            None => Err(SendError::ProcessNotFound(pid)),
        }
    }

    /// Sends a typed message to a process.
    pub fn send<M: Term>(&self, pid: Pid, msg: &M) -> Result<(), SendError> {
        self.send_raw(pid, msg.encode())
    }

    /// Returns `true` if the process is alive.
    pub fn alive(&self, pid: Pid) -> bool {
        self.shared.table.lookup(pid).is_some()
    }

    /// Looks up a live process.
    pub fn lookup(&self, pid: Pid) -> Option<ProcessHandle> {
        self.shared.table.lookup(pid)
    }

    /// Returns the lifecycle state of a live process.
    pub fn status(&self, pid: Pid) -> Option<ProcessStatus> {
        self.shared.table.lookup(pid).map(|h| h.status())
    }

    /// Number of live processes.
    pub fn process_count(&self) -> usize {
        self.shared.table.len()
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("processes", &self.process_count())
            .finish()
    }
}

/// Allocates a pid, registers the process, and enqueues its entry block.
pub(crate) fn spawn_on<F, Fut>(shared: &Arc<RuntimeShared>, f: F, root: bool) -> Pid
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let pid = Pid::new();
    let future = Box::pin(async move { f().await });
    let process = Arc::new(Process::new(pid, shared.clone(), future, root));
    shared.table.insert(process.clone());
    tracing::trace!(pid = %pid, "spawned process");
    shared.scheduler.enqueue(process);
    pid
}

static PANIC_HOOK: Once = Once::new();

/// Keeps the default panic hook quiet about the runtime's own control-flow
/// unwinds (`terminate()`, `panic(msg)`); anything else still reaches the
/// previously installed hook.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if info.payload().is::<UnwindCause>() {
                return;
            }
            previous(info);
        }));
    });
}
