//! Error types for runtime operations.

use rill_core::Pid;
use thiserror::Error;

/// Errors that can occur during runtime operations.
///
/// These are infrastructure-level failures. Per-process faults (panics) never
/// surface here; they unwind the faulting process only. The one exception is
/// the root process, whose panic is reported by `Runtime::run` as
/// [`RuntimeError::RootPanic`] so the embedder can exit non-zero.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Failed to spawn a scheduler worker thread.
    ///
    /// No process can meaningfully recover from this; the runtime refuses to
    /// start.
    #[error("failed to spawn scheduler worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// Failed to spawn the timer thread.
    #[error("failed to spawn timer thread: {0}")]
    TimerSpawn(#[source] std::io::Error),

    /// The root process panicked with the given message.
    #[error("root process panicked: {0}")]
    RootPanic(String),
}

/// Errors that can occur when sending messages.
///
/// The process-facing `send` swallows these (sending to a dead process is a
/// silent no-op, since senders may race with termination); they are exposed
/// on [`ProcessHandle`] and [`RuntimeHandle`] for embedders that want to
/// observe delivery.
///
/// [`ProcessHandle`]: crate::ProcessHandle
/// [`RuntimeHandle`]: crate::RuntimeHandle
#[derive(Debug, Error)]
pub enum SendError {
    /// The target process does not exist.
    #[error("process not found: {0}")]
    ProcessNotFound(Pid),

    /// The process has terminated.
    #[error("process terminated: {0}")]
    ProcessTerminated(Pid),
}
