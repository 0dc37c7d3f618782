//! Global runtime for Rill.
//!
//! Embedders that only ever need one runtime can use this module instead of
//! carrying a [`Runtime`] value around. The process-facing operations do not
//! go through it; they always act on the runtime the calling process belongs
//! to. Only spawning and sending from plain (non-process) threads do.

use crate::{Runtime, RuntimeError, RuntimeHandle};
use rill_core::Pid;
use std::future::Future;
use std::sync::OnceLock;

/// Global runtime instance.
static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Initializes the global runtime.
///
/// Calling this multiple times is safe - only the first successful call has
/// any effect.
///
/// # Errors
///
/// Fails if the runtime's worker or timer threads cannot be spawned.
pub fn init() -> Result<(), RuntimeError> {
    if RUNTIME.get().is_some() {
        return Ok(());
    }
    let runtime = Runtime::new()?;
    // A lost race means another thread initialized first; the extra runtime
    // shuts itself down on drop.
    let _ = RUNTIME.set(runtime);
    Ok(())
}

/// Returns a handle to the global runtime.
///
/// # Panics
///
/// Panics if the global runtime has not been initialized. Call
/// `rill::init()` first.
pub fn handle() -> RuntimeHandle {
    RUNTIME
        .get()
        .expect("Rill runtime not initialized. Call rill::init() first.")
        .handle()
}

/// Returns a handle to the global runtime, or `None` if not initialized.
pub fn try_handle() -> Option<RuntimeHandle> {
    RUNTIME.get().map(|r| r.handle())
}

/// Spawns a new process.
///
/// From inside a process, the child lands in the caller's own runtime. From
/// a plain thread, it lands in the global runtime.
///
/// # Panics
///
/// Panics if called from a plain thread and the global runtime has not been
/// initialized.
pub fn spawn<F, Fut>(f: F) -> Pid
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if rill_runtime::try_current().is_some() {
        rill_runtime::spawn(f)
    } else {
        handle().spawn(f)
    }
}

/// Returns `true` if the process is alive in the global runtime.
///
/// # Panics
///
/// Panics if the global runtime has not been initialized.
pub fn alive(pid: Pid) -> bool {
    handle().alive(pid)
}
