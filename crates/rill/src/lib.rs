//! # Rill
//!
//! Rill's concurrency core: lightweight, fully isolated processes
//! multiplexed over a fixed pool of OS worker threads.
//!
//! - **Processes**: cheap units of concurrency, each with a unique pid and a
//!   private mailbox
//! - **Messages**: the only way state crosses a process boundary; delivered
//!   in per-sender order, consumed oldest first
//! - **Scheduling**: cooperative M:N work stealing; blocking calls migrate
//!   to an elastic auxiliary pool so scheduler workers never stall
//! - **Failure**: a panic unwinds one process, runs its deferred cleanup,
//!   invokes its panic handler, and leaves every other process untouched
//!
//! # Quick start
//!
//! ```
//! use rill::prelude::*;
//!
//! let runtime = Runtime::new().unwrap();
//! runtime
//!     .run(|| async {
//!         let parent = rill::current();
//!         rill::spawn(move || async move {
//!             rill::send(parent, &42u64);
//!         });
//!         let bytes = rill::receive(None).await.unwrap();
//!         let n: u64 = Term::decode(&bytes).unwrap();
//!         assert_eq!(n, 42);
//!     })
//!     .unwrap();
//! ```

#![deny(warnings)]
#![deny(missing_docs)]

mod global;

// Global runtime entry points.
pub use global::{alive, handle, init, spawn, try_handle};

// Process-facing operations, usable from inside any process.
pub use rill_runtime::{
    blocking, current, defer, panic, panicking, pinned, receive, scoped, send, send_raw, suspend,
    terminate, try_current,
};

// Core types.
pub use rill_core::{DecodeError, ExitReason, Pid, Term};

// Runtime and process types.
pub use rill_runtime::{
    Config, ProcessHandle, ProcessStatus, Runtime, RuntimeError, RuntimeHandle, SendError,
};

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```ignore
/// use rill::prelude::*;
/// ```
pub mod prelude {
    pub use rill_core::{ExitReason, Pid, Term};
    pub use rill_runtime::{Config, ProcessStatus, Runtime, RuntimeHandle};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _pid: Option<Pid> = None;
        let _reason = ExitReason::Normal;
    }
}
