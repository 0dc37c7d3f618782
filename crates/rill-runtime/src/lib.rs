//! # rill-runtime
//!
//! The process and scheduler core of the Rill runtime.
//!
//! A [`Runtime`] multiplexes lightweight processes over a fixed pool of OS
//! worker threads. Each process has a unique pid, a private mailbox, and is
//! fully isolated from every other process: the only way state crosses a
//! process boundary is an encoded message.
//!
//! The process-facing operations ([`spawn`], [`send`], [`receive`],
//! [`suspend`], [`blocking`], [`pinned`], [`defer`], [`panicking`],
//! [`terminate`], [`panic`]) are free functions that act on the process
//! currently running on the calling worker thread.
//!
//! # Example
//!
//! ```
//! use rill_runtime::Runtime;
//!
//! let runtime = Runtime::new().unwrap();
//! runtime
//!     .run(|| async {
//!         let parent = rill_runtime::current();
//!         rill_runtime::spawn(move || async move {
//!             rill_runtime::send(parent, &"hello".to_string());
//!         });
//!         let bytes = rill_runtime::receive(None).await.unwrap();
//!         let greeting: String = rill_core::Term::decode(&bytes).unwrap();
//!         assert_eq!(greeting, "hello");
//!     })
//!     .unwrap();
//! ```

#![deny(warnings)]
#![deny(missing_docs)]

mod api;
mod blocking;
mod current;
mod error;
mod mailbox;
mod process;
mod runtime;
mod scheduler;
mod table;

pub use api::{
    blocking, current, defer, panic, panicking, pinned, receive, scoped, send, send_raw, spawn,
    suspend, terminate, try_current,
};
pub use error::{RuntimeError, SendError};
pub use mailbox::{Envelope, Receive};
pub use process::{ProcessHandle, ProcessStatus};
pub use runtime::{Config, Runtime, RuntimeHandle};

pub use rill_core::{ExitReason, Pid, Term};

