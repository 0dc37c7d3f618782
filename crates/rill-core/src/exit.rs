//! Process exit reasons.
//!
//! An [`ExitReason`] describes why a process stopped running. It is recorded
//! in the process handle at termination and reported by [`Runtime::run`] for
//! the root process.
//!
//! [`Runtime::run`]: https://docs.rs/rill-runtime

use serde::{Deserialize, Serialize};
use std::fmt;

/// The reason a process exited.
///
/// # Normal vs panic exits
///
/// - [`ExitReason::Normal`] and [`ExitReason::Terminated`] are orderly:
///   deferred blocks run, no panic handler is invoked, nothing is reported.
/// - [`ExitReason::Panic`] is an unrecoverable fault: deferred blocks run,
///   then the process's panic handler (if registered) receives the message.
///
/// # Examples
///
/// ```
/// use rill_core::ExitReason;
///
/// let reason = ExitReason::Normal;
/// assert!(reason.is_normal());
///
/// let reason = ExitReason::Panic("boom".to_string());
/// assert!(reason.is_panic());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExitReason {
    /// The process's instruction stream completed.
    #[default]
    Normal,

    /// The process ended itself with an explicit `terminate()` call.
    ///
    /// Modeled as an unwind cause rather than a bypass: deferred cleanup
    /// still runs, but no handler is invoked and nothing is reported.
    Terminated,

    /// The process panicked with the given message.
    Panic(String),
}

impl ExitReason {
    /// Returns `true` for the orderly exit reasons (`Normal`, `Terminated`).
    pub fn is_normal(&self) -> bool {
        matches!(self, ExitReason::Normal | ExitReason::Terminated)
    }

    /// Returns `true` if the process panicked.
    #[inline]
    pub fn is_panic(&self) -> bool {
        matches!(self, ExitReason::Panic(_))
    }

    /// Creates a panic exit reason from any displayable type.
    pub fn panic(msg: impl fmt::Display) -> Self {
        ExitReason::Panic(msg.to_string())
    }

    /// Returns the panic message, if any.
    pub fn panic_message(&self) -> Option<&str> {
        match self {
            ExitReason::Panic(msg) => Some(msg),
            _ => None,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Normal => write!(f, "normal"),
            ExitReason::Terminated => write!(f, "terminated"),
            ExitReason::Panic(msg) => write!(f, "panic: {}", msg),
        }
    }
}
