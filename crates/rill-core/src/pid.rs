//! Process identifier type.
//!
//! A [`Pid`] uniquely identifies a process within a Rill runtime. Identifiers
//! are allocated from a single shared counter and are never handed out twice,
//! so a stale `Pid` kept past its process's death can never alias a newer
//! process: table lookups on it simply miss.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for generating unique process IDs.
static PID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A process identifier.
///
/// Every process in Rill has a unique `Pid` that can be used to send messages
/// to it and to query its status. A `Pid` is a capability for *enqueueing
/// only* - holding one grants no access to the process's mailbox contents,
/// call stack, or any other private state.
///
/// # Examples
///
/// ```
/// use rill_core::Pid;
///
/// let pid = Pid::new();
/// println!("Process: {}", pid); // e.g., "<0.42>"
///
/// let pid2 = Pid::new();
/// assert_ne!(pid, pid2);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pid {
    /// Unique process identifier within the runtime.
    id: u64,
}

impl Pid {
    /// Creates a new unique process identifier.
    ///
    /// Each call to `new()` returns a `Pid` that has never been returned
    /// before in this OS process.
    pub fn new() -> Self {
        Self {
            id: PID_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Creates a `Pid` from a raw id.
    ///
    /// This is primarily used for deserialization and testing. In normal
    /// usage, prefer [`Pid::new()`].
    pub const fn from_raw(id: u64) -> Self {
        Self { id }
    }

    /// Returns the raw process identifier.
    #[inline]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl Default for Pid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid<0.{}>", self.id)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<0.{}>", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_uniqueness() {
        let pid1 = Pid::new();
        let pid2 = Pid::new();
        assert_ne!(pid1, pid2);
    }

    #[test]
    fn test_pid_monotonic() {
        let pid1 = Pid::new();
        let pid2 = Pid::new();
        assert!(pid2.id() > pid1.id());
    }

    #[test]
    fn test_pid_from_raw() {
        let pid = Pid::from_raw(42);
        assert_eq!(pid.id(), 42);
    }

    #[test]
    fn test_pid_display() {
        let pid = Pid::from_raw(7);
        assert_eq!(format!("{}", pid), "<0.7>");
        assert_eq!(format!("{:?}", pid), "Pid<0.7>");
    }

    #[test]
    fn test_pid_serialization() {
        let pid = Pid::from_raw(123);
        let bytes = postcard::to_allocvec(&pid).unwrap();
        let decoded: Pid = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(pid, decoded);
    }

    #[test]
    fn test_pid_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        let pid1 = Pid::new();
        let pid2 = Pid::new();

        set.insert(pid1);
        set.insert(pid2);
        set.insert(pid1); // duplicate

        assert_eq!(set.len(), 2);
    }
}
