//! Process table.
//!
//! A runtime-wide registry mapping [`Pid`]s to live processes. Backed by a
//! sharded concurrent map so that unrelated lookups never serialize against
//! each other; only same-shard mutations contend.

use dashmap::DashMap;
use rill_core::Pid;
use std::sync::Arc;

use crate::process::{Process, ProcessHandle};

/// The runtime-wide process registry.
///
/// Cloning is cheap; all clones observe the same table.
#[derive(Clone)]
pub(crate) struct ProcessTable {
    map: Arc<DashMap<Pid, Arc<Process>>>,
}

impl ProcessTable {
    pub(crate) fn new() -> Self {
        Self {
            map: Arc::new(DashMap::new()),
        }
    }

    /// Registers a process. The pid is freshly allocated by the caller, so
    /// insertion never collides.
    pub(crate) fn insert(&self, process: Arc<Process>) {
        self.map.insert(process.pid(), process);
    }

    /// Looks up a live process. A terminated (or never-registered) pid
    /// misses; a stale id can never alias a newer process because ids are
    /// not reused.
    pub(crate) fn lookup(&self, pid: Pid) -> Option<ProcessHandle> {
        self.lookup_process(pid).map(ProcessHandle::new)
    }

    pub(crate) fn lookup_process(&self, pid: Pid) -> Option<Arc<Process>> {
        let process = self.map.get(&pid)?.clone();
        if process.is_alive() {
            Some(process)
        } else {
            None
        }
    }

    /// Removes a process at the end of its life. Called exactly once, by the
    /// worker driving the exit protocol.
    pub(crate) fn remove(&self, pid: Pid) {
        self.map.remove(&pid);
    }

    /// Number of registered processes.
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }
}
