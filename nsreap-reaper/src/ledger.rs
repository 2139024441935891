//! Bookkeeping of exit statuses owed to explicit waits
//!
//! The reaper is the only caller of the collection primitive. Statuses of
//! processes someone intends to wait for are parked here until claimed,
//! which makes a second claim an error instead of a racing `waitpid`.

use nsreap_core::{ChildState, Error, Lineage, ProcessId, ProcessRecord, Result, StateChange};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Exit statuses collected by the reaper, keyed by PID
#[derive(Debug, Default)]
pub struct ExitLedger {
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Registered and still running
    owed: HashSet<ProcessId>,
    /// Registered, terminated, not yet claimed
    terminated: HashMap<ProcessId, ChildState>,
    /// Status already handed out
    claimed: HashSet<ProcessId>,
    adopted_reaped: usize,
}

impl ExitLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a process and register it as owed, atomically
    ///
    /// The ledger stays locked while `spawn` runs, so a status collected
    /// right after creation is still attributed to the new record.
    ///
    /// # Errors
    /// Returns the error of `spawn`
    pub fn track<F>(&self, spawn: F) -> Result<ProcessRecord>
    where
        F: FnOnce() -> Result<ProcessRecord>,
    {
        let mut state = self.lock();
        let record = spawn()?;
        let pid = record.pid();

        // A reused PID must not inherit an older process's bookkeeping.
        state.terminated.remove(&pid);
        state.claimed.remove(&pid);
        state.owed.insert(pid);

        tracing::debug!(pid = %pid, "Registered owed status");
        Ok(record)
    }

    /// Record a collected state change and classify the process
    ///
    /// Stopped and continued states never end a record.
    pub fn record(&self, change: StateChange) -> Lineage {
        let mut state = self.lock();
        let pid = change.pid;

        if !state.owed.contains(&pid) {
            if change.state.is_terminal() {
                state.adopted_reaped += 1;
            }
            return Lineage::Adopted;
        }

        if change.state.is_terminal() {
            state.owed.remove(&pid);
            state.terminated.insert(pid, change.state);
        }
        Lineage::Direct
    }

    /// Claim the terminal status of an owed process
    ///
    /// Returns `Ok(None)` while the process has not terminated yet.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyCollected`] on a second claim and
    /// [`Error::NotOwed`] for a process that was never registered
    pub fn take(&self, pid: ProcessId) -> Result<Option<ChildState>> {
        let mut state = self.lock();

        if let Some(child_state) = state.terminated.remove(&pid) {
            state.claimed.insert(pid);
            return Ok(Some(child_state));
        }
        if state.claimed.contains(&pid) {
            return Err(Error::AlreadyCollected { pid });
        }
        if state.owed.contains(&pid) {
            return Ok(None);
        }
        Err(Error::NotOwed { pid })
    }

    /// Registered processes whose status has not been collected yet
    #[must_use]
    pub fn outstanding(&self) -> Vec<ProcessId> {
        let mut pids: Vec<ProcessId> = self.lock().owed.iter().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Number of adopted descendants reaped so far
    #[must_use]
    pub fn adopted_reaped(&self) -> usize {
        self.lock().adopted_reaped
    }
}
