//! Process-state provider trait for pluggable implementations

use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, waitpid};
use nsreap_core::{ChildState, Error, ProcessId, Result, StateChange};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Outcome of one non-blocking collection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// A descendant changed state
    Changed(StateChange),
    /// Children exist but none has a pending change
    Pending,
    /// No children exist at all (ECHILD)
    Exhausted,
}

/// Trait for sources of descendant state changes
///
/// This allows for different implementations:
/// - [`SystemWaiter`] - `waitpid(2)` on any child
/// - [`MockProvider`] - Scripted changes for testing
///
/// # Thread Safety
/// All implementations must be `Send + Sync` for use across async tasks.
pub trait ProcessStateProvider: Send + Sync {
    /// Collect one pending state change without blocking
    ///
    /// # Errors
    /// Returns error if the query fails for a reason other than "no children"
    fn try_collect(&self) -> Result<Collection>;
}

/// Collects from the kernel with `waitpid(-1, WNOHANG | WUNTRACED | WCONTINUED)`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWaiter;

impl SystemWaiter {
    /// Create a new waiter
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ProcessStateProvider for SystemWaiter {
    fn try_collect(&self) -> Result<Collection> {
        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;

        loop {
            match waitpid(None, Some(flags)) {
                Ok(status) => {
                    return Ok(ChildState::from_wait_status(status)
                        .map_or(Collection::Pending, Collection::Changed));
                }
                Err(Errno::ECHILD) => return Ok(Collection::Exhausted),
                Err(Errno::EINTR) => {}
                Err(e) => return Err(Error::System(e)),
            }
        }
    }
}

/// Mock provider for testing (doesn't touch the process table)
///
/// Replays a script of collection results, then reports [`Collection::Exhausted`].
///
/// # Example
/// ```
/// use nsreap_core::{ChildState, ProcessId};
/// use nsreap_reaper::{Collection, MockProvider, ProcessStateProvider};
///
/// let provider = MockProvider::new();
/// provider.push_exit(ProcessId::from_raw(10), 0);
///
/// assert!(matches!(provider.try_collect().unwrap(), Collection::Changed(_)));
/// assert_eq!(provider.try_collect().unwrap(), Collection::Exhausted);
/// ```
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    script: VecDeque<Result<Collection>>,
    call_count: usize,
}

impl MockProvider {
    /// Create a new mock provider with an empty script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: Result<Collection>) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .script
            .push_back(entry);
    }

    /// Script a state change
    pub fn push_change(&self, pid: ProcessId, state: ChildState) {
        self.push(Ok(Collection::Changed(StateChange { pid, state })));
    }

    /// Script a normal exit
    pub fn push_exit(&self, pid: ProcessId, code: i32) {
        self.push_change(pid, ChildState::Exited { code });
    }

    /// Script "children exist, nothing pending"
    pub fn push_pending(&self) {
        self.push(Ok(Collection::Pending));
    }

    /// Script an unexpected query failure
    pub fn push_error(&self, errno: Errno) {
        self.push(Err(Error::System(errno)));
    }

    /// Number of collection attempts made (for testing)
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .call_count
    }

    /// Number of scripted results not yet consumed (for testing)
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .script
            .len()
    }
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider").finish_non_exhaustive()
    }
}

impl ProcessStateProvider for MockProvider {
    fn try_collect(&self) -> Result<Collection> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.call_count += 1;

        let next = state.script.pop_front().unwrap_or(Ok(Collection::Exhausted));
        tracing::trace!(result = ?next, "Mock: collect");
        next
    }
}
