//! Child-state reaper running as a background task
//!
//! The task is woken by `SIGCHLD` through tokio's signal driver, whose
//! handler only writes to a self-pipe. Collection, bookkeeping and logging
//! all happen in task context. Notifications coalesce, so every wake-up
//! drains until nothing is pending.

use nsreap_core::{ChildState, Error, ProcessEvent, ProcessRecord, Result, StateChange};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Notify, mpsc};

use crate::ledger::ExitLedger;
use crate::provider::{Collection, ProcessStateProvider};

/// Outcome of one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// State changes collected, in collection order
    pub collected: Vec<StateChange>,
    /// The pass ended because no children exist
    pub exhausted: bool,
    /// The pass ended early on an unexpected query error
    pub interrupted: bool,
}

/// Collects state changes of every descendant
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use nsreap_core::ProcessId;
/// use nsreap_reaper::{MockProvider, Reaper};
///
/// let provider = MockProvider::new();
/// provider.push_exit(ProcessId::from_raw(7), 0);
/// provider.push_exit(ProcessId::from_raw(8), 0);
///
/// let reaper = Reaper::new(Arc::new(provider));
/// let report = reaper.drain();
///
/// assert_eq!(report.collected.len(), 2);
/// assert!(report.exhausted);
/// ```
pub struct Reaper {
    provider: Arc<dyn ProcessStateProvider>,
    ledger: ExitLedger,
    wakeups: Notify,
    drain_lock: Mutex<()>,
    event_tx: Option<mpsc::Sender<ProcessEvent>>,
}

impl Reaper {
    /// Create a reaper over a state provider
    #[must_use]
    pub fn new(provider: Arc<dyn ProcessStateProvider>) -> Self {
        Self {
            provider,
            ledger: ExitLedger::new(),
            wakeups: Notify::new(),
            drain_lock: Mutex::new(()),
            event_tx: None,
        }
    }

    /// Add event channel for emitting events
    ///
    /// Events are dropped when the channel is full.
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::Sender<ProcessEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// The ledger of owed statuses
    #[must_use]
    pub const fn ledger(&self) -> &ExitLedger {
        &self.ledger
    }

    /// Spawn a process whose status will be claimed with [`Self::wait_for`]
    ///
    /// # Errors
    /// Returns the error of `spawn`
    pub fn track<F>(&self, spawn: F) -> Result<ProcessRecord>
    where
        F: FnOnce() -> Result<ProcessRecord>,
    {
        self.ledger.track(spawn)
    }

    /// Collect every pending state change without blocking
    pub fn drain(&self) -> DrainReport {
        let _serial = self
            .drain_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut report = DrainReport::default();

        loop {
            match self.provider.try_collect() {
                Ok(Collection::Changed(change)) => {
                    let lineage = self.ledger.record(change);
                    let event = ProcessEvent::from_change(change, lineage);
                    event.emit_trace();

                    if let Some(ref tx) = self.event_tx {
                        let _ = tx.try_send(event);
                    }
                    report.collected.push(change);
                }
                Ok(Collection::Pending) => break,
                Ok(Collection::Exhausted) => {
                    report.exhausted = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        collected = report.collected.len(),
                        "waitpid failed, draining again on next SIGCHLD"
                    );
                    report.interrupted = true;
                    break;
                }
            }
        }

        if !report.collected.is_empty() || report.exhausted {
            self.wakeups.notify_waiters();
        }
        report
    }

    /// Start draining on every `SIGCHLD` in the background
    ///
    /// Must be called from within a tokio runtime, before any child is
    /// created. Dropping or aborting the handle stops the reaper.
    ///
    /// # Errors
    /// Returns error if the signal handler cannot be installed
    pub fn start(self: &Arc<Self>) -> Result<tokio::task::JoinHandle<()>> {
        let mut sigchld = signal(SignalKind::child())?;
        let reaper = Arc::clone(self);

        let handle = tokio::spawn(async move {
            tracing::debug!("Child-state reaper started");

            // Changes that predate the handler
            reaper.drain();

            while sigchld.recv().await.is_some() {
                let report = reaper.drain();
                tracing::trace!(
                    collected = report.collected.len(),
                    exhausted = report.exhausted,
                    "SIGCHLD drain"
                );
            }
        });

        Ok(handle)
    }

    /// Wait until the status owed for `record` has been collected
    ///
    /// Exactly one successful wait exists per record, no matter whether the
    /// background task or this call collected the status.
    ///
    /// # Errors
    /// Returns error if the status was already claimed, the process was
    /// never registered, or it disappeared without a collected status
    pub async fn wait_for(&self, record: &ProcessRecord) -> Result<ChildState> {
        let pid = record.pid();

        loop {
            let notified = self.wakeups.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(state) = self.ledger.take(pid)? {
                return Ok(state);
            }

            let report = self.drain();
            if let Some(state) = self.ledger.take(pid)? {
                return Ok(state);
            }
            if report.exhausted {
                return Err(Error::Process {
                    message: format!("Process {pid} is gone but no status was collected"),
                });
            }

            notified.await;
        }
    }

    /// Wait until no children remain, collecting everything on the way
    ///
    /// Returns how many state changes were collected by this call.
    pub async fn settle(&self) -> usize {
        let mut collected = 0;

        loop {
            let notified = self.wakeups.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let report = self.drain();
            collected += report.collected.len();
            if report.exhausted {
                tracing::debug!(collected, "No children left");
                return collected;
            }

            notified.await;
        }
    }
}

impl std::fmt::Debug for Reaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaper")
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}
