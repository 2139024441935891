//! Registration as child subreaper
//!
//! Once registered, orphaned descendants are reparented to this process
//! instead of the init process of their PID namespace. The kernel holds
//! this state; it is set once and never cleared.

use nix::errno::Errno;
use nix::sys::prctl;
use nsreap_core::{Error, ProcessId, Result};
use std::sync::{Mutex, PoisonError};

static ESTABLISHED: Mutex<Option<Subreaper>> = Mutex::new(None);

/// Proof that the current process is registered as child subreaper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subreaper {
    pid: ProcessId,
}

impl Subreaper {
    /// Register the current process as child subreaper
    ///
    /// Repeated calls in the same process return the existing registration.
    /// Fork children do not inherit the kernel flag, so a child calling this
    /// registers itself anew.
    ///
    /// # Errors
    /// Returns error if `prctl(PR_SET_CHILD_SUBREAPER)` fails
    pub fn establish() -> Result<Self> {
        let mut established = ESTABLISHED.lock().unwrap_or_else(PoisonError::into_inner);
        let current = ProcessId::current();

        if let Some(existing) = *established
            && existing.pid == current
        {
            return Ok(existing);
        }

        prctl::set_child_subreaper(true).map_err(|e| {
            tracing::error!(error = %e, "Failed to become child subreaper");
            match e {
                Errno::EPERM => Error::PermissionDenied {
                    operation: "prctl PR_SET_CHILD_SUBREAPER".to_string(),
                },
                e => Error::Process {
                    message: format!("prctl PR_SET_CHILD_SUBREAPER failed: {e}"),
                },
            }
        })?;

        let token = Self { pid: current };
        *established = Some(token);

        tracing::debug!(pid = %current, "Top parent set PR_SET_CHILD_SUBREAPER");
        Ok(token)
    }

    /// Process that registered
    #[must_use]
    pub const fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Ask the kernel whether the current process is a child subreaper
    ///
    /// # Errors
    /// Returns error if `prctl(PR_GET_CHILD_SUBREAPER)` fails
    pub fn is_active() -> Result<bool> {
        Ok(prctl::get_child_subreaper()?)
    }
}
