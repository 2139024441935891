//! Re-entry into an existing PID namespace from a separate process tree
//!
//! The bridge forks a process (P1) that joins the target's PID namespace,
//! then walks a fixed sequence of stages. Each forking stage leaves the
//! new process behind as an orphan, so the reparenting that follows can
//! be observed from the last process in the chain.
//!
//! ```text
//! primary ──fork──▶ P1 ─Join─▶ P1 ─Detach─▶ P2 ─Reorphan─▶ P3 ─Report─▶ exit
//!                               │            │
//!                               └─ exits     └─ exits
//! ```

#![allow(unsafe_code)]

use nix::unistd::{ForkResult, fork, getppid};
use nsreap_core::{Error, ProcessEvent, ProcessId, ProcessRecord, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::NamespaceKind;
use crate::handle::{NamespaceProvider, ProcfsNamespaces};

/// Exit status of a bridge process whose stages completed
pub const BRIDGE_SUCCESS: i32 = 0;

/// Exit status of a bridge process whose stage failed
pub const BRIDGE_FAILURE: i32 = 1;

/// Sleeps of the final process in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeTiming {
    /// Pause before reporting, so reparenting has happened
    pub settle: Duration,
    /// Pause after reporting, so an observer can inspect the tree
    pub linger: Duration,
}

impl Default for BridgeTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            linger: Duration::from_secs(1),
        }
    }
}

impl BridgeTiming {
    /// Timing from millisecond values
    #[must_use]
    pub const fn from_millis(settle_ms: u64, linger_ms: u64) -> Self {
        Self {
            settle: Duration::from_millis(settle_ms),
            linger: Duration::from_millis(linger_ms),
        }
    }
}

/// One step of the re-entry protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Join the target's PID namespace and release the handle
    Join,
    /// Fork the first process inside the namespace; the joiner exits
    Detach,
    /// Fork again; the intermediate process exits
    Reorphan,
    /// Report the adopted parent, then finish
    Report,
}

impl Stage {
    /// Stages in execution order
    pub const SEQUENCE: [Self; 4] = [Self::Join, Self::Detach, Self::Reorphan, Self::Report];

    /// Stage name for logs
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Detach => "detach",
            Self::Reorphan => "reorphan",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the current process does after a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Carry on with the next stage
    Continue,
    /// This process's part is done; exit successfully
    Exit,
}

/// Joins a target's PID namespace from a separate process and exercises
/// orphan adoption inside it
#[derive(Debug, Clone)]
pub struct Bridge<P = ProcfsNamespaces> {
    target: ProcessId,
    subreaper: Option<ProcessId>,
    timing: BridgeTiming,
    provider: P,
}

impl Bridge<ProcfsNamespaces> {
    /// Bridge into the PID namespace of `target` through `/proc`
    #[must_use]
    pub fn new(target: ProcessId) -> Self {
        Self::with_provider(target, ProcfsNamespaces::new())
    }
}

impl<P: NamespaceProvider> Bridge<P> {
    /// Bridge using a custom namespace provider
    #[must_use]
    pub fn with_provider(target: ProcessId, provider: P) -> Self {
        Self {
            target,
            subreaper: None,
            timing: BridgeTiming::default(),
            provider,
        }
    }

    /// Set the sleeps of the final process
    #[must_use]
    pub const fn with_timing(mut self, timing: BridgeTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Process registered as subreaper, for the adoption report
    #[must_use]
    pub const fn with_subreaper(mut self, pid: ProcessId) -> Self {
        self.subreaper = Some(pid);
        self
    }

    /// Process whose namespace is joined
    #[must_use]
    pub const fn target(&self) -> ProcessId {
        self.target
    }

    /// Fork the joining process and run the stages in it
    ///
    /// Returns the record of the joining process (a direct child). Stage
    /// failures only show up in the exit statuses of the bridge processes.
    ///
    /// # Errors
    /// Returns error if the joining process cannot be forked
    pub fn spawn(&self) -> Result<ProcessRecord> {
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                let pid = ProcessId::from(child);
                ProcessEvent::spawned(pid, "bridge").emit_trace();
                debug!(pid = %pid, target = %self.target, "Bridge process forked");
                Ok(ProcessRecord::direct(pid))
            }
            Ok(ForkResult::Child) => {
                // Never return into the caller's control flow
                std::process::exit(self.run_stages());
            }
            Err(e) => Err(Error::Process {
                message: format!("Failed to fork bridge process: {e}"),
            }),
        }
    }

    /// Run the stage sequence in the current process
    ///
    /// Returns the exit status the current process should terminate with.
    /// Forking stages make several processes return from this call.
    pub fn run_stages(&self) -> i32 {
        for stage in Stage::SEQUENCE {
            debug!(stage = %stage, pid = %ProcessId::current(), "Bridge stage");

            match self.run_stage(stage) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => return BRIDGE_SUCCESS,
                Err(e) => {
                    error!(
                        stage = %stage,
                        pid = %ProcessId::current(),
                        error = %e,
                        "Bridge stage failed"
                    );
                    return BRIDGE_FAILURE;
                }
            }
        }

        BRIDGE_SUCCESS
    }

    /// Run one stage in the current process
    ///
    /// # Errors
    /// Returns error if the stage's system call fails
    pub fn run_stage(&self, stage: Stage) -> Result<Flow> {
        match stage {
            Stage::Join => self.join(),
            Stage::Detach | Stage::Reorphan => split(stage),
            Stage::Report => Ok(self.report()),
        }
    }

    fn join(&self) -> Result<Flow> {
        let handle = self.provider.open(self.target, NamespaceKind::Pid)?;
        let identity = handle.identity().to_string();

        // Consumed here, so the descriptor is closed before any further fork.
        self.provider.join(handle)?;

        info!(
            target = %self.target,
            namespace = %identity,
            "Joined PID namespace of target"
        );
        Ok(Flow::Continue)
    }

    fn report(&self) -> Flow {
        thread::sleep(self.timing.settle);

        let ns_parent = getppid();
        let status = std::fs::read_to_string("/proc/self/status").unwrap_or_default();
        let host_pid = status_field(&status, "Pid");
        let host_parent = status_field(&status, "PPid");
        let adopted_by_subreaper = host_parent.is_some() && host_parent == self.subreaper;

        info!(
            pid = %ProcessId::current(),
            host_pid = ?host_pid.map(ProcessId::as_raw),
            ns_parent = ns_parent.as_raw(),
            host_parent = ?host_parent.map(ProcessId::as_raw),
            subreaper = ?self.subreaper.map(ProcessId::as_raw),
            adopted_by_subreaper,
            "Orphan reporting its parent"
        );

        thread::sleep(self.timing.linger);
        Flow::Exit
    }
}

/// Fork; the parent's part ends so the child is orphaned
fn split(stage: Stage) -> Result<Flow> {
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            debug!(
                stage = %stage,
                pid = %ProcessId::current(),
                child = %child,
                "Leaving child to be reparented"
            );
            Ok(Flow::Exit)
        }
        Ok(ForkResult::Child) => Ok(Flow::Continue),
        Err(e) => Err(Error::Process {
            message: format!("fork failed during {stage}: {e}"),
        }),
    }
}

/// Parse a PID-valued field of `/proc/<pid>/status`
fn status_field(status: &str, name: &str) -> Option<ProcessId> {
    status.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key != name {
            return None;
        }
        value.trim().parse().ok().map(ProcessId::from_raw)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::NamespaceHandle;
    use std::cell::Cell;
    use std::fs::File;

    /// Provider whose handles point at /dev/null and whose join always fails
    #[derive(Default)]
    struct RefusingProvider {
        opened: Cell<usize>,
        joins: Cell<usize>,
    }

    impl NamespaceProvider for RefusingProvider {
        fn open(&self, pid: ProcessId, kind: NamespaceKind) -> Result<NamespaceHandle> {
            self.opened.set(self.opened.get() + 1);
            let file = File::open("/dev/null")?;
            Ok(NamespaceHandle::new(file, kind, pid, format!("{kind}:[0]")))
        }

        fn join(&self, _handle: NamespaceHandle) -> Result<()> {
            self.joins.set(self.joins.get() + 1);
            Err(Error::PermissionDenied {
                operation: "setns".to_string(),
            })
        }
    }

    #[test]
    fn test_stage_sequence() {
        let names: Vec<&str> = Stage::SEQUENCE.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["join", "detach", "reorphan", "report"]);
    }

    #[test]
    fn test_default_timing() {
        let timing = BridgeTiming::default();
        assert_eq!(timing.settle, Duration::from_secs(1));
        assert_eq!(
            BridgeTiming::from_millis(200, 50).linger,
            Duration::from_millis(50)
        );
    }

    #[test]
    fn test_join_missing_target_fails() {
        let bridge = Bridge::new(ProcessId::from_raw(0x3fff_ffff));

        let result = bridge.run_stage(Stage::Join);
        assert!(matches!(result, Err(Error::Namespace { .. })));
    }

    #[test]
    fn test_join_failure_ends_branch() {
        let bridge = Bridge::with_provider(ProcessId::from_raw(1), RefusingProvider::default());

        assert_eq!(bridge.run_stages(), BRIDGE_FAILURE);
        assert_eq!(bridge.provider.opened.get(), 1);
        assert_eq!(bridge.provider.joins.get(), 1);
    }

    #[test]
    fn test_status_field() {
        let status = "Name:\tsleep\nState:\tS (sleeping)\nTgid:\t812\nPid:\t812\nPPid:\t799\n";

        assert_eq!(status_field(status, "PPid"), Some(ProcessId::from_raw(799)));
        assert_eq!(status_field(status, "Pid"), Some(ProcessId::from_raw(812)));
        assert_eq!(status_field(status, "TracerPid"), None);
    }

    #[test]
    fn test_subreaper_recorded() {
        let bridge = Bridge::new(ProcessId::from_raw(10)).with_subreaper(ProcessId::from_raw(3));

        assert_eq!(bridge.target().as_raw(), 10);
        assert_eq!(bridge.subreaper, Some(ProcessId::from_raw(3)));
    }
}
