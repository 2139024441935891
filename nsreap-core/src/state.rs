//! Child state changes as reported by the process-state provider

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ProcessId;

/// Offset added to a signal number to form a shell-style exit code
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// State a descendant changed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChildState {
    /// Terminated normally
    Exited {
        /// Exit status passed to `exit(2)`
        code: i32,
    },
    /// Terminated by a signal
    Signaled {
        /// Signal number
        signal: i32,
        /// Whether a core dump was produced
        core_dumped: bool,
    },
    /// Stopped by a signal (still alive)
    Stopped {
        /// Signal number
        signal: i32,
    },
    /// Resumed after a stop (still alive)
    Continued,
}

impl ChildState {
    /// Translate a `waitpid(2)` result into a state change
    ///
    /// Returns `None` for `StillAlive`, which carries no process.
    #[must_use]
    pub fn from_wait_status(status: WaitStatus) -> Option<StateChange> {
        let (pid, state) = match status {
            WaitStatus::Exited(pid, code) => (pid, Self::Exited { code }),
            WaitStatus::Signaled(pid, signal, core_dumped) => (
                pid,
                Self::Signaled {
                    signal: signal as i32,
                    core_dumped,
                },
            ),
            WaitStatus::Stopped(pid, signal) | WaitStatus::PtraceEvent(pid, signal, _) => (
                pid,
                Self::Stopped {
                    signal: signal as i32,
                },
            ),
            WaitStatus::PtraceSyscall(pid) => (
                pid,
                Self::Stopped {
                    signal: Signal::SIGTRAP as i32,
                },
            ),
            WaitStatus::Continued(pid) => (pid, Self::Continued),
            WaitStatus::StillAlive => return None,
        };

        Some(StateChange {
            pid: pid.into(),
            state,
        })
    }

    /// Whether the process is gone (its record ends here)
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited { .. } | Self::Signaled { .. })
    }

    /// Whether the process exited with status 0
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }

    /// Shell-style exit code: the exit status, or 128 + signal number
    ///
    /// Returns `None` for states that do not end the process.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exited { code } => Some(*code),
            Self::Signaled { signal, .. } => Some(SIGNAL_EXIT_BASE + *signal),
            Self::Stopped { .. } | Self::Continued => None,
        }
    }
}

fn signal_name(signal: i32) -> String {
    Signal::try_from(signal).map_or_else(|_| format!("signal {signal}"), |s| s.as_str().to_string())
}

impl fmt::Display for ChildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code } => write!(f, "exited with code {code}"),
            Self::Signaled {
                signal,
                core_dumped,
            } => {
                write!(f, "killed by {}", signal_name(*signal))?;
                if *core_dumped {
                    write!(f, " (core dumped)")?;
                }
                Ok(())
            }
            Self::Stopped { signal } => write!(f, "stopped by {}", signal_name(*signal)),
            Self::Continued => write!(f, "continued"),
        }
    }
}

/// One collected state change of one descendant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    /// Process that changed state
    pub pid: ProcessId,
    /// New state
    pub state: ChildState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Pid;

    #[test]
    fn test_from_wait_status() {
        let change = ChildState::from_wait_status(WaitStatus::Exited(Pid::from_raw(10), 3)).unwrap();
        assert_eq!(change.pid.as_raw(), 10);
        assert_eq!(change.state, ChildState::Exited { code: 3 });

        assert!(ChildState::from_wait_status(WaitStatus::StillAlive).is_none());

        let change =
            ChildState::from_wait_status(WaitStatus::Continued(Pid::from_raw(11))).unwrap();
        assert!(!change.state.is_terminal());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ChildState::Exited { code: 0 }.exit_code(), Some(0));
        assert_eq!(
            ChildState::Signaled {
                signal: Signal::SIGKILL as i32,
                core_dumped: false
            }
            .exit_code(),
            Some(137)
        );
        assert_eq!(ChildState::Stopped { signal: 19 }.exit_code(), None);
        assert!(ChildState::Exited { code: 0 }.is_success());
        assert!(!ChildState::Exited { code: 127 }.is_success());
    }

    #[test]
    fn test_display() {
        let state = ChildState::Signaled {
            signal: Signal::SIGTERM as i32,
            core_dumped: false,
        };
        assert_eq!(state.to_string(), "killed by SIGTERM");
        assert_eq!(ChildState::Continued.to_string(), "continued");
    }
}
