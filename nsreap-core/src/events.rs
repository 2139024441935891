//! Process lifecycle events with structured tracing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::{ChildState, Lineage, ProcessId, StateChange};

/// Events emitted while supervising the process tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessEvent {
    /// Process created by us
    Spawned {
        /// Process ID
        pid: ProcessId,
        /// What created it
        origin: String,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Terminal status collected
    Reaped {
        /// Process ID
        pid: ProcessId,
        /// Direct child or adopted orphan
        lineage: Lineage,
        /// How it ended
        state: ChildState,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Process stopped by a signal
    Suspended {
        /// Process ID
        pid: ProcessId,
        /// Stopping signal
        signal: i32,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Process resumed
    Resumed {
        /// Process ID
        pid: ProcessId,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },
}

impl ProcessEvent {
    /// Event for a freshly created process
    #[must_use]
    pub fn spawned(pid: ProcessId, origin: impl Into<String>) -> Self {
        Self::Spawned {
            pid,
            origin: origin.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Event for a collected state change
    #[must_use]
    pub fn from_change(change: StateChange, lineage: Lineage) -> Self {
        let timestamp = SystemTime::now();
        match change.state {
            ChildState::Stopped { signal } => Self::Suspended {
                pid: change.pid,
                signal,
                timestamp,
            },
            ChildState::Continued => Self::Resumed {
                pid: change.pid,
                timestamp,
            },
            state => Self::Reaped {
                pid: change.pid,
                lineage,
                state,
                timestamp,
            },
        }
    }

    /// Get the process ID from any event
    #[must_use]
    pub const fn pid(&self) -> ProcessId {
        match self {
            Self::Spawned { pid, .. }
            | Self::Reaped { pid, .. }
            | Self::Suspended { pid, .. }
            | Self::Resumed { pid, .. } => *pid,
        }
    }

    /// Get the timestamp from any event
    #[must_use]
    pub const fn timestamp(&self) -> SystemTime {
        match self {
            Self::Spawned { timestamp, .. }
            | Self::Reaped { timestamp, .. }
            | Self::Suspended { timestamp, .. }
            | Self::Resumed { timestamp, .. } => *timestamp,
        }
    }

    /// Check if this event ends a process record
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Reaped { .. })
    }

    /// Emit structured tracing event
    pub fn emit_trace(&self) {
        match self {
            Self::Spawned { pid, origin, .. } => {
                tracing::debug!(pid = %pid, origin = %origin, event = "spawned", "Process spawned");
            }
            Self::Reaped {
                pid,
                lineage,
                state,
                ..
            } => {
                tracing::debug!(
                    pid = %pid,
                    lineage = %lineage,
                    state = %state,
                    event = "reaped",
                    "SIGCHLD: PID {pid} terminated"
                );
            }
            Self::Suspended { pid, signal, .. } => {
                tracing::debug!(pid = %pid, signal, event = "suspended", "Process stopped");
            }
            Self::Resumed { pid, .. } => {
                tracing::debug!(pid = %pid, event = "resumed", "Process continued");
            }
        }
    }
}

impl fmt::Display for ProcessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawned { pid, origin, .. } => write!(f, "Process {pid} spawned by {origin}"),
            Self::Reaped {
                pid,
                lineage,
                state,
                ..
            } => write!(f, "Process {pid} ({lineage}) {state}"),
            Self::Suspended { pid, signal, .. } => {
                write!(f, "Process {pid} stopped by signal {signal}")
            }
            Self::Resumed { pid, .. } => write!(f, "Process {pid} continued"),
        }
    }
}

// Custom SystemTime serialization
mod systemtime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(since_epoch.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}
