//! Core type definitions with strong typing and validation

use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::fmt;

use crate::{Error, Result};

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ProcessId(i32);

impl ProcessId {
    /// Create from raw PID
    #[must_use]
    pub const fn from_raw(pid: i32) -> Self {
        Self(pid)
    }

    /// Get the current process ID
    #[must_use]
    pub fn current() -> Self {
        nix::unistd::getpid().into()
    }

    /// Convert to `nix::unistd::Pid`
    #[must_use]
    pub const fn as_nix_pid(self) -> nix::unistd::Pid {
        nix::unistd::Pid::from_raw(self.0)
    }

    /// Get raw PID value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<nix::unistd::Pid> for ProcessId {
    fn from(pid: nix::unistd::Pid) -> Self {
        Self(pid.as_raw())
    }
}

impl From<ProcessId> for nix::unistd::Pid {
    fn from(pid: ProcessId) -> Self {
        Self::from_raw(pid.0)
    }
}

/// Program path plus arguments to execute in the isolated process
///
/// The first element is either a path or a name resolved through `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CommandSpec {
    argv: Vec<String>,
}

impl CommandSpec {
    /// Create a command from an argument vector
    ///
    /// # Errors
    /// Returns error if `argv` is empty or an argument contains a NUL byte
    pub fn new<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();

        if argv.is_empty() {
            return Err(Error::InvalidConfig {
                message: "Command cannot be empty".to_string(),
            });
        }

        if let Some(bad) = argv.iter().find(|arg| arg.contains('\0')) {
            return Err(Error::InvalidConfig {
                message: format!("Command argument contains a NUL byte: {bad:?}"),
            });
        }

        Ok(Self { argv })
    }

    /// Program to execute (first element)
    #[must_use]
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// Arguments after the program
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    /// Full argument vector, program included
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Convert the argument vector for `execvp(3)`
    ///
    /// # Errors
    /// Returns error if an argument cannot be represented as a C string
    pub fn to_c_args(&self) -> Result<Vec<CString>> {
        self.argv
            .iter()
            .map(|arg| {
                CString::new(arg.as_bytes()).map_err(|e| Error::InvalidConfig {
                    message: format!("Invalid argument: {e}"),
                })
            })
            .collect()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

impl TryFrom<Vec<String>> for CommandSpec {
    type Error = Error;

    fn try_from(argv: Vec<String>) -> Result<Self> {
        Self::new(argv)
    }
}

impl From<CommandSpec> for Vec<String> {
    fn from(command: CommandSpec) -> Self {
        command.argv
    }
}

/// How a process came to be our child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lineage {
    /// Created by this process (clone or fork)
    Direct,
    /// Reparented to this process after its own parent exited
    Adopted,
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Adopted => write!(f, "adopted"),
        }
    }
}

/// A spawned process and its relationship to us
///
/// The record stays live until its exit status has been collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pid: ProcessId,
    lineage: Lineage,
}

impl ProcessRecord {
    /// Record a child this process created itself
    #[must_use]
    pub const fn direct(pid: ProcessId) -> Self {
        Self {
            pid,
            lineage: Lineage::Direct,
        }
    }

    /// Process identifier
    #[must_use]
    pub const fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Relationship to the collecting process
    #[must_use]
    pub const fn lineage(&self) -> Lineage {
        self.lineage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_id() {
        let pid = ProcessId::from_raw(123);
        assert_eq!(pid.as_raw(), 123);

        let nix_pid = pid.as_nix_pid();
        assert_eq!(nix_pid.as_raw(), 123);
    }

    #[test]
    fn test_current_process_id() {
        assert_eq!(
            ProcessId::current().as_raw(),
            i32::try_from(std::process::id()).unwrap()
        );
    }

    #[test]
    fn test_command_spec_validation() {
        assert!(CommandSpec::new(Vec::<String>::new()).is_err());
        assert!(CommandSpec::new(["echo", "a\0b"]).is_err());

        let cmd = CommandSpec::new(["echo", "hello", "world"]).unwrap();
        assert_eq!(cmd.program(), "echo");
        assert_eq!(cmd.args(), ["hello", "world"]);
        assert_eq!(cmd.to_string(), "echo hello world");
    }

    #[test]
    fn test_command_spec_c_args() {
        let cmd = CommandSpec::new(["sleep", "0"]).unwrap();
        let c_args = cmd.to_c_args().unwrap();

        assert_eq!(c_args.len(), 2);
        assert_eq!(c_args[0].to_str().unwrap(), "sleep");
    }

    #[test]
    fn test_command_spec_serde_rejects_empty() {
        let result: std::result::Result<CommandSpec, _> = serde_json::from_str("[]");
        assert!(result.is_err());
    }

    #[test]
    fn test_process_record() {
        let record = ProcessRecord::direct(ProcessId::from_raw(7));
        assert_eq!(record.lineage(), Lineage::Direct);
        assert_eq!(record.pid().as_raw(), 7);
    }
}
