//! Error types for nsreap

use thiserror::Error;

use crate::ProcessId;

/// nsreap error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Namespace operation failed
    #[error("Namespace error: {message}")]
    Namespace {
        /// Error message
        message: String,
    },

    /// Process creation or collection failed
    #[error("Process error: {message}")]
    Process {
        /// Error message
        message: String,
    },

    /// Permission denied
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// The status of this process was already handed out
    #[error("Process {pid} was already collected")]
    AlreadyCollected {
        /// Process whose status was claimed twice
        pid: ProcessId,
    },

    /// Nobody registered an explicit wait for this process
    #[error("Process {pid} is not owed to an explicit wait")]
    NotOwed {
        /// Process that was never registered
        pid: ProcessId,
    },

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),
}

/// Result type alias for nsreap operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::AlreadyCollected {
            pid: ProcessId::from_raw(42),
        };
        assert_eq!(err.to_string(), "Process 42 was already collected");

        let err = Error::PermissionDenied {
            operation: "clone".to_string(),
        };
        assert!(err.to_string().contains("clone"));
    }

    #[test]
    fn test_from_nix() {
        let err: Error = nix::errno::Errno::ECHILD.into();
        assert!(matches!(err, Error::System(nix::errno::Errno::ECHILD)));
    }
}
