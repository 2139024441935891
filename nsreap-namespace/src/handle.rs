//! Namespace handles and the provider that resolves and joins them

use nix::errno::Errno;
use nix::sched::setns;
use nsreap_core::{Error, ProcessId, Result};
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};

use crate::config::NamespaceKind;

/// An open reference to one namespace of one process
///
/// Dropping the handle closes the descriptor.
#[derive(Debug)]
pub struct NamespaceHandle {
    file: File,
    kind: NamespaceKind,
    owner: ProcessId,
    identity: String,
}

impl NamespaceHandle {
    pub(crate) const fn new(
        file: File,
        kind: NamespaceKind,
        owner: ProcessId,
        identity: String,
    ) -> Self {
        Self {
            file,
            kind,
            owner,
            identity,
        }
    }

    /// Namespace type
    #[must_use]
    pub const fn kind(&self) -> NamespaceKind {
        self.kind
    }

    /// Process the handle was resolved from
    #[must_use]
    pub const fn owner(&self) -> ProcessId {
        self.owner
    }

    /// Kernel identity such as `pid:[4026532451]`
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl AsFd for NamespaceHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

/// Resolves "namespace X of process P" to a joinable handle and joins it
pub trait NamespaceProvider {
    /// Open a handle to a namespace of a process
    ///
    /// # Errors
    /// Returns error if the process does not exist or its namespace cannot be opened
    fn open(&self, pid: ProcessId, kind: NamespaceKind) -> Result<NamespaceHandle>;

    /// Join the namespace behind `handle`
    ///
    /// The handle is consumed and closed before this returns.
    ///
    /// # Errors
    /// Returns error if setns(2) fails
    fn join(&self, handle: NamespaceHandle) -> Result<()>;
}

/// Namespace provider backed by `/proc/<pid>/ns`
#[derive(Debug, Clone)]
pub struct ProcfsNamespaces {
    proc_root: PathBuf,
}

impl Default for ProcfsNamespaces {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcfsNamespaces {
    /// Provider using the system `/proc`
    #[must_use]
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    /// Provider using a procfs mounted elsewhere
    #[must_use]
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    /// Path of a namespace entry
    #[must_use]
    pub fn ns_path(&self, pid: ProcessId, kind: NamespaceKind) -> PathBuf {
        self.proc_root
            .join(pid.to_string())
            .join("ns")
            .join(kind.proc_name())
    }

    /// Read the kernel identity of a process's namespace
    ///
    /// # Errors
    /// Returns error if the namespace link cannot be read
    pub fn namespace_id(&self, pid: ProcessId, kind: NamespaceKind) -> Result<String> {
        let path = self.ns_path(pid, kind);
        read_identity(&path).map_err(|e| open_error(pid, kind, &e))
    }
}

fn read_identity(path: &Path) -> io::Result<String> {
    std::fs::read_link(path).map(|p| p.to_string_lossy().into_owned())
}

fn open_error(pid: ProcessId, kind: NamespaceKind, err: &io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::PermissionDenied => Error::PermissionDenied {
            operation: format!("open {kind} namespace of process {pid}"),
        },
        io::ErrorKind::NotFound => Error::Namespace {
            message: format!("Process {pid} has no {kind} namespace (is it running?)"),
        },
        _ => Error::Namespace {
            message: format!("Failed to open {kind} namespace of process {pid}: {err}"),
        },
    }
}

impl NamespaceProvider for ProcfsNamespaces {
    fn open(&self, pid: ProcessId, kind: NamespaceKind) -> Result<NamespaceHandle> {
        let path = self.ns_path(pid, kind);

        let file = File::open(&path).map_err(|e| open_error(pid, kind, &e))?;
        // The link of an open entry stays readable while the namespace lives.
        let identity = read_identity(&path).unwrap_or_else(|_| format!("{kind}:[?]"));

        tracing::debug!(
            pid = %pid,
            namespace = %identity,
            path = %path.display(),
            "Opened namespace handle"
        );

        Ok(NamespaceHandle::new(file, kind, pid, identity))
    }

    fn join(&self, handle: NamespaceHandle) -> Result<()> {
        let kind = handle.kind();

        setns(&handle, kind.clone_flag()).map_err(|e| {
            tracing::error!(
                namespace = %handle.identity(),
                error = %e,
                "Failed to join namespace"
            );
            match e {
                Errno::EPERM => Error::PermissionDenied {
                    operation: format!("setns into {}", handle.identity()),
                },
                e => Error::Namespace {
                    message: format!("Failed to join {}: {e}", handle.identity()),
                },
            }
        })?;

        tracing::debug!(
            namespace = %handle.identity(),
            owner = %handle.owner(),
            "Joined namespace, releasing handle"
        );
        drop(handle);

        Ok(())
    }
}
