//! Process creation in new namespaces
//!
//! This module uses `unsafe` for clone(2), which is inherently unsafe
//! but necessary to place the child into new namespaces at creation time.

#![allow(unsafe_code)]

use nix::errno::Errno;
use nix::sched::clone;
use nix::sys::signal::Signal;
use nix::unistd::execvp;
use nsreap_core::{CommandSpec, Error, ProcessEvent, ProcessId, ProcessRecord, Result};
use std::ffi::CString;
use tracing::{debug, info};

use crate::config::NamespaceConfig;
use crate::handle::ProcfsNamespaces;

/// Exit status of a child whose program could not be executed
pub const EXEC_FAILURE_STATUS: isize = 127;

/// Dedicated stack region for one cloned child
#[derive(Debug)]
pub struct ChildStack {
    region: Box<[u8]>,
}

impl ChildStack {
    /// Default stack size (1 MiB)
    pub const DEFAULT_SIZE: usize = 1024 * 1024;

    /// Allocate a stack of `size` bytes
    ///
    /// # Errors
    /// Returns error if `size` is zero
    pub fn with_size(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidConfig {
                message: "Child stack size must be positive".to_string(),
            });
        }

        Ok(Self {
            region: vec![0u8; size].into_boxed_slice(),
        })
    }

    /// Stack size in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.region.len()
    }
}

impl Default for ChildStack {
    fn default() -> Self {
        Self {
            region: vec![0u8; Self::DEFAULT_SIZE].into_boxed_slice(),
        }
    }
}

/// Creates one process inside the configured namespaces and execs a command in it
///
/// A launcher owns exactly one stack, so it can launch exactly once.
#[derive(Debug)]
pub struct Launcher {
    config: NamespaceConfig,
    stack: Option<ChildStack>,
}

impl Launcher {
    /// Create a launcher with a default-sized stack
    #[must_use]
    pub fn new(config: NamespaceConfig) -> Self {
        Self::with_stack(config, ChildStack::default())
    }

    /// Create a launcher with an explicit stack
    #[must_use]
    pub const fn with_stack(config: NamespaceConfig, stack: ChildStack) -> Self {
        Self {
            config,
            stack: Some(stack),
        }
    }

    /// Get the configuration
    #[must_use]
    pub const fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    /// Check if the launcher has already been used
    #[must_use]
    pub const fn is_spent(&self) -> bool {
        self.stack.is_none()
    }

    /// Clone a child into new namespaces and exec `command` in it
    ///
    /// Returns as soon as the child exists; the exec happens asynchronously.
    /// If the exec fails the child exits with [`EXEC_FAILURE_STATUS`].
    ///
    /// # Errors
    /// Returns error if the launcher was already used or clone(2) fails
    pub fn launch(&mut self, command: &CommandSpec) -> Result<ProcessRecord> {
        let Some(mut stack) = self.stack.take() else {
            return Err(Error::InvalidConfig {
                message: "Launcher already used; its stack supports a single launch".to_string(),
            });
        };

        // Everything the child touches is prepared here: after clone it only
        // calls execvp and write.
        let argv = command.to_c_args()?;
        let failure_prefix = format!("nsreap: failed to execute {}: ", command.program());
        let flags = self.config.to_clone_flags();

        debug!(
            namespaces = %self.config,
            stack_size = stack.size(),
            "Cloning child"
        );

        let child_fn = Box::new(|| exec_command(&argv, failure_prefix.as_bytes()));

        let child = unsafe {
            clone(
                child_fn,
                &mut stack.region[..],
                flags,
                Some(Signal::SIGCHLD as i32),
            )
        }
        .map_err(|e| {
            tracing::error!(
                error = %e,
                namespaces = %self.config,
                "Failed to create child"
            );
            clone_error(e, &self.config)
        })?;

        // The child runs on its own copy of the address space, so our copy of
        // the stack is no longer needed.
        drop(stack);

        let pid = ProcessId::from(child);
        ProcessEvent::spawned(pid, "launcher").emit_trace();
        debug!("PID of child created by clone() is {pid}");
        log_child_namespaces(pid, &self.config);

        info!(pid = %pid, command = %command, "Launched isolated process");

        Ok(ProcessRecord::direct(pid))
    }
}

fn clone_error(e: Errno, config: &NamespaceConfig) -> Error {
    match e {
        Errno::EPERM => Error::PermissionDenied {
            operation: format!("clone with namespaces [{config}]"),
        },
        Errno::EINVAL => Error::Namespace {
            message: format!("Namespaces [{config}] are not supported here: {e}"),
        },
        e => Error::Namespace {
            message: format!("clone failed: {e}"),
        },
    }
}

fn log_child_namespaces(pid: ProcessId, config: &NamespaceConfig) {
    let procfs = ProcfsNamespaces::new();
    for kind in config.enabled_namespaces() {
        match procfs.namespace_id(pid, kind) {
            Ok(id) => debug!(pid = %pid, namespace = %id, "Child namespace"),
            Err(e) => debug!(pid = %pid, kind = %kind, error = %e, "Child namespace unreadable"),
        }
    }
}

/// Body of the cloned child: replace the image or report and fail
fn exec_command(argv: &[CString], failure_prefix: &[u8]) -> isize {
    let Err(e) = execvp(&argv[0], argv);

    let stderr = std::io::stderr();
    let _ = nix::unistd::write(&stderr, failure_prefix);
    let _ = nix::unistd::write(&stderr, e.desc().as_bytes());
    let _ = nix::unistd::write(&stderr, b"\n");

    EXEC_FAILURE_STATUS
}
