//! Namespace configuration

use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A namespace type a new process can be placed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceKind {
    /// System V IPC and POSIX message queues
    Ipc,
    /// Mount table
    Mount,
    /// Network stack
    Network,
    /// Process ID space
    Pid,
    /// Hostname and domain name
    Uts,
    /// User and group ID mappings
    User,
}

impl NamespaceKind {
    /// Every supported kind, in `/proc/<pid>/ns` listing order
    pub const ALL: [Self; 6] = [
        Self::Ipc,
        Self::Mount,
        Self::Network,
        Self::Pid,
        Self::Uts,
        Self::User,
    ];

    /// Entry name under `/proc/<pid>/ns`
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Ipc => "ipc",
            Self::Mount => "mnt",
            Self::Network => "net",
            Self::Pid => "pid",
            Self::Uts => "uts",
            Self::User => "user",
        }
    }

    /// Flag requesting a new namespace of this kind from clone(2)
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Mount => CloneFlags::CLONE_NEWNS,
            Self::Network => CloneFlags::CLONE_NEWNET,
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::User => CloneFlags::CLONE_NEWUSER,
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.proc_name())
    }
}

/// Set of namespaces to create for the launched process
///
/// Computed once from the command line and consumed by the launcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// New IPC namespace
    pub ipc: bool,

    /// New mount namespace
    pub mount: bool,

    /// New network namespace
    pub network: bool,

    /// New PID namespace
    pub pid: bool,

    /// New UTS namespace (hostname)
    pub uts: bool,

    /// New user namespace
    pub user: bool,
}

impl NamespaceConfig {
    /// Create an empty namespace set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every supported namespace
    #[must_use]
    pub fn all() -> Self {
        Self {
            ipc: true,
            mount: true,
            network: true,
            pid: true,
            uts: true,
            user: true,
        }
    }

    /// Enable IPC namespace
    #[must_use]
    pub fn with_ipc(mut self, enable: bool) -> Self {
        self.ipc = enable;
        self
    }

    /// Enable mount namespace
    #[must_use]
    pub fn with_mount(mut self, enable: bool) -> Self {
        self.mount = enable;
        self
    }

    /// Enable network namespace
    #[must_use]
    pub fn with_network(mut self, enable: bool) -> Self {
        self.network = enable;
        self
    }

    /// Enable PID namespace
    #[must_use]
    pub fn with_pid(mut self, enable: bool) -> Self {
        self.pid = enable;
        self
    }

    /// Enable UTS namespace
    #[must_use]
    pub fn with_uts(mut self, enable: bool) -> Self {
        self.uts = enable;
        self
    }

    /// Enable user namespace
    #[must_use]
    pub fn with_user(mut self, enable: bool) -> Self {
        self.user = enable;
        self
    }

    /// Whether a namespace of this kind is requested
    #[must_use]
    pub const fn contains(&self, kind: NamespaceKind) -> bool {
        match kind {
            NamespaceKind::Ipc => self.ipc,
            NamespaceKind::Mount => self.mount,
            NamespaceKind::Network => self.network,
            NamespaceKind::Pid => self.pid,
            NamespaceKind::Uts => self.uts,
            NamespaceKind::User => self.user,
        }
    }

    /// Convert to clone flags for clone(2)
    #[must_use]
    pub fn to_clone_flags(&self) -> CloneFlags {
        self.enabled_namespaces()
            .into_iter()
            .fold(CloneFlags::empty(), |flags, kind| flags | kind.clone_flag())
    }

    /// Check if any namespaces are enabled
    #[must_use]
    pub fn has_any(&self) -> bool {
        self.ipc || self.mount || self.network || self.pid || self.uts || self.user
    }

    /// Get list of enabled namespaces
    #[must_use]
    pub fn enabled_namespaces(&self) -> Vec<NamespaceKind> {
        NamespaceKind::ALL
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .collect()
    }
}

impl fmt::Display for NamespaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_any() {
            return f.write_str("none");
        }

        let names: Vec<&str> = self
            .enabled_namespaces()
            .into_iter()
            .map(NamespaceKind::proc_name)
            .collect();
        f.write_str(&names.join(","))
    }
}
