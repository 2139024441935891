use nix::sys::wait::{WaitStatus, waitpid};
use nsreap_core::{CommandSpec, ProcessId};
use nsreap_namespace::*;

/// Check if running as root
fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[test]
fn test_namespace_config_from_flags() {
    let config = NamespaceConfig::new().with_pid(true).with_uts(true);

    let enabled = config.enabled_namespaces();
    assert!(enabled.contains(&NamespaceKind::Pid));
    assert!(enabled.contains(&NamespaceKind::Uts));
    assert!(!enabled.contains(&NamespaceKind::Network));
}

#[test]
fn test_namespace_config_serde() {
    let config = NamespaceConfig::new().with_ipc(true);

    let json = serde_json::to_string(&config).unwrap();
    let deserialized: NamespaceConfig = serde_json::from_str(&json).unwrap();

    assert_eq!(config, deserialized);
}

#[test]
fn test_bridge_timing_serde() {
    let timing = BridgeTiming::from_millis(250, 100);

    let json = serde_json::to_string(&timing).unwrap();
    let deserialized: BridgeTiming = serde_json::from_str(&json).unwrap();

    assert_eq!(timing, deserialized);
}

#[test]
fn test_launch_trivial_command() {
    let mut launcher = Launcher::new(NamespaceConfig::new());
    let record = launcher
        .launch(&CommandSpec::new(["true"]).unwrap())
        .unwrap();

    let status = waitpid(record.pid().as_nix_pid(), None).unwrap();
    assert!(matches!(status, WaitStatus::Exited(_, 0)));
}

#[test]
fn test_launch_without_privilege_fails() {
    // Skip if running as root
    if is_root() {
        return;
    }

    let mut launcher = Launcher::new(NamespaceConfig::new().with_pid(true));
    let result = launcher.launch(&CommandSpec::new(["true"]).unwrap());

    assert!(result.is_err());
}

#[test]
#[ignore] // Requires root
fn test_launch_every_namespace_subset() {
    let kinds = NamespaceKind::ALL;

    for mask in 0u32..(1 << kinds.len()) {
        let mut config = NamespaceConfig::new();
        for (bit, kind) in kinds.iter().enumerate() {
            if mask & (1 << bit) != 0 {
                config = match kind {
                    NamespaceKind::Ipc => config.with_ipc(true),
                    NamespaceKind::Mount => config.with_mount(true),
                    NamespaceKind::Network => config.with_network(true),
                    NamespaceKind::Pid => config.with_pid(true),
                    NamespaceKind::Uts => config.with_uts(true),
                    NamespaceKind::User => config.with_user(true),
                };
            }
        }

        let mut launcher = Launcher::new(config.clone());
        let record = launcher
            .launch(&CommandSpec::new(["true"]).unwrap())
            .unwrap();

        let status = waitpid(record.pid().as_nix_pid(), None).unwrap();
        assert!(
            matches!(status, WaitStatus::Exited(_, 0)),
            "namespaces [{config}] gave {status:?}"
        );
    }
}

#[test]
#[ignore] // Requires root
fn test_child_gets_new_pid_namespace() {
    let mut launcher = Launcher::new(NamespaceConfig::new().with_pid(true));
    let record = launcher
        .launch(&CommandSpec::new(["sleep", "1"]).unwrap())
        .unwrap();

    let procfs = ProcfsNamespaces::new();
    let ours = procfs
        .namespace_id(ProcessId::current(), NamespaceKind::Pid)
        .unwrap();
    let theirs = procfs.namespace_id(record.pid(), NamespaceKind::Pid).unwrap();
    assert_ne!(ours, theirs);

    waitpid(record.pid().as_nix_pid(), None).unwrap();
}
