use assert_cmd::Command;
use predicates::prelude::*;

/// Check if running as root
fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

fn nsreap() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_nsreap"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_command() {
    nsreap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Linux namespaces"))
        .stdout(predicate::str::contains("--pid"))
        .stdout(predicate::str::contains("--subreaper"))
        .stdout(predicate::str::contains("wait for every adopted descendant"))
        .stdout(predicate::str::contains("--user"))
        .stdout(predicate::str::contains("--bridge-settle-ms"));
}

#[test]
fn test_version_command() {
    nsreap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("nsreap"));
}

#[test]
fn test_missing_command() {
    nsreap()
        .arg("-p")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_unknown_flag() {
    nsreap()
        .arg("-x")
        .arg("true")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn test_trivial_command_without_namespaces() {
    nsreap().arg("true").assert().success();
}

#[test]
fn test_exit_code_is_propagated() {
    nsreap()
        .args(["sh", "-c", "exit 3"])
        .assert()
        .code(3);
}

#[test]
fn test_missing_program_fails() {
    nsreap()
        .arg("/nonexistent/nsreap-test-binary")
        .assert()
        .code(127)
        .stderr(predicate::str::contains("failed to execute"));
}

#[test]
fn test_verbose_reports_child_pid() {
    nsreap()
        .args(["-v", "true"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PID of child created by clone()"))
        .stdout(predicate::str::contains("nsreap: terminating"));
}

#[test]
fn test_subreaper_without_pid_namespace() {
    nsreap()
        .args(["-r", "-v", "true"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PR_SET_CHILD_SUBREAPER"))
        .stdout(predicate::str::contains("skipping namespace re-entry"));
}

#[test]
fn test_subreaper_collects_orphans() {
    // The backgrounded sleep outlives the shell and is reparented to us.
    nsreap()
        .args(["-r", "-v", "sh", "-c", "sleep 0.2 & exit 0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lineage=adopted"))
        .stdout(predicate::str::contains("adopted=1"));
}

#[test]
fn test_pid_namespace_requires_privilege() {
    // Skip if running as root
    if is_root() {
        return;
    }

    nsreap()
        .args(["-p", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Permission denied"));
}

#[test]
#[ignore] // Requires root
fn test_every_namespace() {
    nsreap().args(["-i", "-m", "-n", "-p", "-u", "true"]).assert().success();
}

#[test]
#[ignore] // Requires root
fn test_missing_program_in_pid_namespace() {
    nsreap()
        .args(["-p", "/nonexistent/nsreap-test-binary"])
        .assert()
        .code(127);
}

#[test]
#[ignore] // Requires root
fn test_reentry_orphan_is_adopted_by_subreaper() {
    nsreap()
        .args([
            "-p",
            "-r",
            "--bridge-settle-ms",
            "200",
            "--bridge-linger-ms",
            "100",
            "sleep",
            "2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Joined PID namespace of target"))
        .stdout(predicate::str::contains("Orphan reporting its parent"))
        .stdout(predicate::str::contains("adopted_by_subreaper="));
}

#[test]
#[ignore] // Requires root
fn test_reentry_leaves_no_zombies() {
    nsreap()
        .args([
            "-p",
            "-r",
            "-v",
            "--bridge-settle-ms",
            "100",
            "--bridge-linger-ms",
            "100",
            "sleep",
            "1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bridge process exited with code 0"))
        .stdout(predicate::str::contains("No children left"));
}
