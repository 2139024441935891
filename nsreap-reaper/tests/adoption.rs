//! Registers the test binary as subreaper and collects from any child, so
//! this file holds a single test.

#![allow(unsafe_code)]

use nix::unistd::{ForkResult, fork};
use nsreap_core::{Lineage, ProcessEvent, ProcessRecord};
use nsreap_reaper::{Reaper, Subreaper, SystemWaiter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Fork a child that forks a grandchild and exits at once
fn fork_orphaning() -> nsreap_core::Result<ProcessRecord> {
    match unsafe { fork() }? {
        ForkResult::Parent { child } => Ok(ProcessRecord::direct(child.into())),
        ForkResult::Child => match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                std::thread::sleep(Duration::from_millis(100));
                unsafe { libc::_exit(0) }
            }
            Ok(ForkResult::Parent { .. }) => unsafe { libc::_exit(0) },
            Err(_) => unsafe { libc::_exit(1) },
        },
    }
}

#[tokio::test]
async fn test_orphan_is_adopted_and_reaped() {
    let subreaper = Subreaper::establish().unwrap();
    assert!(Subreaper::is_active().unwrap());
    assert_eq!(Subreaper::establish().unwrap(), subreaper);

    let (tx, mut rx) = mpsc::channel(32);
    let reaper = Arc::new(Reaper::new(Arc::new(SystemWaiter::new())).with_events(tx));
    let task = reaper.start().unwrap();

    let child = reaper.track(fork_orphaning).unwrap();
    let state = reaper.wait_for(&child).await.unwrap();
    assert!(state.is_success());

    // The grandchild is ours now; nothing may be left behind as a zombie.
    reaper.settle().await;
    task.abort();

    let mut adopted = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ProcessEvent::Reaped {
            pid,
            lineage: Lineage::Adopted,
            state,
            ..
        } = event
        {
            assert!(state.is_success());
            adopted.push(pid);
        }
    }
    assert_eq!(adopted.len(), 1);
    assert_ne!(adopted[0], child.pid());
    assert_eq!(reaper.ledger().adopted_reaped(), 1);
}
