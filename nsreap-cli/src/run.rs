//! Supervision of the isolated process tree

use anyhow::{Context, Result};
use nsreap_core::{CommandSpec, ProcessRecord};
use nsreap_namespace::{Bridge, BridgeTiming, Launcher, NamespaceConfig};
use nsreap_reaper::{Reaper, Subreaper, SystemWaiter};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cli::Cli;

const PROGRAM: &str = "nsreap";

/// Launch the command, wait for it, and collect everything left behind
///
/// Returns the exit code to terminate with: the command's own status, or
/// 128 + signal number if it was killed.
pub async fn execute(cli: Cli) -> Result<i32> {
    let command = CommandSpec::new(cli.command.iter().cloned()).context("Invalid command")?;
    let ns_config = cli.namespace_config();

    debug!(namespaces = %ns_config, command = %command, "Starting");

    // The collector has to exist before the first child does
    let reaper = Arc::new(Reaper::new(Arc::new(SystemWaiter::new())));
    let reaper_task = reaper
        .start()
        .context("Failed to install SIGCHLD handler")?;

    let subreaper = if cli.subreaper {
        Some(Subreaper::establish().context("Failed to become child subreaper")?)
    } else {
        None
    };

    let mut launcher = Launcher::new(ns_config.clone());
    let primary = reaper
        .track(|| launcher.launch(&command))
        .context("Failed to launch isolated process")?;

    let bridge = spawn_bridge(
        &reaper,
        &ns_config,
        subreaper,
        &primary,
        cli.bridge_timing(),
    );

    let state = reaper
        .wait_for(&primary)
        .await
        .context("Failed to wait for child")?;

    if state.is_success() {
        info!(pid = %primary.pid(), "Isolated process {state}");
    } else {
        warn!(pid = %primary.pid(), "Isolated process {state}");
    }

    if let Some(bridge) = bridge {
        match reaper.wait_for(&bridge).await {
            Ok(bridge_state) if bridge_state.is_success() => {
                debug!(pid = %bridge.pid(), "Bridge process {bridge_state}");
            }
            Ok(bridge_state) => warn!(pid = %bridge.pid(), "Bridge process {bridge_state}"),
            Err(e) => warn!(pid = %bridge.pid(), error = %e, "Lost track of bridge process"),
        }
    }

    // Orphans adopted as subreaper are ours to collect before leaving
    reaper.settle().await;
    reaper_task.abort();

    let vanished = reaper.ledger().outstanding();
    if !vanished.is_empty() {
        warn!(pids = ?vanished, "Tracked processes left without a collected status");
    }

    debug!(
        adopted = reaper.ledger().adopted_reaped(),
        "Collected adopted descendants"
    );
    debug!("{PROGRAM}: terminating");

    Ok(state.exit_code().unwrap_or(1))
}

/// Start the namespace re-entry bridge if both PID namespace and subreaper
/// mode were requested
fn spawn_bridge(
    reaper: &Reaper,
    ns_config: &NamespaceConfig,
    subreaper: Option<Subreaper>,
    primary: &ProcessRecord,
    timing: BridgeTiming,
) -> Option<ProcessRecord> {
    let subreaper = subreaper?;

    if !ns_config.pid {
        debug!("No PID namespace requested, skipping namespace re-entry");
        return None;
    }

    let bridge = Bridge::new(primary.pid())
        .with_subreaper(subreaper.pid())
        .with_timing(timing);

    match reaper.track(|| bridge.spawn()) {
        Ok(record) => {
            info!(
                pid = %record.pid(),
                target = %primary.pid(),
                "Re-entry bridge started"
            );
            Some(record)
        }
        Err(e) => {
            warn!(error = %e, "Could not start re-entry bridge");
            None
        }
    }
}
