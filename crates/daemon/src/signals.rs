// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process signal handling.
//!
//! One forwarder per process: SIGINT/SIGTERM trigger the shutdown token
//! and are relayed to the currently active tool child (at most one; the
//! slot is replaced across downloads, never accumulated). A watchdog
//! force-exits if clean shutdown stalls.

use std::time::Duration;

use gsm_adapters::ActiveChildSlot;
use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Budget between shutdown start and forced exit.
pub const FORCE_EXIT_GRACE: Duration = Duration::from_secs(5);

/// Relay SIGINT/SIGTERM: fire `shutdown` and, for drivers that own an
/// external tool child, forward SIGTERM to it.
///
/// `active_child` is `None` for modules whose children are terminated
/// through task cancellation instead of raw signal relay.
pub fn spawn_signal_forwarder(
    active_child: Option<ActiveChildSlot>,
    shutdown: CancellationToken,
) -> std::io::Result<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("SIGINT received"),
            _ = sigterm.recv() => info!("SIGTERM received"),
        }
        if let Some(slot) = active_child {
            slot.forward(Signal::SIGTERM);
        }
        shutdown.cancel();
    }))
}

/// Force-exit the process if shutdown does not complete within `grace`.
///
/// The returned handle is aborted by a clean exit path; if the process
/// is still alive when the grace expires, it exits hard with code 0.
pub fn spawn_force_exit_watchdog(shutdown: CancellationToken, grace: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown.cancelled().await;
        tokio::time::sleep(grace).await;
        warn!("clean shutdown stalled; forcing exit");
        std::process::exit(0);
    })
}
