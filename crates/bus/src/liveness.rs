// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ping/pong liveness.
//!
//! Every manager answers on `<module>.ping` and `_broadcast.ping` with a
//! pong carrying its uptime; peers treat a module as ready once that
//! uptime passes [`READY_UPTIME`] — young enough processes may still be
//! wiring up their subscriptions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gsm_wire::{Envelope, ModuleStatus, Ping, Pong, ResourceUsage, BROADCAST_PING};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{Bus, BusError};

/// Uptime threshold for considering a peer ready.
pub const READY_UPTIME: Duration = Duration::from_secs(5);

/// Cadence at which `wait_for_module` re-pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(1);

struct LivenessInner {
    module_ident: String,
    started: Instant,
    status: Mutex<ModuleStatus>,
}

/// This process's liveness state, shared with the ping responder.
#[derive(Clone)]
pub struct Liveness {
    inner: Arc<LivenessInner>,
}

impl Liveness {
    pub fn new(module_ident: &str) -> Self {
        Self::started_at(module_ident, Instant::now())
    }

    /// Construct with an explicit start instant (the process may have been
    /// running before the bus came up; tests backdate this).
    pub fn started_at(module_ident: &str, started: Instant) -> Self {
        Self {
            inner: Arc::new(LivenessInner {
                module_ident: module_ident.to_string(),
                started,
                status: Mutex::new(ModuleStatus::Ready),
            }),
        }
    }

    pub fn module_ident(&self) -> &str {
        &self.inner.module_ident
    }

    pub fn set_status(&self, status: ModuleStatus) {
        *self.inner.status.lock() = status;
    }

    pub fn status(&self) -> ModuleStatus {
        *self.inner.status.lock()
    }

    pub fn uptime(&self) -> Duration {
        self.inner.started.elapsed()
    }

    /// Build the pong this process answers pings with.
    pub fn pong(&self) -> Pong {
        Pong {
            module_ident: self.inner.module_ident.clone(),
            pid: std::process::id(),
            uptime_secs: self.uptime().as_secs_f64(),
            status: self.status(),
            resource_usage: resource_usage(),
            timestamp: Utc::now(),
        }
    }
}

/// Serve `<module>.ping` and `_broadcast.ping` until the bus stops.
pub fn spawn_ping_responder(bus: Bus, liveness: Liveness) -> Result<JoinHandle<()>, BusError> {
    let mut own = bus.subscribe(&gsm_wire::ping_topic(liveness.module_ident()))?;
    let mut broadcast = bus.subscribe(BROADCAST_PING)?;

    Ok(tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                m = own.recv() => m,
                m = broadcast.recv() => m,
            };
            let Some(message) = message else { break };
            let envelope: Envelope<Ping> = match message.decode() {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(topic = %message.topic, %err, "ignoring malformed ping");
                    continue;
                }
            };
            let pong = liveness.pong();
            if let Err(err) = bus.publish(&envelope.reply_to, &pong) {
                warn!(reply_to = %envelope.reply_to, %err, "pong publish failed");
            }
        }
    }))
}

/// Ping `target` until it reports ready (uptime ≥ [`READY_UPTIME`]), or
/// fail `Timeout` once the budget is spent.
pub async fn wait_for_module(
    bus: &Bus,
    origin_module: &str,
    target: &str,
    timeout: Duration,
) -> Result<Pong, BusError> {
    let started = tokio::time::Instant::now();
    loop {
        let round_start = tokio::time::Instant::now();
        let envelope = Envelope::new(origin_module, Ping {});
        let mut sub = bus.subscribe(&envelope.reply_to)?;
        bus.publish(&gsm_wire::ping_topic(target), &envelope)?;

        let remaining = timeout.saturating_sub(started.elapsed());
        let window = PING_INTERVAL.min(remaining);
        let outcome = sub.recv_timeout(window).await;
        bus.unsubscribe(&envelope.reply_to)?;

        match outcome {
            Ok(message) => match message.decode::<Pong>() {
                Ok(pong) if pong.uptime_secs >= READY_UPTIME.as_secs_f64() => {
                    debug!(module = target, uptime = pong.uptime_secs, "module ready");
                    return Ok(pong);
                }
                Ok(pong) => {
                    debug!(module = target, uptime = pong.uptime_secs, "module alive but not ready");
                }
                Err(err) => warn!(module = target, %err, "malformed pong"),
            },
            Err(BusError::Timeout(..)) => {}
            Err(other) => return Err(other),
        }

        if started.elapsed() >= timeout {
            return Err(BusError::Timeout(timeout, format!("module {target}")));
        }
        // Keep the 1 s cadence even when a not-ready pong came back instantly.
        let spent = round_start.elapsed();
        if spent < PING_INTERVAL {
            let pause = (PING_INTERVAL - spent).min(timeout.saturating_sub(started.elapsed()));
            tokio::time::sleep(pause).await;
        }
    }
}

/// RSS and user CPU time from procfs; zeros when unreadable.
fn resource_usage() -> ResourceUsage {
    let rss_bytes = std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|statm| {
            statm
                .split_whitespace()
                .nth(1)
                .and_then(|pages| pages.parse::<u64>().ok())
        })
        .map(|pages| pages * 4096)
        .unwrap_or(0);

    let user_time_secs = std::fs::read_to_string("/proc/self/stat")
        .ok()
        .and_then(|stat| {
            // utime is field 14; the comm field may contain spaces but is
            // parenthesized, so split after the closing paren.
            let rest = stat.rsplit_once(')')?.1.trim();
            rest.split_whitespace()
                .nth(11)
                .and_then(|ticks| ticks.parse::<u64>().ok())
        })
        .map(|ticks| ticks as f64 / 100.0)
        .unwrap_or(0.0);

    ResourceUsage {
        rss_bytes,
        user_time_secs,
    }
}

/// Is the process with this PID still alive? EPERM counts as alive.
pub(crate) fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    match nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "liveness_tests.rs"]
mod tests;
