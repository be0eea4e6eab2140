// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gameManager`: the game process on top of a ready merged view.

use std::time::Duration;

use gsm_adapters::{assemble_command, run_game, DriveOutcome, DriverError, GameOutcome};
use gsm_bus::{spawn_ping_responder, Bus, Liveness};
use gsm_core::{InstanceStore, Layout, ManifestStore};
use gsm_lock::{exact_pattern, LockDir, LockName};
use gsm_wire::{sub, Ack, Envelope, FinalStatus, StartGame, StopGame};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::managers::decode_request;
use crate::supervisor::{Supervisor, TaskSpec, LOCK_TIMEOUT};
use crate::{env, DaemonError};

pub const MODULE: &str = "gameManager";

/// Budget for a stop handshake with the running game task.
const STOP_ACK_TIMEOUT: Duration = Duration::from_secs(40);

pub struct GameManagerConfig {
    pub layout: Layout,
    pub terminate_grace: Duration,
    pub lock_timeout: Duration,
}

impl GameManagerConfig {
    pub fn from_env() -> Self {
        Self {
            layout: env::layout(),
            terminate_grace: gsm_adapters::game::TERMINATE_GRACE,
            lock_timeout: LOCK_TIMEOUT,
        }
    }
}

pub struct GameManager {
    bus: Bus,
    locks: LockDir,
    supervisor: Supervisor,
    manifests: ManifestStore,
    instances: InstanceStore,
    config: GameManagerConfig,
    liveness: Liveness,
}

impl GameManager {
    pub fn new(bus: Bus, locks: LockDir, config: GameManagerConfig) -> Self {
        let liveness = Liveness::new(MODULE);
        Self {
            supervisor: Supervisor::new(bus.clone(), locks.clone(), liveness.clone()),
            manifests: ManifestStore::new(config.layout.manifests_dir()),
            instances: InstanceStore::new(config.layout.instances_dir()),
            bus,
            locks,
            config,
            liveness,
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), DaemonError> {
        let mut starts = self.bus.subscribe(&format!("{MODULE}.start"))?;
        let mut stops = self.bus.subscribe(&format!("{MODULE}.stop"))?;
        let _ping = spawn_ping_responder(self.bus.clone(), self.liveness.clone())?;
        info!(module = MODULE, "ready");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(message) = starts.recv() => self.handle_start(&message),
                Some(message) = stops.recv() => self.handle_stop(&message),
            }
        }
        // Shutdown: terminate any running game so `running-<g>-<i>` is
        // released, then deregister. SIGTERM goes out immediately; the
        // force-exit watchdog may fire before SIGKILL escalation does.
        self.supervisor.shutdown_tasks().await;
        self.bus.unsubscribe_all()?;
        Ok(())
    }

    fn handle_start(&self, message: &gsm_bus::BusMessage) {
        let envelope: Envelope<StartGame> = match decode_request(message) {
            Ok(envelope) => envelope,
            Err((Some(reply_to), err)) => return self.supervisor.reject(&reply_to, err),
            Err((None, err)) => return warn!(%err, "undeliverable start"),
        };
        let req = envelope.payload;
        let reply_to = envelope.reply_to;

        let manifest = match self.manifests.lookup(&req.game_id) {
            Ok(manifest) => manifest,
            Err(err) => return self.supervisor.reject(&reply_to, err.to_string()),
        };
        let instance = match self.instances.lookup(&req.game_id, &req.instance_id) {
            Ok(instance) => instance,
            Err(err) => return self.supervisor.reject(&reply_to, err.to_string()),
        };

        // The merged view must be live: both mount locks held.
        for mount_lock in [
            LockName::base_mount(&req.game_id, &req.instance_id),
            LockName::config_mount(&req.game_id, &req.instance_id),
        ] {
            match self.locks.is_held(&exact_pattern(&mount_lock), false) {
                Ok(true) => {}
                Ok(false) => {
                    return self
                        .supervisor
                        .reject(&reply_to, format!("mount lock {mount_lock} is not held"))
                }
                Err(err) => return self.supervisor.reject(&reply_to, err.to_string()),
            }
        }

        let mut process = assemble_command(&manifest, &instance);
        process.merged_dir = self.config.layout.merged_dir(&req.game_id, &req.instance_id);
        if !gsm_adapters::game::binary_present(&process) {
            return self.supervisor.reject(
                &reply_to,
                format!(
                    "game binary missing in merged view: {}",
                    gsm_adapters::game::binary_path(&process).display()
                ),
            );
        }

        let key = format!("{}-{}", req.game_id, req.instance_id);
        let spec = TaskSpec::new(
            key,
            &reply_to,
            LockName::running(&req.game_id, &req.instance_id),
        )
        .lock_timeout(self.config.lock_timeout);

        let grace = self.config.terminate_grace;
        let bin_name = process.bin_name.clone();
        self.supervisor.start_task(spec, move |ctx| async move {
            match run_game(&process, ctx.output, ctx.cancel, grace).await? {
                GameOutcome::Exited(0) => Ok(DriveOutcome::Completed),
                GameOutcome::Exited(code) => Err(DriverError::ToolExit {
                    tool: bin_name,
                    code,
                }),
                GameOutcome::Terminated => Ok(DriveOutcome::Canceled),
            }
        });
    }

    fn handle_stop(&self, message: &gsm_bus::BusMessage) {
        let envelope: Envelope<StopGame> = match decode_request(message) {
            Ok(envelope) => envelope,
            Err((Some(reply_to), err)) => return self.supervisor.reject(&reply_to, err),
            Err((None, err)) => return warn!(%err, "undeliverable stop"),
        };
        let req = envelope.payload;
        let reply_to = envelope.reply_to;
        let key = format!("{}-{}", req.game_id, req.instance_id);

        let Some(handle) = self.supervisor.find(&key) else {
            return self
                .supervisor
                .reject(&reply_to, format!("no game running for {key}"));
        };

        self.supervisor
            .reply(&reply_to, sub::ACK, &Ack { subscribe_to: reply_to.clone() });
        handle.cancel.cancel();
        info!(key = %key, "stop requested");

        let supervisor = self.supervisor.clone();
        tokio::spawn(async move {
            if tokio::time::timeout(STOP_ACK_TIMEOUT, handle.done.cancelled())
                .await
                .is_err()
            {
                return supervisor.reject(&reply_to, "game did not stop in time");
            }
            supervisor.reply(&reply_to, sub::FINAL_STATUS, &FinalStatus::canceled());
        });
    }
}

#[cfg(test)]
#[path = "game_tests.rs"]
mod tests;
