// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `overlayManager`: composes and tears down the merged view.
//!
//! The mount pairs two locks, `baseMount-<g>-<i>` and
//! `configMount-<g>-<i>`: both are taken before mounting (or neither),
//! and both stay held for the whole life of the mount, which is what
//! keeps downloads and repo fetches away from layers in use.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gsm_adapters::{unmount_with_retry, Mounter, OverlaySpec};
use gsm_bus::{spawn_ping_responder, Bus, Liveness};
use gsm_core::{GameId, InstanceId, Layout};
use gsm_lock::{exact_pattern, LockDir, LockName};
use gsm_wire::{sub, Ack, Envelope, FinalStatus, Nack, SetupMount, TeardownMount};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::managers::decode_request;
use crate::supervisor::{Supervisor, LOCK_TIMEOUT};
use crate::{env, DaemonError};

pub const MODULE: &str = "overlayManager";

/// Unmount retry policy for busy mount points.
const UNMOUNT_ATTEMPTS: u32 = 5;
const UNMOUNT_BACKOFF: Duration = Duration::from_millis(500);

struct MountRecord {
    spec: OverlaySpec,
    base_lock: LockName,
    config_lock: LockName,
}

pub struct OverlayManagerConfig {
    pub layout: Layout,
    pub mounter: Arc<dyn Mounter>,
    pub lock_timeout: Duration,
}

impl OverlayManagerConfig {
    pub fn from_env() -> Self {
        Self {
            layout: env::layout(),
            mounter: Arc::new(gsm_adapters::OverlayMounter),
            lock_timeout: LOCK_TIMEOUT,
        }
    }
}

pub struct OverlayManager {
    bus: Bus,
    locks: LockDir,
    supervisor: Supervisor,
    config: OverlayManagerConfig,
    mounts: Arc<Mutex<HashMap<String, MountRecord>>>,
    liveness: Liveness,
}

impl OverlayManager {
    pub fn new(bus: Bus, locks: LockDir, config: OverlayManagerConfig) -> Self {
        let liveness = Liveness::new(MODULE);
        Self {
            supervisor: Supervisor::new(bus.clone(), locks.clone(), liveness.clone()),
            bus,
            locks,
            config,
            mounts: Arc::new(Mutex::new(HashMap::new())),
            liveness,
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), DaemonError> {
        let mut setups = self.bus.subscribe(&format!("{MODULE}.setupMount"))?;
        let mut teardowns = self.bus.subscribe(&format!("{MODULE}.teardownMount"))?;
        let _ping = spawn_ping_responder(self.bus.clone(), self.liveness.clone())?;
        info!(module = MODULE, "ready");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(message) = setups.recv() => self.handle_setup(&message),
                Some(message) = teardowns.recv() => self.handle_teardown(&message),
            }
        }
        // Shutdown: drain any in-flight supervisor tasks, then
        // deregister. Established mounts keep their lock pair: the
        // overlay stays mounted, and a dead holder reads as stale.
        self.supervisor.shutdown_tasks().await;
        self.bus.unsubscribe_all()?;
        Ok(())
    }

    fn handle_setup(&self, message: &gsm_bus::BusMessage) {
        let envelope: Envelope<SetupMount> = match decode_request(message) {
            Ok(envelope) => envelope,
            Err((Some(reply_to), err)) => return self.supervisor.reject(&reply_to, err),
            Err((None, err)) => return warn!(%err, "undeliverable setupMount"),
        };
        let req = envelope.payload;
        let reply_to = envelope.reply_to;
        let key = mount_key(&req.game_id, &req.instance_id);

        if self.mounts.lock().contains_key(&key) {
            return self.supervisor.reply(
                &reply_to,
                sub::NACK,
                &Nack {
                    reason: "alreadyMounted".to_string(),
                    already_requested: false,
                    subscribe_to: None,
                },
            );
        }

        // Validate the layer stack before touching any lock.
        let base = self.config.layout.base_dir(&req.game_id);
        if !base.is_dir() {
            return self
                .supervisor
                .reject(&reply_to, format!("base layer missing: {}", base.display()));
        }
        let config_root = self.config.layout.config_dir(&req.game_id, &req.instance_id);
        let mut config_layers = Vec::new();
        for ident in &req.config_layers {
            let layer = config_root.join(ident);
            if !layer.is_dir() {
                return self
                    .supervisor
                    .reject(&reply_to, format!("config layer missing: {}", layer.display()));
            }
            config_layers.push(layer);
        }

        let spec = OverlaySpec {
            base,
            config_layers,
            persist: self.config.layout.persist_dir(&req.game_id, &req.instance_id),
            work: self.config.layout.work_dir(&req.game_id, &req.instance_id),
            merged: self.config.layout.merged_dir(&req.game_id, &req.instance_id),
        };

        let manager = self.clone_refs();
        let lock_timeout = self.config.lock_timeout;
        tokio::spawn(async move {
            manager
                .setup_mount(req.game_id, req.instance_id, spec, reply_to, lock_timeout)
                .await;
        });
    }

    fn handle_teardown(&self, message: &gsm_bus::BusMessage) {
        let envelope: Envelope<TeardownMount> = match decode_request(message) {
            Ok(envelope) => envelope,
            Err((Some(reply_to), err)) => return self.supervisor.reject(&reply_to, err),
            Err((None, err)) => return warn!(%err, "undeliverable teardownMount"),
        };
        let req = envelope.payload;
        let reply_to = envelope.reply_to;

        let manager = self.clone_refs();
        tokio::spawn(async move {
            manager
                .teardown_mount(req.game_id, req.instance_id, reply_to)
                .await;
        });
    }

    fn clone_refs(&self) -> OverlayWorker {
        OverlayWorker {
            locks: self.locks.clone(),
            supervisor: self.supervisor.clone(),
            mounter: Arc::clone(&self.config.mounter),
            mounts: Arc::clone(&self.mounts),
        }
    }

    /// Is this instance currently mounted? (Used by tests and status.)
    pub fn is_mounted(&self, game_id: &GameId, instance_id: &InstanceId) -> bool {
        self.mounts.lock().contains_key(&mount_key(game_id, instance_id))
    }
}

fn mount_key(game_id: &GameId, instance_id: &InstanceId) -> String {
    format!("{game_id}-{instance_id}")
}

struct OverlayWorker {
    locks: LockDir,
    supervisor: Supervisor,
    mounter: Arc<dyn Mounter>,
    mounts: Arc<Mutex<HashMap<String, MountRecord>>>,
}

impl OverlayWorker {
    async fn setup_mount(
        &self,
        game_id: GameId,
        instance_id: InstanceId,
        spec: OverlaySpec,
        reply_to: String,
        lock_timeout: Duration,
    ) {
        // Base files must be quiescent and no game may be reading.
        for blocking in [
            exact_pattern(&LockName::download_game(&game_id)),
            exact_pattern(&LockName::running(&game_id, &instance_id)),
        ] {
            if let Err(err) = self.locks.wait_clear(&blocking, lock_timeout).await {
                return self
                    .supervisor
                    .reject(&reply_to, format!("mount blocked: {err}"));
            }
        }

        // The lock pair: both or neither.
        let base_lock = LockName::base_mount(&game_id, &instance_id);
        let config_lock = LockName::config_mount(&game_id, &instance_id);
        if let Err(err) = self.locks.acquire(&base_lock) {
            return self.supervisor.reject(&reply_to, format!("mount lock: {err}"));
        }
        if let Err(err) = self.locks.acquire(&config_lock) {
            if let Err(release_err) = self.locks.release(&base_lock) {
                warn!(%release_err, "pair rollback failed");
            }
            return self.supervisor.reject(&reply_to, format!("mount lock: {err}"));
        }

        self.supervisor
            .reply(&reply_to, sub::ACK, &Ack { subscribe_to: reply_to.clone() });

        match self.mounter.mount(&spec).await {
            Ok(()) => {
                let key = mount_key(&game_id, &instance_id);
                self.mounts.lock().insert(
                    key,
                    MountRecord {
                        spec,
                        base_lock,
                        config_lock,
                    },
                );
                info!(game = %game_id, instance = %instance_id, "overlay mounted");
                self.supervisor
                    .reply(&reply_to, sub::FINAL_STATUS, &FinalStatus::completed());
            }
            Err(err) => {
                for lock in [&config_lock, &base_lock] {
                    if let Err(release_err) = self.locks.release(lock) {
                        warn!(%release_err, "lock release after mount failure failed");
                    }
                }
                self.supervisor
                    .reply(&reply_to, sub::FINAL_STATUS, &FinalStatus::failed(err.to_string()));
            }
        }
    }

    async fn teardown_mount(&self, game_id: GameId, instance_id: InstanceId, reply_to: String) {
        let key = mount_key(&game_id, &instance_id);
        let Some(record) = self.mounts.lock().remove(&key) else {
            return self
                .supervisor
                .reject(&reply_to, format!("{game_id}/{instance_id} is not mounted"));
        };

        self.supervisor
            .reply(&reply_to, sub::ACK, &Ack { subscribe_to: reply_to.clone() });

        match unmount_with_retry(
            self.mounter.as_ref(),
            &record.spec.merged,
            UNMOUNT_ATTEMPTS,
            UNMOUNT_BACKOFF,
        )
        .await
        {
            Ok(()) => {
                for lock in [&record.config_lock, &record.base_lock] {
                    if let Err(err) = self.locks.release(lock) {
                        warn!(%err, "lock release after unmount failed");
                    }
                }
                info!(game = %game_id, instance = %instance_id, "overlay unmounted");
                self.supervisor
                    .reply(&reply_to, sub::FINAL_STATUS, &FinalStatus::completed());
            }
            Err(err) => {
                // Still mounted: keep the record and the lock pair.
                self.mounts.lock().insert(key, record);
                self.supervisor
                    .reply(&reply_to, sub::FINAL_STATUS, &FinalStatus::failed(err.to_string()));
            }
        }
    }
}

#[cfg(test)]
#[path = "overlay_tests.rs"]
mod tests;
