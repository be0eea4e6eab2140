// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `downloadManager`: game base-file downloads via the content tool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gsm_adapters::{ActiveChildSlot, DownloadSpec, Fetcher, HttpFetcher, SteamCmd, SteamLogin};
use gsm_bus::{spawn_ping_responder, Bus, Liveness};
use gsm_core::{DownloadType, GameId, Layout, ManifestError, ManifestStore};
use gsm_lock::{base_mount_pattern, LockDir, LockName};
use gsm_wire::{sub, Ack, CancelDownload, DownloadGame, Envelope, FinalStatus, ListDownloads};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::managers::decode_request;
use crate::supervisor::{Supervisor, TaskSpec, LOCK_TIMEOUT};
use crate::{env, DaemonError};

pub const MODULE: &str = "downloadManager";

/// Budget for a cancel handshake with the worker.
const CANCEL_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Static configuration for the download manager.
pub struct DownloadManagerConfig {
    pub layout: Layout,
    pub steamcmd: SteamCmd,
    pub fetcher: Arc<dyn Fetcher>,
    pub login: SteamLogin,
    pub twofactor_enabled: bool,
    pub steamcmd_files_force: bool,
    pub server_files_force: bool,
    pub validate_default: bool,
    pub lock_timeout: Duration,
}

impl DownloadManagerConfig {
    pub fn from_env() -> Self {
        let layout = env::layout();
        Self {
            steamcmd: SteamCmd::new(layout.steamcmd_dir(), env::steamcmd_download_url()),
            fetcher: Arc::new(HttpFetcher::new()),
            login: env::steamcmd_login(),
            twofactor_enabled: env::steamcmd_twofactor_enabled(),
            steamcmd_files_force: env::steamcmd_files_force(),
            server_files_force: env::server_files_force(),
            validate_default: env::steamcmd_initial_download_validate(),
            lock_timeout: LOCK_TIMEOUT,
            layout,
        }
    }
}

pub struct DownloadManager {
    bus: Bus,
    supervisor: Supervisor,
    manifests: ManifestStore,
    config: DownloadManagerConfig,
    active_child: ActiveChildSlot,
    liveness: Liveness,
}

impl DownloadManager {
    pub fn new(bus: Bus, locks: LockDir, config: DownloadManagerConfig) -> Self {
        let liveness = Liveness::new(MODULE);
        Self {
            supervisor: Supervisor::new(bus.clone(), locks, liveness.clone()),
            manifests: ManifestStore::new(config.layout.manifests_dir()),
            active_child: ActiveChildSlot::new(),
            bus,
            config,
            liveness,
        }
    }

    /// The slot the process signal forwarder relays into.
    pub fn active_child(&self) -> ActiveChildSlot {
        self.active_child.clone()
    }

    /// Serve until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), DaemonError> {
        let mut downloads = self.bus.subscribe(&format!("{MODULE}.downloadUpdateGame"))?;
        let mut cancels = self.bus.subscribe(&format!("{MODULE}.cancelDownload"))?;
        let mut lists = self.bus.subscribe(&format!("{MODULE}.listDownloads"))?;
        let _ping = spawn_ping_responder(self.bus.clone(), self.liveness.clone())?;
        info!(module = MODULE, "ready");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(message) = downloads.recv() => self.handle_download(&message),
                Some(message) = cancels.recv() => self.handle_cancel(&message),
                Some(message) = lists.recv() => self.handle_list(&message),
            }
        }
        // Shutdown: cancel in-flight downloads so their locks are
        // released, then deregister.
        self.supervisor.shutdown_tasks().await;
        self.bus.unsubscribe_all()?;
        Ok(())
    }

    fn handle_download(&self, message: &gsm_bus::BusMessage) {
        let envelope: Envelope<DownloadGame> = match decode_request(message) {
            Ok(envelope) => envelope,
            Err((Some(reply_to), err)) => return self.supervisor.reject(&reply_to, err),
            Err((None, err)) => return warn!(%err, "undeliverable downloadUpdateGame"),
        };
        let req = envelope.payload;
        let reply_to = envelope.reply_to;

        if req.twofactor || self.config.twofactor_enabled {
            return self
                .supervisor
                .reject(&reply_to, "two-factor authentication is unsupported");
        }

        let manifest = match self.manifests.lookup(&req.game_id) {
            Ok(manifest) => manifest,
            Err(err @ ManifestError::Unsupported(_)) => {
                return self.supervisor.reject(&reply_to, err.to_string())
            }
            Err(err) => return self.supervisor.reject(&reply_to, err.to_string()),
        };
        match manifest.download_type {
            DownloadType::Steamcmd => {}
        }

        let login = match req.username {
            Some(username) => SteamLogin::Account {
                username,
                password: req.password.unwrap_or_default(),
            },
            None => self.config.login.clone(),
        };

        let install_dir = self.install_dir(&req.game_id, req.root_directory.as_deref());
        let download = DownloadSpec {
            install_dir,
            login,
            app_id: manifest.download_id.clone(),
            validate: req.validate || self.config.validate_default,
            pre_clean: req.server_files_force || self.config.server_files_force,
        };
        let reinstall_tool = req.force || req.steamcmd_files_force || self.config.steamcmd_files_force;

        let spec = TaskSpec::new(req.game_id.as_str(), &reply_to, LockName::download_game(&req.game_id))
            .clear_pattern(base_mount_pattern(&req.game_id))
            .lock_timeout(self.config.lock_timeout);

        let steamcmd = self.config.steamcmd.clone();
        let fetcher = Arc::clone(&self.config.fetcher);
        let active_child = self.active_child.clone();
        self.supervisor.start_task(spec, move |ctx| async move {
            steamcmd.ensure_installed(fetcher.as_ref(), reinstall_tool).await?;
            steamcmd
                .run(&download, ctx.output, ctx.progress, ctx.cancel, active_child)
                .await
        });
    }

    fn handle_cancel(&self, message: &gsm_bus::BusMessage) {
        let envelope: Envelope<CancelDownload> = match decode_request(message) {
            Ok(envelope) => envelope,
            Err((Some(reply_to), err)) => return self.supervisor.reject(&reply_to, err),
            Err((None, err)) => return warn!(%err, "undeliverable cancelDownload"),
        };
        let req = envelope.payload;
        let reply_to = envelope.reply_to;

        let Some(handle) = self.supervisor.find(req.game_id.as_str()) else {
            return self
                .supervisor
                .reject(&reply_to, format!("no download in flight for {}", req.game_id));
        };

        self.supervisor
            .reply(&reply_to, sub::ACK, &Ack { subscribe_to: reply_to.clone() });
        handle.cancel.cancel();

        let supervisor = self.supervisor.clone();
        let install_dir = self.install_dir(&req.game_id, None);
        tokio::spawn(async move {
            // The worker acknowledges by finishing its record.
            if tokio::time::timeout(CANCEL_ACK_TIMEOUT, handle.done.cancelled())
                .await
                .is_err()
            {
                return supervisor.reject(&reply_to, "cancel was not acknowledged in time");
            }
            if req.cleanup {
                info!(dir = %install_dir.display(), "removing canceled download");
                if let Err(err) = std::fs::remove_dir_all(&install_dir) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        return supervisor
                            .reject(&reply_to, format!("cleanup of {} failed: {err}", install_dir.display()));
                    }
                }
            }
            supervisor.reply(&reply_to, sub::FINAL_STATUS, &FinalStatus::canceled());
        });
    }

    fn handle_list(&self, message: &gsm_bus::BusMessage) {
        let envelope: Envelope<ListDownloads> = match decode_request(message) {
            Ok(envelope) => envelope,
            Err((Some(reply_to), err)) => return self.supervisor.reject(&reply_to, err),
            Err((None, err)) => return warn!(%err, "undeliverable listDownloads"),
        };
        let reply_to = envelope.reply_to;

        self.supervisor
            .reply(&reply_to, sub::ACK, &Ack { subscribe_to: reply_to.clone() });
        let downloads = self.supervisor.summaries();
        let status = gsm_wire::StatusReply::new("downloads").with_detail(
            "downloads",
            serde_json::to_value(&downloads).unwrap_or_default(),
        );
        self.supervisor.reply(&reply_to, sub::STATUS, &status);
        self.supervisor
            .reply(&reply_to, sub::FINAL_STATUS, &FinalStatus::completed());
    }

    fn install_dir(&self, game_id: &GameId, root_override: Option<&std::path::Path>) -> PathBuf {
        match root_override {
            Some(root) => root.join("base").join(game_id.as_str()),
            None => self.config.layout.base_dir(game_id),
        }
    }
}

#[cfg(test)]
#[path = "download_tests.rs"]
mod tests;
