// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `configManager`: instance config checkouts from the VCS repo.

use std::path::PathBuf;
use std::time::Duration;

use gsm_bus::{spawn_ping_responder, Bus, Liveness};
use gsm_core::Layout;
use gsm_lock::{config_mount_pattern_for_instance, LockDir, LockName};
use gsm_wire::{Envelope, RepoAction, RepoDownload};
use gsm_adapters::{parse_repo_url, RepoDriver, RepoSpec};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::managers::decode_request;
use crate::supervisor::{Supervisor, TaskSpec, LOCK_TIMEOUT};
use crate::{env, DaemonError};

pub const MODULE: &str = "configManager";

/// Default branch when neither the URL fragment nor the request names one.
pub const DEFAULT_BRANCH: &str = "main";

pub struct ConfigManagerConfig {
    pub layout: Layout,
    pub ssh_key_default: Option<PathBuf>,
    /// `SERVER_CONFIG_FILES_FORCE`: clean before every clone.
    pub clean_default: bool,
    pub lock_timeout: Duration,
}

impl ConfigManagerConfig {
    pub fn from_env() -> Self {
        Self {
            layout: env::layout(),
            ssh_key_default: env::server_config_ssh_key(),
            clean_default: env::server_config_files_force(),
            lock_timeout: LOCK_TIMEOUT,
        }
    }
}

pub struct ConfigManager {
    bus: Bus,
    supervisor: Supervisor,
    config: ConfigManagerConfig,
    liveness: Liveness,
}

impl ConfigManager {
    pub fn new(bus: Bus, locks: LockDir, config: ConfigManagerConfig) -> Self {
        let liveness = Liveness::new(MODULE);
        Self {
            supervisor: Supervisor::new(bus.clone(), locks, liveness.clone()),
            bus,
            config,
            liveness,
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), DaemonError> {
        let mut fetches = self.bus.subscribe(&format!("{MODULE}.downloadUpdateRepo"))?;
        let _ping = spawn_ping_responder(self.bus.clone(), self.liveness.clone())?;
        info!(module = MODULE, "ready");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(message) = fetches.recv() => self.handle_repo_download(&message),
            }
        }
        // Shutdown: abort in-flight fetches so their locks are released,
        // then deregister.
        self.supervisor.shutdown_tasks().await;
        self.bus.unsubscribe_all()?;
        Ok(())
    }

    fn handle_repo_download(&self, message: &gsm_bus::BusMessage) {
        let envelope: Envelope<RepoDownload> = match decode_request(message) {
            Ok(envelope) => envelope,
            Err((Some(reply_to), err)) => return self.supervisor.reject(&reply_to, err),
            Err((None, err)) => return warn!(%err, "undeliverable downloadUpdateRepo"),
        };
        let req = envelope.payload;
        let reply_to = envelope.reply_to;

        if req.repo_url.is_empty() {
            return self.supervisor.reject(&reply_to, "repoUrl is required");
        }
        if req.layer_ident.is_empty() {
            return self.supervisor.reject(&reply_to, "layerIdent is required");
        }

        let (url, fragment_branch) = parse_repo_url(&req.repo_url);
        let branch = fragment_branch
            .or(req.repo_branch.clone())
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());

        let dir = match &req.root_directory {
            Some(root) => root
                .join("config")
                .join(req.game_id.as_str())
                .join(req.instance_id.as_str())
                .join(&req.layer_ident),
            None => self
                .config
                .layout
                .config_dir(&req.game_id, &req.instance_id)
                .join(&req.layer_ident),
        };

        let repo = RepoSpec {
            url,
            branch,
            dir,
            ssh_key: req.ssh_key.clone().or_else(|| self.config.ssh_key_default.clone()),
        };
        let clean = req.clean || self.config.clean_default;
        let action = req.action;

        let spec = TaskSpec::new(
            req.instance_id.as_str(),
            &reply_to,
            LockName::repo_download(&req.instance_id),
        )
        .clear_pattern(config_mount_pattern_for_instance(&req.instance_id))
        .lock_timeout(self.config.lock_timeout);

        self.supervisor.start_task(spec, move |ctx| async move {
            let driver = RepoDriver;
            match action {
                RepoAction::Clone => driver.clone(&repo, clean, ctx.output, ctx.cancel).await,
                RepoAction::Pull => driver.pull(&repo, ctx.output, ctx.cancel).await,
            }
        });
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
