// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The lifecycle coordinator: download base → fetch config → mount
//! overlay → start game, each step driven over the bus and mapped to a
//! distinct exit code on failure.

use std::time::Duration;

use gsm_adapters::repo::is_checkout;
use gsm_bus::{client, wait_for_module, Bus};
use gsm_core::{GameId, InstanceId, Layout};
use gsm_lock::{LockDir, LockError, LockName};
use gsm_wire::{
    DownloadGame, Envelope, FinalReason, Nack, RepoAction, RepoDownload, ReplyEvent, SetupMount,
    StartGame, StopGame,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{env, DaemonError};

pub const MODULE: &str = "lifecycleManager";

/// Coordinator exit codes.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const SELF_LOCK: i32 = 1;
    pub const READY_TIMEOUT: i32 = 2;
    pub const DOWNLOAD_FAILED: i32 = 3;
    pub const CONFIG_FAILED: i32 = 4;
    pub const MOUNT_FAILED: i32 = 5;
    pub const ALREADY_MOUNTED: i32 = 6;
}

/// Readiness budget for `downloadManager` at startup; the tool may still
/// be bootstrapping.
pub const DOWNLOAD_READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Readiness budget for every other module.
pub const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Config repo source for this instance.
#[derive(Debug, Clone)]
pub struct RepoSettings {
    /// `user@host:org/repo#branch` or `https://...#branch`.
    pub url: String,
    /// The config layer directory this checkout fills.
    pub layer_ident: String,
}

/// Everything the coordinator needs to drive one instance.
pub struct LifecycleConfig {
    pub game_id: GameId,
    pub instance_id: InstanceId,
    pub layout: Layout,
    pub repo: Option<RepoSettings>,
    pub download_ready_timeout: Duration,
    pub ready_timeout: Duration,
    pub shutdown: CancellationToken,
}

impl LifecycleConfig {
    pub fn from_env(shutdown: CancellationToken) -> Result<Self, DaemonError> {
        Ok(Self {
            game_id: env::game_id()?,
            instance_id: env::instance_id()?,
            layout: env::layout(),
            repo: env::server_config_repo().map(|url| RepoSettings {
                url,
                layer_ident: "default".to_string(),
            }),
            download_ready_timeout: DOWNLOAD_READY_TIMEOUT,
            ready_timeout: READY_TIMEOUT,
            shutdown,
        })
    }
}

enum StepResult {
    Completed,
    Failed(String),
    Nacked(Nack),
    Shutdown,
}

/// Run the coordinator to completion; returns the process exit code.
pub async fn run(bus: &Bus, locks: &LockDir, config: LifecycleConfig) -> i32 {
    let self_lock = LockName::module(MODULE, &config.game_id, &config.instance_id);
    if let Err(err) = acquire_self_lock(locks, &self_lock) {
        error!(%err, "could not take the coordinator lock");
        return exit_code::SELF_LOCK;
    }

    let code = drive_sequence(bus, &config).await;

    if let Err(err) = locks.release(&self_lock) {
        warn!(%err, "coordinator lock release failed");
    }
    code
}

/// One stale coordinator from a crashed run may be reclaimed; a live one
/// means another coordinator owns this instance.
fn acquire_self_lock(locks: &LockDir, name: &LockName) -> Result<(), LockError> {
    match locks.acquire(name) {
        Ok(()) => Ok(()),
        Err(LockError::Busy { .. }) => {
            if locks.break_stale(name)? {
                locks.acquire(name)
            } else {
                Err(LockError::Busy {
                    name: name.as_str().to_string(),
                    holder: locks.holder(name)?.unwrap_or(0),
                })
            }
        }
        Err(other) => Err(other),
    }
}

async fn drive_sequence(bus: &Bus, config: &LifecycleConfig) -> i32 {
    // 1. Base files.
    if let Err(code) = ready(bus, "downloadManager", config.download_ready_timeout).await {
        return code;
    }
    let download = Envelope::new(
        MODULE,
        DownloadGame {
            game_id: config.game_id.clone(),
            force: false,
            validate: false,
            server_files_force: false,
            steamcmd_files_force: false,
            username: None,
            password: None,
            twofactor: false,
            root_directory: None,
        },
    );
    info!(game = %config.game_id, "requesting base download");
    match drive(bus, "downloadManager.downloadUpdateGame", &download, &config.shutdown).await {
        StepResult::Completed => {}
        StepResult::Shutdown => {
            cancel_download(bus, config).await;
            return exit_code::OK;
        }
        StepResult::Failed(reason) => {
            error!(%reason, "base download failed");
            return exit_code::DOWNLOAD_FAILED;
        }
        StepResult::Nacked(nack) => {
            error!(reason = %nack.reason, "base download rejected");
            return exit_code::DOWNLOAD_FAILED;
        }
    }

    // 2. Instance config.
    let mut config_layers = Vec::new();
    if let Some(repo) = &config.repo {
        if let Err(code) = ready(bus, "configManager", config.ready_timeout).await {
            return code;
        }
        let layer_dir = config
            .layout
            .config_dir(&config.game_id, &config.instance_id)
            .join(&repo.layer_ident);
        let action = if is_checkout(&layer_dir) {
            RepoAction::Pull
        } else {
            RepoAction::Clone
        };
        let fetch = Envelope::new(
            MODULE,
            RepoDownload {
                instance_id: config.instance_id.clone(),
                game_id: config.game_id.clone(),
                repo_url: repo.url.clone(),
                layer_ident: repo.layer_ident.clone(),
                action,
                repo_branch: None,
                clean: false,
                ssh_key: None,
                root_directory: None,
            },
        );
        info!(instance = %config.instance_id, ?action, "requesting config fetch");
        match drive(bus, "configManager.downloadUpdateRepo", &fetch, &config.shutdown).await {
            StepResult::Completed => config_layers.push(repo.layer_ident.clone()),
            StepResult::Shutdown => return exit_code::OK,
            StepResult::Failed(reason) => {
                error!(%reason, "config fetch failed");
                return exit_code::CONFIG_FAILED;
            }
            StepResult::Nacked(nack) => {
                error!(reason = %nack.reason, "config fetch rejected");
                return exit_code::CONFIG_FAILED;
            }
        }
    }

    // 3. Merged view.
    if let Err(code) = ready(bus, "overlayManager", config.ready_timeout).await {
        return code;
    }
    let mount = Envelope::new(
        MODULE,
        SetupMount {
            game_id: config.game_id.clone(),
            instance_id: config.instance_id.clone(),
            config_layers,
        },
    );
    info!(instance = %config.instance_id, "requesting overlay mount");
    match drive(bus, "overlayManager.setupMount", &mount, &config.shutdown).await {
        StepResult::Completed => {}
        StepResult::Shutdown => return exit_code::OK,
        StepResult::Failed(reason) => {
            error!(%reason, "overlay mount failed");
            return exit_code::MOUNT_FAILED;
        }
        StepResult::Nacked(nack) if nack.reason == "alreadyMounted" => {
            error!("instance is already mounted");
            return exit_code::ALREADY_MOUNTED;
        }
        StepResult::Nacked(nack) => {
            error!(reason = %nack.reason, "overlay mount rejected");
            return exit_code::MOUNT_FAILED;
        }
    }

    // 4. The game itself; retained until it exits or we are told to stop.
    if let Err(code) = ready(bus, "gameManager", config.ready_timeout).await {
        return code;
    }
    let start = Envelope::new(
        MODULE,
        StartGame {
            game_id: config.game_id.clone(),
            instance_id: config.instance_id.clone(),
        },
    );
    info!(instance = %config.instance_id, "starting game");
    match drive(bus, "gameManager.start", &start, &config.shutdown).await {
        StepResult::Completed => exit_code::OK,
        StepResult::Shutdown => {
            stop_game(bus, config).await;
            exit_code::OK
        }
        StepResult::Failed(reason) => {
            error!(%reason, "game ended abnormally");
            exit_code::SELF_LOCK
        }
        StepResult::Nacked(nack) => {
            error!(reason = %nack.reason, "game start rejected");
            exit_code::SELF_LOCK
        }
    }
}

async fn ready(bus: &Bus, target: &str, timeout: Duration) -> Result<(), i32> {
    match wait_for_module(bus, MODULE, target, timeout).await {
        Ok(pong) => {
            info!(module = target, uptime = pong.uptime_secs, "module ready");
            Ok(())
        }
        Err(err) => {
            error!(module = target, %err, "module never became ready");
            Err(exit_code::READY_TIMEOUT)
        }
    }
}

/// Issue one request and follow its reply channel to the terminal event.
async fn drive<P: Serialize>(
    bus: &Bus,
    topic: &str,
    envelope: &Envelope<P>,
    shutdown: &CancellationToken,
) -> StepResult {
    let mut stream = match client::request(bus, topic, envelope).await {
        Ok(stream) => stream,
        Err(err) => return StepResult::Failed(err.to_string()),
    };

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => return StepResult::Shutdown,
            event = stream.next() => event,
        };
        match event {
            None => return StepResult::Failed("reply channel closed".to_string()),
            Some(Err(err)) => return StepResult::Failed(err.to_string()),
            Some(Ok(ReplyEvent::Ack(_))) => {}
            Some(Ok(ReplyEvent::Output(line))) => info!(target: "gsm::task", "{}", line.line),
            Some(Ok(ReplyEvent::Progress(progress))) => {
                info!(target: "gsm::task", stage = ?progress.stage, percent = progress.percent, "progress");
            }
            Some(Ok(ReplyEvent::Status(_))) => {}
            Some(Ok(ReplyEvent::Nack(nack))) => return StepResult::Nacked(nack),
            Some(Ok(ReplyEvent::Final(final_status))) => {
                return match final_status.reason {
                    FinalReason::Completed | FinalReason::Canceled => StepResult::Completed,
                    FinalReason::Failed => StepResult::Failed(
                        final_status.message.unwrap_or_else(|| "failed".to_string()),
                    ),
                }
            }
            Some(Ok(ReplyEvent::Error(err))) => return StepResult::Failed(err.message),
        }
    }
}

/// Best-effort cancel of an in-flight download on coordinator shutdown.
async fn cancel_download(bus: &Bus, config: &LifecycleConfig) {
    let cancel = Envelope::new(
        MODULE,
        gsm_wire::CancelDownload {
            game_id: config.game_id.clone(),
            cleanup: false,
        },
    );
    let Ok(mut stream) = client::request(bus, "downloadManager.cancelDownload", &cancel).await
    else {
        return;
    };
    loop {
        match stream.next_timeout(Duration::from_secs(15)).await {
            Ok(Some(event)) if event.is_terminal() => break,
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => break,
        }
    }
}

/// Best-effort stop of the game on coordinator shutdown.
async fn stop_game(bus: &Bus, config: &LifecycleConfig) {
    let stop = Envelope::new(
        MODULE,
        StopGame {
            game_id: config.game_id.clone(),
            instance_id: config.instance_id.clone(),
        },
    );
    let Ok(mut stream) = client::request(bus, "gameManager.stop", &stop).await else {
        return;
    };
    let deadline = Duration::from_secs(35);
    loop {
        match stream.next_timeout(deadline).await {
            Ok(Some(event)) if event.is_terminal() => break,
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => break,
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
