// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation payloads, one per bus operation topic.
//!
//! The operation itself is named by the topic the envelope is published
//! on (`downloadManager.downloadUpdateGame`, `configManager.
//! downloadUpdateRepo`, ...), so payloads carry only their fields.

use std::path::PathBuf;

use gsm_core::{GameId, InstanceId};
use serde::{Deserialize, Serialize};

/// `downloadManager.downloadUpdateGame`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadGame {
    pub game_id: GameId,
    /// Remove and reinstall the content tool unconditionally.
    #[serde(default)]
    pub force: bool,
    /// Validate files after download.
    #[serde(default)]
    pub validate: bool,
    /// Remove the game's download directory before starting.
    #[serde(default)]
    pub server_files_force: bool,
    /// Reinstall the content tool if its binary looks unhealthy.
    #[serde(default)]
    pub steamcmd_files_force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Steam Guard two-factor is declared unsupported; a request with this
    /// set is rejected before any lock is taken.
    #[serde(default)]
    pub twofactor: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_directory: Option<PathBuf>,
}

/// `downloadManager.cancelDownload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelDownload {
    pub game_id: GameId,
    /// Also delete the partially downloaded tree.
    #[serde(default)]
    pub cleanup: bool,
}

/// `downloadManager.listDownloads`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDownloads {}

/// Repo fetch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepoAction {
    Clone,
    Pull,
}

/// `configManager.downloadUpdateRepo`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoDownload {
    pub instance_id: InstanceId,
    pub game_id: GameId,
    /// `user@host:org/repo#branch` or `https://...#branch`; the fragment
    /// overrides `repo_branch`.
    pub repo_url: String,
    /// Name of the config layer directory this checkout produces.
    pub layer_ident: String,
    pub action: RepoAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_branch: Option<String>,
    /// Remove the checkout first (clone only).
    #[serde(default)]
    pub clean: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_directory: Option<PathBuf>,
}

/// `overlayManager.setupMount`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMount {
    pub game_id: GameId,
    pub instance_id: InstanceId,
    /// Config layer idents, earlier listed = lower in the stack.
    #[serde(default)]
    pub config_layers: Vec<String>,
}

/// `overlayManager.teardownMount`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownMount {
    pub game_id: GameId,
    pub instance_id: InstanceId,
}

/// `gameManager.start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGame {
    pub game_id: GameId,
    pub instance_id: InstanceId,
}

/// `gameManager.stop`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopGame {
    pub game_id: GameId,
    pub instance_id: InstanceId,
}

/// `<module>.ping` / `_broadcast.ping`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
