// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

use gsm_adapters::SteamLogin;
use gsm_core::{env_bool, env_or, GameId, InstanceId, Layout};

use crate::DaemonError;

/// Default bootstrap tarball for the content tool.
pub const DEFAULT_STEAMCMD_URL: &str =
    "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz";

/// Coordination root: `MANAGER_TMPDIR` (default `/tmp/gsm`), recommended
/// on tmpfs.
pub fn manager_tmpdir() -> PathBuf {
    PathBuf::from(env_or("MANAGER_TMPDIR", gsm_core::paths::DEFAULT_MANAGER_TMPDIR))
}

/// Heavy-files root: `SERVER_FILES_ROOT_DIR` (default `/opt/gsm`).
pub fn server_files_root() -> PathBuf {
    PathBuf::from(env_or("SERVER_FILES_ROOT_DIR", gsm_core::paths::DEFAULT_SERVER_FILES_ROOT))
}

/// The resolved directory layout for this host.
pub fn layout() -> Layout {
    Layout::new(manager_tmpdir(), server_files_root())
}

/// `GAME_ID`, required by the lifecycle coordinator.
pub fn game_id() -> Result<GameId, DaemonError> {
    let raw = std::env::var("GAME_ID").map_err(|_| DaemonError::MissingEnv("GAME_ID"))?;
    Ok(GameId::parse(raw)?)
}

/// `INSTANCE_ID`, required by the lifecycle coordinator.
pub fn instance_id() -> Result<InstanceId, DaemonError> {
    let raw = std::env::var("INSTANCE_ID").map_err(|_| DaemonError::MissingEnv("INSTANCE_ID"))?;
    Ok(InstanceId::parse(raw)?)
}

/// Steam credentials from `STEAMCMD_LOGIN_*`. Anonymous unless disabled
/// and a username/password pair is present.
pub fn steamcmd_login() -> SteamLogin {
    if env_bool("STEAMCMD_LOGIN_ANON", true) {
        return SteamLogin::Anonymous;
    }
    match (
        std::env::var("STEAMCMD_LOGIN_USERNAME"),
        std::env::var("STEAMCMD_LOGIN_PASSWORD"),
    ) {
        (Ok(username), Ok(password)) if !username.is_empty() => {
            SteamLogin::Account { username, password }
        }
        _ => SteamLogin::Anonymous,
    }
}

/// Steam Guard two-factor; declared unsupported, requests with it set are
/// rejected.
pub fn steamcmd_twofactor_enabled() -> bool {
    env_bool("STEAMCMD_TWOFACTOR_ENABLED", false)
}

pub fn steamcmd_files_force() -> bool {
    env_bool("STEAMCMD_FILES_FORCE", false)
}

pub fn server_files_force() -> bool {
    env_bool("SERVER_FILES_FORCE", false)
}

pub fn server_config_files_force() -> bool {
    env_bool("SERVER_CONFIG_FILES_FORCE", false)
}

pub fn steamcmd_initial_download_validate() -> bool {
    env_bool("STEAMCMD_INITIAL_DOWNLOAD_VALIDATE", false)
}

/// Config repo source: `SERVER_CONFIG_REPO`, `user@host:org/repo#branch`
/// or `https://...#branch`.
pub fn server_config_repo() -> Option<String> {
    std::env::var("SERVER_CONFIG_REPO").ok().filter(|s| !s.is_empty())
}

pub fn server_config_ssh_key() -> Option<PathBuf> {
    std::env::var("SERVER_CONFIG_SSH_KEY")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

/// Tool bootstrap tarball URL.
pub fn steamcmd_download_url() -> String {
    env_or("STEAMCMD_DOWNLOAD_URL", DEFAULT_STEAMCMD_URL)
}

/// Tracing filter assembled from the `DEBUG*` toggles, layered under any
/// explicit `RUST_LOG`.
pub fn log_filter() -> String {
    if let Ok(explicit) = std::env::var("RUST_LOG") {
        if !explicit.is_empty() {
            return explicit;
        }
    }
    let mut directives = vec!["info".to_string()];
    if env_bool("DEBUG", false) {
        directives.push("gsm=debug".to_string());
        directives.push("gsm_daemon=debug".to_string());
    }
    if env_bool("DEBUG_IPC", false) {
        directives.push("gsm_bus=trace".to_string());
    }
    if env_bool("DEBUG_STEAMCMD", false) {
        directives.push("gsm_adapters=debug".to_string());
    }
    if env_bool("DEBUG_LOCK", false) {
        directives.push("gsm_lock=debug".to_string());
    }
    directives.join(",")
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
