// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock name grammar: `<role>-<gameId>[-<instanceId>]`.
//!
//! Builders exist for every role so call sites cannot misspell a name;
//! ids are validated at construction (`GameId`/`InstanceId`), so the
//! produced names are always safe as file names.

use std::fmt;

use gsm_core::{GameId, InstanceId};

/// A well-formed lock name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockName(String);

impl LockName {
    /// Serialization of a game download in progress.
    pub fn download_game(game_id: &GameId) -> Self {
        Self(format!("downloadGame-{game_id}"))
    }

    /// Serialization of a config repo fetch for one instance.
    pub fn repo_download(instance_id: &InstanceId) -> Self {
        Self(format!("repoDownload-{instance_id}"))
    }

    pub fn config_download(instance_id: &InstanceId) -> Self {
        Self(format!("configDownload-{instance_id}"))
    }

    /// Held while the game's base layer is mounted for an instance.
    pub fn base_mount(game_id: &GameId, instance_id: &InstanceId) -> Self {
        Self(format!("baseMount-{game_id}-{instance_id}"))
    }

    /// Held while an instance's config layers are mounted.
    pub fn config_mount(game_id: &GameId, instance_id: &InstanceId) -> Self {
        Self(format!("configMount-{game_id}-{instance_id}"))
    }

    /// Held while the game process runs on the merged view.
    pub fn running(game_id: &GameId, instance_id: &InstanceId) -> Self {
        Self(format!("running-{game_id}-{instance_id}"))
    }

    pub fn global_game(game_id: &GameId) -> Self {
        Self(format!("globalGame-{game_id}"))
    }

    pub fn global_instance(game_id: &GameId, instance_id: &InstanceId) -> Self {
        Self(format!("globalInstance-{game_id}-{instance_id}"))
    }

    /// A manager module's own lock, e.g. the lifecycle coordinator's
    /// `lifecycleManager-<g>-<i>` or the overlay composer's
    /// `overlayManager-<g>-<i>`.
    pub fn module(module_ident: &str, game_id: &GameId, instance_id: &InstanceId) -> Self {
        Self(format!("{module_ident}-{game_id}-{instance_id}"))
    }

    /// Escape hatch for names read back from the lock directory.
    pub(crate) fn raw(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for LockName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Pattern matching exactly one lock name.
pub fn exact_pattern(name: &LockName) -> String {
    regex::escape(name.as_str())
}

/// Pattern matching any instance's base mount of this game
/// (`baseMount-<g>-.*`).
pub fn base_mount_pattern(game_id: &GameId) -> String {
    format!("baseMount-{}-.*", regex::escape(game_id.as_str()))
}

/// Pattern matching any game's config mount for this instance
/// (`configMount-.*-<i>`).
pub fn config_mount_pattern_for_instance(instance_id: &InstanceId) -> String {
    format!("configMount-.*-{}", regex::escape(instance_id.as_str()))
}

#[cfg(test)]
#[path = "name_tests.rs"]
mod tests;
