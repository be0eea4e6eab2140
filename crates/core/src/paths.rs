// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk layout, derived from the two root directories.
//!
//! `MANAGER_TMPDIR` (default `/tmp/gsm`, recommended on tmpfs) holds the
//! coordination state: lockfiles and the bus spool. `SERVER_FILES_ROOT_DIR`
//! (default `/opt/gsm`) holds everything heavy: base files, config
//! checkouts, the content tool, persistence and mount points.

use std::path::{Path, PathBuf};

use crate::id::{GameId, InstanceId};

pub const DEFAULT_MANAGER_TMPDIR: &str = "/tmp/gsm";
pub const DEFAULT_SERVER_FILES_ROOT: &str = "/opt/gsm";

/// Resolved directory layout for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    tmpdir: PathBuf,
    files_root: PathBuf,
}

impl Layout {
    pub fn new(tmpdir: impl Into<PathBuf>, files_root: impl Into<PathBuf>) -> Self {
        Self {
            tmpdir: tmpdir.into(),
            files_root: files_root.into(),
        }
    }

    /// Shared lockfile directory.
    pub fn lock_dir(&self) -> PathBuf {
        self.tmpdir.join("lock")
    }

    /// Bus spool directory.
    pub fn ipc_dir(&self) -> PathBuf {
        self.tmpdir.join("ipc")
    }

    pub fn files_root(&self) -> &Path {
        &self.files_root
    }

    /// Game-wide read-only base layer (content tool output).
    pub fn base_dir(&self, game_id: &GameId) -> PathBuf {
        self.files_root.join("base").join(game_id.as_str())
    }

    /// Instance config checkout root; one subdirectory per layer ident.
    pub fn config_dir(&self, game_id: &GameId, instance_id: &InstanceId) -> PathBuf {
        self.files_root
            .join("config")
            .join(game_id.as_str())
            .join(instance_id.as_str())
    }

    /// Content tool installation directory.
    pub fn steamcmd_dir(&self) -> PathBuf {
        self.files_root.join("steamcmd")
    }

    /// Per-instance writable persistence layer.
    pub fn persist_dir(&self, game_id: &GameId, instance_id: &InstanceId) -> PathBuf {
        self.instance_subdir("persist", game_id, instance_id)
    }

    /// Per-instance merged overlay mount point.
    pub fn merged_dir(&self, game_id: &GameId, instance_id: &InstanceId) -> PathBuf {
        self.instance_subdir("merged", game_id, instance_id)
    }

    /// Per-instance overlay scratch (the overlayfs `workdir`).
    pub fn work_dir(&self, game_id: &GameId, instance_id: &InstanceId) -> PathBuf {
        self.instance_subdir("workdir", game_id, instance_id)
    }

    /// Manifest files directory.
    pub fn manifests_dir(&self) -> PathBuf {
        self.files_root.join("manifests")
    }

    /// Instance config files directory.
    pub fn instances_dir(&self) -> PathBuf {
        self.files_root.join("instances")
    }

    fn instance_subdir(&self, kind: &str, game_id: &GameId, instance_id: &InstanceId) -> PathBuf {
        self.files_root
            .join(kind)
            .join(game_id.as_str())
            .join(instance_id.as_str())
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
