// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Game manifest model and lookup.
//!
//! A manifest describes a downloadable game: what tool fetches it, the
//! upstream id to fetch, and where the server binary lives inside the
//! downloaded tree. Manifests are JSON files in
//! `<SERVER_FILES_ROOT_DIR>/manifests/<gameId>.json`; `csgo` ships
//! built in so a bare host can download something.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::GameId;

/// Which external tool delivers the game's base files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadType {
    /// Steam content client (`steamcmd`).
    Steamcmd,
}

/// Immutable description of a supported game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameManifest {
    pub name: String,
    pub display_name: String,
    pub download_type: DownloadType,
    /// Upstream content id (for steamcmd: the app id passed to `app_update`).
    pub download_id: String,
    /// Directory of the server binary, relative to the download root.
    pub bin_dir: String,
    pub bin_name: String,
}

/// Manifest lookup errors
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("gameId unsupported: {0}")]
    Unsupported(GameId),

    #[error("manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Directory-backed manifest store with the built-in fallback table.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Look up a game by id.
    ///
    /// A manifest file on disk wins over the built-in table; an id found in
    /// neither is `Unsupported` (the message users see contains
    /// `gameId unsupported`).
    pub fn lookup(&self, game_id: &GameId) -> Result<GameManifest, ManifestError> {
        let path = self.dir.join(format!("{game_id}.json"));
        match std::fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| ManifestError::Parse {
                    path: path.clone(),
                    source,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                builtin(game_id).ok_or_else(|| ManifestError::Unsupported(game_id.clone()))
            }
            Err(source) => Err(ManifestError::Io { path, source }),
        }
    }
}

/// Built-in manifests for games supported out of the box.
fn builtin(game_id: &GameId) -> Option<GameManifest> {
    match game_id.as_str() {
        "csgo" => Some(GameManifest {
            name: "csgo".to_string(),
            display_name: "Counter-Strike: Global Offensive".to_string(),
            download_type: DownloadType::Steamcmd,
            download_id: "740".to_string(),
            bin_dir: ".".to_string(),
            bin_name: "srcds_run".to_string(),
        }),
        _ => None,
    }
}

/// Write a manifest to its canonical path (fixture helper for tests and
/// operator tooling).
pub fn write_manifest(dir: &Path, manifest: &GameManifest) -> Result<PathBuf, ManifestError> {
    let path = dir.join(format!("{}.json", manifest.name));
    std::fs::create_dir_all(dir).map_err(|source| ManifestError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let bytes = serde_json::to_vec_pretty(manifest).map_err(|source| ManifestError::Parse {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&path, bytes).map_err(|source| ManifestError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
