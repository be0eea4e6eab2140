// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance configuration: identifiers and server parameters for one
//! dedicated server. Immutable per lifecycle; changing it requires a
//! restart of the coordinator.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{GameId, InstanceId};

/// Per-instance server configuration, loaded from
/// `<SERVER_FILES_ROOT_DIR>/instances/<gameId>/<instanceId>.json`.
///
/// Keys prefixed `srcds_` / `csgo_` are engine parameters passed straight
/// through to command-line assembly; they are kept in `extra` rather than
/// modeled field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
    pub name: String,
    pub uuid: String,
    pub display_name: String,
    pub port: u16,
    pub maxplayers: u32,
    /// RCON password; empty disables remote console.
    #[serde(default)]
    pub rcon: String,
    #[serde(default)]
    pub bin_dir_override: Option<String>,
    #[serde(default)]
    pub bin_name_override: Option<String>,
    /// Full command-line override; when set, manifest-based assembly is
    /// skipped entirely.
    #[serde(default)]
    pub cmdline_override: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl InstanceConfig {
    /// Engine parameters with the given prefix (`srcds_`, `csgo_`), in key
    /// order, as `(suffix, value-as-string)` pairs.
    pub fn prefixed_params(&self, prefix: &str) -> Vec<(String, String)> {
        self.extra
            .iter()
            .filter_map(|(key, value)| {
                let suffix = key.strip_prefix(prefix)?;
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((suffix.to_string(), rendered))
            })
            .collect()
    }
}

/// Instance lookup errors
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("instance {instance_id} not found for game {game_id}")]
    NotFound {
        game_id: GameId,
        instance_id: InstanceId,
    },

    #[error("instance file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("instance file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Directory-backed instance config store.
#[derive(Debug, Clone)]
pub struct InstanceStore {
    dir: PathBuf,
}

impl InstanceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn lookup(
        &self,
        game_id: &GameId,
        instance_id: &InstanceId,
    ) -> Result<InstanceConfig, InstanceError> {
        let path = self
            .dir
            .join(game_id.as_str())
            .join(format!("{instance_id}.json"));
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| InstanceError::Parse {
                path: path.clone(),
                source,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(InstanceError::NotFound {
                game_id: game_id.clone(),
                instance_id: instance_id.clone(),
            }),
            Err(source) => Err(InstanceError::Io { path, source }),
        }
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
