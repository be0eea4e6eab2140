// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured download progress, extracted from content-tool output lines.

use serde::{Deserialize, Serialize};

/// Which phase of a download a progress line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStage {
    /// The content tool updating itself before it can serve requests.
    ToolSelfUpdate,
    /// The actual game download/validation.
    GameDownload,
}

/// One parsed progress line.
///
/// `state_hex` is only present for the game-download dialect (the tool's
/// internal state flags, e.g. `0x61`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub stage: ProgressStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_hex: Option<String>,
    pub state_name: String,
    pub percent: f64,
    pub bytes_received: u64,
    pub bytes_total: u64,
    pub raw_line: String,
}
