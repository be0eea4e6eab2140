// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line splitting and progress extraction for steamcmd output.
//!
//! The tool writes `\r\n`-terminated lines interleaved with stray empty
//! lines and bare `\r` refreshes, and speaks two distinct progress
//! dialects: its own self-update and the actual game download.

use std::sync::LazyLock;

use gsm_core::{ProgressSnapshot, ProgressStage};
use regex::Regex;

// Allow expect here as the regexes are compile-time verified to be valid
#[allow(clippy::expect_used)]
static SELF_UPDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\s{0,2}(\d+)%\] (\w+).*\((\d+) of (\d+).*$")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static GAME_DOWNLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ Update state \((0x[0-9a-f]+)\) ([\w ]*), progress: (\d+\.\d+) \((\d+) / (\d+)\)$")
        .expect("constant regex pattern is valid")
});

/// Incremental splitter over the raw PTY byte stream.
///
/// Splits on `\r` and `\n` in any combination and swallows the empty
/// lines the tool sprinkles in.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: String,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the complete non-empty lines it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find(['\r', '\n']) {
            let line = self.buf[..pos].to_string();
            self.buf.drain(..=pos);
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left after EOF, if non-empty.
    pub fn finish(self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf)
        }
    }
}

/// Try both progress dialects on one line.
pub fn parse_progress(line: &str) -> Option<ProgressSnapshot> {
    if let Some(caps) = SELF_UPDATE.captures(line) {
        return Some(ProgressSnapshot {
            stage: ProgressStage::ToolSelfUpdate,
            state_hex: None,
            state_name: caps[2].to_string(),
            percent: caps[1].parse().ok()?,
            bytes_received: caps[3].parse().ok()?,
            bytes_total: caps[4].parse().ok()?,
            raw_line: line.to_string(),
        });
    }
    if let Some(caps) = GAME_DOWNLOAD.captures(line) {
        return Some(ProgressSnapshot {
            stage: ProgressStage::GameDownload,
            state_hex: Some(caps[1].to_string()),
            state_name: caps[2].trim().to_string(),
            percent: caps[3].parse().ok()?,
            bytes_received: caps[4].parse().ok()?,
            bytes_total: caps[5].parse().ok()?,
            raw_line: line.to_string(),
        });
    }
    None
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
