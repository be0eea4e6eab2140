// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External-process drivers: the content tool (steamcmd under a PTY),
//! the config repo (git), the overlay composer (overlayfs) and the game
//! process itself.
//!
//! Drivers never talk to the bus; they emit raw output lines and
//! structured progress on channels and honor a cancellation token. The
//! managers in `gsm-daemon` own the bus side.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod fetch;
pub mod game;
pub mod overlay;
pub mod pty;
pub mod repo;
pub mod steamcmd;

pub use fetch::{Fetcher, HttpFetcher};
pub use game::{assemble_command, run_game, GameOutcome, GameProcessSpec};
pub use overlay::{overlay_options, unmount_with_retry, Mounter, OverlayMounter, OverlaySpec};
pub use pty::ActiveChildSlot;
pub use repo::{parse_repo_url, RepoDriver, RepoSpec};
pub use steamcmd::{DownloadSpec, SteamCmd, SteamLogin, MAX_SELF_UPDATE_RESTARTS, SELF_UPDATE_EXIT};

use std::path::PathBuf;

use thiserror::Error;

/// How a driver's work ended when it did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    Completed,
    Canceled,
}

/// Driver errors
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with code {code}")]
    ToolExit { tool: String, code: i32 },

    #[error("download over HTTPS failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("git: {0}")]
    Git(#[from] git2::Error),

    #[error("repo {dir}: {message}")]
    Repo { dir: PathBuf, message: String },

    #[error("{op} {path}: {source}")]
    Mount {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: nix::Error,
    },

    #[error("mount point {path} still busy after {attempts} unmount attempts")]
    MountBusy { path: PathBuf, attempts: u32 },

    #[error("unsupported: {0}")]
    Unsupported(String),
}
