// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Game process launcher and supervisor.
//!
//! Assembles the server command line from manifest and instance config,
//! runs the binary on the merged view with its bin directory prepended
//! to the library search path, and streams its output. Termination is
//! SIGTERM first, SIGKILL after the grace window.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use gsm_core::{GameManifest, InstanceConfig};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::DriverError;

/// Default SIGTERM → SIGKILL grace window.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(30);

/// A fully resolved game process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameProcessSpec {
    /// The merged overlay mount point.
    pub merged_dir: PathBuf,
    /// Bin directory relative to the merged view.
    pub bin_dir: String,
    pub bin_name: String,
    pub args: Vec<String>,
}

/// How the game process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    /// Exited on its own with this code.
    Exited(i32),
    /// Terminated on request.
    Terminated,
}

/// Build the invocation from manifest + instance config.
///
/// `cmdlineOverride` replaces argument assembly wholesale (split on
/// whitespace); otherwise `srcds_*` parameters become `-key value` and
/// `csgo_*` parameters `+key value`, after the port/maxplayers/rcon
/// basics.
pub fn assemble_command(manifest: &GameManifest, instance: &InstanceConfig) -> GameProcessSpec {
    let bin_dir = instance
        .bin_dir_override
        .clone()
        .unwrap_or_else(|| manifest.bin_dir.clone());
    let bin_name = instance
        .bin_name_override
        .clone()
        .unwrap_or_else(|| manifest.bin_name.clone());

    let args = if let Some(ref cmdline) = instance.cmdline_override {
        cmdline.split_whitespace().map(str::to_string).collect()
    } else {
        let mut args = vec![
            "-port".to_string(),
            instance.port.to_string(),
            "+maxplayers".to_string(),
            instance.maxplayers.to_string(),
        ];
        if !instance.rcon.is_empty() {
            args.push("+rcon_password".to_string());
            args.push(instance.rcon.clone());
        }
        for (key, value) in instance.prefixed_params("srcds_") {
            args.push(format!("-{key}"));
            args.push(value);
        }
        for (key, value) in instance.prefixed_params("csgo_") {
            args.push(format!("+{key}"));
            args.push(value);
        }
        args
    };

    GameProcessSpec {
        merged_dir: PathBuf::new(),
        bin_dir,
        bin_name,
        args,
    }
}

/// Run the game process to exit or termination.
///
/// Stdout and stderr lines flow out on `output`; a fired `cancel` token
/// SIGTERMs the process and escalates to SIGKILL after `grace`.
pub async fn run_game(
    spec: &GameProcessSpec,
    output: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    grace: Duration,
) -> Result<GameOutcome, DriverError> {
    let bin_dir = spec.merged_dir.join(&spec.bin_dir);
    let binary = bin_dir.join(&spec.bin_name);

    let ld_path = match std::env::var("LD_LIBRARY_PATH") {
        Ok(existing) if !existing.is_empty() => format!("{}:{existing}", bin_dir.display()),
        _ => bin_dir.display().to_string(),
    };

    let mut child = tokio::process::Command::new(&binary)
        .args(&spec.args)
        .current_dir(&bin_dir)
        .env("LD_LIBRARY_PATH", ld_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DriverError::Spawn {
            tool: binary.display().to_string(),
            source,
        })?;
    info!(binary = %binary.display(), pid = child.id(), "game process started");

    let mut relays = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        relays.push(spawn_line_relay(stdout, output.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        relays.push(spawn_line_relay(stderr, output.clone()));
    }

    let pid = child.id();
    let outcome = tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|source| DriverError::Spawn {
                tool: spec.bin_name.clone(),
                source,
            })?;
            GameOutcome::Exited(status.code().unwrap_or(-1))
        }
        _ = cancel.cancelled() => {
            terminate(&mut child, pid, grace).await?;
            GameOutcome::Terminated
        }
    };

    for relay in relays {
        let _ = relay.await;
    }
    Ok(outcome)
}

/// SIGTERM, wait out the grace window, then SIGKILL.
async fn terminate(
    child: &mut tokio::process::Child,
    pid: Option<u32>,
    grace: Duration,
) -> Result<(), DriverError> {
    if let Some(pid) = pid {
        info!(pid, "terminating game process");
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(result) => {
            result.map_err(|source| DriverError::Spawn {
                tool: "game".to_string(),
                source,
            })?;
        }
        Err(_) => {
            warn!(pid, "grace window expired, sending SIGKILL");
            let _ = child.kill().await;
        }
    }
    Ok(())
}

fn spawn_line_relay(
    reader: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    output: mpsc::UnboundedSender<String>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if output.send(line).is_err() {
                break;
            }
        }
    })
}

/// Preflight: the binary must exist and be a file inside the merged view.
pub fn binary_present(spec: &GameProcessSpec) -> bool {
    binary_path(spec).is_file()
}

pub fn binary_path(spec: &GameProcessSpec) -> PathBuf {
    spec.merged_dir.join(&spec.bin_dir).join(&spec.bin_name)
}

#[cfg(test)]
#[path = "game_tests.rs"]
mod tests;
