// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-tool driver.
//!
//! Owns the steamcmd installation, renders the directive script, runs
//! the tool on a PTY and translates its output into lines and progress.
//! The tool self-updates by exiting 42; the driver re-spawns the same
//! script for that code, a bounded number of times.

mod parse;
mod script;

pub use parse::{parse_progress, LineSplitter};
pub use script::{ScriptSpec, SteamLogin};

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::sys::signal::Signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gsm_core::ProgressSnapshot;

use crate::fetch::Fetcher;
use crate::pty::{spawn_on_pty, ActiveChildSlot};
use crate::{DriveOutcome, DriverError};

/// The tool's self-update sentinel exit code: re-spawn with the same script.
pub const SELF_UPDATE_EXIT: i32 = 42;

/// Bound on consecutive self-update restarts.
pub const MAX_SELF_UPDATE_RESTARTS: u32 = 5;

/// One game download request, already resolved against the manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSpec {
    pub install_dir: PathBuf,
    pub login: SteamLogin,
    pub app_id: String,
    pub validate: bool,
    /// Remove `install_dir` before starting.
    pub pre_clean: bool,
}

/// The steamcmd installation on this host.
#[derive(Debug, Clone)]
pub struct SteamCmd {
    tool_dir: PathBuf,
    download_url: String,
}

enum RunExit {
    Success,
    SelfUpdated,
    Canceled,
    Failed(i32),
}

impl SteamCmd {
    pub fn new(tool_dir: impl Into<PathBuf>, download_url: impl Into<String>) -> Self {
        Self {
            tool_dir: tool_dir.into(),
            download_url: download_url.into(),
        }
    }

    pub fn binary_path(&self) -> PathBuf {
        self.tool_dir.join("steamcmd.sh")
    }

    /// Install or reinstall the tool if needed.
    ///
    /// With `force`, the tool directory is removed unconditionally first;
    /// otherwise only when the binary is missing or not executable.
    pub async fn ensure_installed(
        &self,
        fetcher: &dyn Fetcher,
        force: bool,
    ) -> Result<(), DriverError> {
        if !force && self.binary_healthy() {
            return Ok(());
        }
        if self.tool_dir.exists() {
            info!(dir = %self.tool_dir.display(), force, "removing content tool for reinstall");
            std::fs::remove_dir_all(&self.tool_dir).map_err(|source| DriverError::Io {
                path: self.tool_dir.clone(),
                source,
            })?;
        }
        std::fs::create_dir_all(&self.tool_dir).map_err(|source| DriverError::Io {
            path: self.tool_dir.clone(),
            source,
        })?;
        std::fs::set_permissions(&self.tool_dir, std::fs::Permissions::from_mode(0o755)).map_err(
            |source| DriverError::Io {
                path: self.tool_dir.clone(),
                source,
            },
        )?;

        fetcher.fetch_untar(&self.download_url, &self.tool_dir).await?;

        if !self.binary_healthy() {
            return Err(DriverError::Unsupported(format!(
                "content tool tarball did not produce an executable {}",
                self.binary_path().display()
            )));
        }
        Ok(())
    }

    fn binary_healthy(&self) -> bool {
        std::fs::metadata(self.binary_path())
            .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    /// Run one download to completion, cancellation, or error.
    ///
    /// Output lines and progress snapshots flow out on the channels; a
    /// fired `cancel` token SIGTERMs the tool and yields `Canceled`.
    /// `active_child` is kept pointing at the current tool child for the
    /// process-wide exit-signal forwarder.
    pub async fn run(
        &self,
        spec: &DownloadSpec,
        output: mpsc::UnboundedSender<String>,
        progress: mpsc::UnboundedSender<ProgressSnapshot>,
        cancel: CancellationToken,
        active_child: ActiveChildSlot,
    ) -> Result<DriveOutcome, DriverError> {
        if spec.pre_clean && spec.install_dir.exists() {
            info!(dir = %spec.install_dir.display(), "pre-cleaning download directory");
            std::fs::remove_dir_all(&spec.install_dir).map_err(|source| DriverError::Io {
                path: spec.install_dir.clone(),
                source,
            })?;
        }
        std::fs::create_dir_all(&spec.install_dir).map_err(|source| DriverError::Io {
            path: spec.install_dir.clone(),
            source,
        })?;

        let script = ScriptSpec {
            install_dir: spec.install_dir.clone(),
            login: spec.login.clone(),
            app_id: spec.app_id.clone(),
            validate: spec.validate,
        };
        let script_path = self.tool_dir.join(format!("update_{}.txt", spec.app_id));
        std::fs::write(&script_path, script.render()).map_err(|source| DriverError::Io {
            path: script_path.clone(),
            source,
        })?;

        for attempt in 0..=MAX_SELF_UPDATE_RESTARTS {
            let exit = self
                .run_once(&script_path, &output, &progress, &cancel, &active_child)
                .await?;
            match exit {
                RunExit::Success => return Ok(DriveOutcome::Completed),
                RunExit::Canceled => return Ok(DriveOutcome::Canceled),
                RunExit::SelfUpdated => {
                    info!(attempt, "content tool self-updated; re-spawning same script");
                    continue;
                }
                RunExit::Failed(code) => {
                    return Err(DriverError::ToolExit {
                        tool: "steamcmd".to_string(),
                        code,
                    })
                }
            }
        }
        Err(DriverError::ToolExit {
            tool: "steamcmd".to_string(),
            code: SELF_UPDATE_EXIT,
        })
    }

    async fn run_once(
        &self,
        script_path: &Path,
        output: &mpsc::UnboundedSender<String>,
        progress: &mpsc::UnboundedSender<ProgressSnapshot>,
        cancel: &CancellationToken,
        active_child: &ActiveChildSlot,
    ) -> Result<RunExit, DriverError> {
        let args = vec![
            "+runscript".to_string(),
            script_path.display().to_string(),
        ];
        // The tool's bundled 32-bit libraries must win the library search.
        let lib_dir = self.tool_dir.join("linux32");
        let ld_path = match std::env::var("LD_LIBRARY_PATH") {
            Ok(existing) if !existing.is_empty() => {
                format!("{}:{existing}", lib_dir.display())
            }
            _ => lib_dir.display().to_string(),
        };
        let envs = vec![("LD_LIBRARY_PATH".to_string(), ld_path)];

        let mut child = spawn_on_pty(&self.binary_path(), &args, &self.tool_dir, &envs)?;
        active_child.set(child.pid());

        // Cancellation watcher: SIGTERM the tool the moment the token
        // fires, without contending with the read loop for the child.
        let pid = child.pid();
        let watcher_cancel = cancel.clone();
        let terminator = tokio::spawn(async move {
            watcher_cancel.cancelled().await;
            debug!(pid, "cancel requested; terminating content tool");
            if let Some(pid) = pid {
                let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        });

        let mut splitter = LineSplitter::new();
        let mut buf = [0u8; 4096];
        while let Some(n) = child.read_chunk(&mut buf).await? {
            for line in splitter.push(&buf[..n]) {
                emit_line(line, output, progress);
            }
        }
        if let Some(line) = splitter.finish() {
            emit_line(line, output, progress);
        }

        let status = child.child.wait().await.map_err(|source| DriverError::Spawn {
            tool: "steamcmd".to_string(),
            source,
        })?;
        active_child.set(None);
        terminator.abort();

        if cancel.is_cancelled() {
            return Ok(RunExit::Canceled);
        }
        match status.code() {
            Some(0) => Ok(RunExit::Success),
            Some(SELF_UPDATE_EXIT) => Ok(RunExit::SelfUpdated),
            Some(code) => Ok(RunExit::Failed(code)),
            // Killed by a signal we did not send.
            None => Ok(RunExit::Failed(-1)),
        }
    }
}

fn emit_line(
    line: String,
    output: &mpsc::UnboundedSender<String>,
    progress: &mpsc::UnboundedSender<ProgressSnapshot>,
) {
    if let Some(snapshot) = parse_progress(&line) {
        if progress.send(snapshot).is_err() {
            warn!("progress receiver dropped");
        }
    }
    if output.send(line).is_err() {
        warn!("output receiver dropped");
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
