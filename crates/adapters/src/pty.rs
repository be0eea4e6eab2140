// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pseudo-terminal subprocess plumbing.
//!
//! The content tool only produces usable progress output when its stdio
//! is a terminal, so the driver allocates a PTY pair and hands the slave
//! side to the child. No controlling-terminal setup is needed — the tool
//! merely checks isatty.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use nix::pty::openpty;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::DriverError;

/// A child running on a PTY, plus the master side to read it from.
pub struct PtyChild {
    pub child: tokio::process::Child,
    master: tokio::fs::File,
}

/// Spawn `program` with `args` on a fresh PTY.
///
/// `envs` are set on top of the inherited environment; `cwd` is the
/// working directory.
pub fn spawn_on_pty(
    program: &Path,
    args: &[String],
    cwd: &Path,
    envs: &[(String, String)],
) -> Result<PtyChild, DriverError> {
    let pty = openpty(None, None).map_err(|errno| DriverError::Spawn {
        tool: program.display().to_string(),
        source: std::io::Error::from(errno),
    })?;

    let slave = std::fs::File::from(pty.slave);
    let spawn_err = |source: std::io::Error| DriverError::Spawn {
        tool: program.display().to_string(),
        source,
    };
    let stdout = slave.try_clone().map_err(spawn_err)?;
    let stderr = slave.try_clone().map_err(spawn_err)?;

    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::from(slave))
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);
    for (key, value) in envs {
        command.env(key, value);
    }

    let child = command.spawn().map_err(|source| DriverError::Spawn {
        tool: program.display().to_string(),
        source,
    })?;
    debug!(program = %program.display(), pid = child.id(), "spawned on pty");

    Ok(PtyChild {
        child,
        master: tokio::fs::File::from_std(std::fs::File::from(pty.master)),
    })
}

impl PtyChild {
    /// Read the next raw chunk from the master side.
    ///
    /// Returns `None` at EOF; Linux reports EIO on the master once the
    /// slave side closes, which is the same thing.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Option<usize>, DriverError> {
        match self.master.read(buf).await {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(n)),
            Err(err) if err.raw_os_error() == Some(nix::libc::EIO) => Ok(None),
            Err(source) => Err(DriverError::Io {
                path: std::path::PathBuf::from("<pty master>"),
                source,
            }),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Ask the child to terminate.
    pub fn signal(&self, signal: Signal) {
        if let Some(pid) = self.child.id() {
            let _ = kill(Pid::from_raw(pid as i32), signal);
        }
    }
}

/// The one child the exit-signal forwarder currently relays to.
///
/// Each driver has at most one active tool child at a time; successive
/// downloads replace the slot rather than accumulating listeners.
#[derive(Clone, Default)]
pub struct ActiveChildSlot(Arc<Mutex<Option<u32>>>);

impl ActiveChildSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active child (or clear it with `None`).
    pub fn set(&self, pid: Option<u32>) {
        *self.0.lock() = pid;
    }

    pub fn get(&self) -> Option<u32> {
        *self.0.lock()
    }

    /// Relay a signal to the active child, if any.
    pub fn forward(&self, signal: Signal) {
        if let Some(pid) = self.get() {
            debug!(pid, ?signal, "forwarding signal to active child");
            let _ = kill(Pid::from_raw(pid as i32), signal);
        }
    }
}

#[cfg(test)]
#[path = "pty_tests.rs"]
mod tests;
