// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Distributed mutexes over a shared lock directory.
//!
//! A lock is a file named after the lock in `<MANAGER_TMPDIR>/lock/`,
//! holding the owner's PID. Atomicity rests on the kernel's
//! exclusive-create; everything else (staleness, pattern waits) is
//! polling on top of that primitive. All operations are safe to call
//! from multiple processes against the same directory.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod name;

pub use name::{
    base_mount_pattern, config_mount_pattern_for_instance, exact_pattern, LockName,
};

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

/// Default cadence for `wait_clear` / `spin_acquire` polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lock service errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {name} is held by pid {holder}")]
    Busy { name: String, holder: u32 },

    #[error("timed out after {waited:?} waiting for {pattern}")]
    Timeout { pattern: String, waited: Duration },

    #[error("invalid lock pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("lock dir {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Handle to the shared lock directory.
#[derive(Debug, Clone)]
pub struct LockDir {
    dir: PathBuf,
    poll_interval: Duration,
}

impl LockDir {
    /// Open (and create if needed) the lock directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LockError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| LockError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Override the polling cadence (tests use a few milliseconds).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn lock_path(&self, name: &LockName) -> PathBuf {
        self.dir.join(name.as_str())
    }

    /// Take the named lock for this process.
    ///
    /// Fails `Busy` when any holder (alive or stale) has the file; stale
    /// holders are only broken on demand via [`LockDir::break_stale`].
    pub fn acquire(&self, name: &LockName) -> Result<(), LockError> {
        let path = self.lock_path(name);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                let pid = std::process::id();
                writeln!(file, "{pid}").map_err(|source| LockError::Io {
                    path: path.clone(),
                    source,
                })?;
                debug!(lock = %name, pid, "acquired");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = self.holder(name)?.unwrap_or(0);
                Err(LockError::Busy {
                    name: name.as_str().to_string(),
                    holder,
                })
            }
            Err(source) => Err(LockError::Io { path, source }),
        }
    }

    /// Release the named lock. Releasing an absent lock is a no-op.
    pub fn release(&self, name: &LockName) -> Result<(), LockError> {
        let path = self.lock_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(lock = %name, "released");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Io { path, source }),
        }
    }

    /// PID recorded in the lock file, if the lock exists.
    pub fn holder(&self, name: &LockName) -> Result<Option<u32>, LockError> {
        let path = self.lock_path(name);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(contents.trim().parse::<u32>().ok()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(LockError::Io { path, source }),
        }
    }

    /// Is any lock matching `pattern` currently held?
    ///
    /// `pattern` is a regex matched against the whole lock name. Without
    /// `stale_ok`, locks whose recorded holder is no longer alive do not
    /// count.
    pub fn is_held(&self, pattern: &str, stale_ok: bool) -> Result<bool, LockError> {
        let regex = full_match(pattern)?;
        for entry in self.entries()? {
            if !regex.is_match(&entry) {
                continue;
            }
            if stale_ok {
                return Ok(true);
            }
            let name = LockName::raw(&entry);
            match self.holder(&name)? {
                Some(pid) if pid_alive(pid) => return Ok(true),
                Some(pid) => {
                    debug!(lock = %entry, pid, "ignoring stale lock");
                }
                // Unreadable holder: treat as held, somebody owns the file.
                None => {
                    if self.lock_path(&name).exists() {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Remove the named lock if its holder is dead. Returns whether a
    /// stale lock was broken.
    pub fn break_stale(&self, name: &LockName) -> Result<bool, LockError> {
        match self.holder(name)? {
            Some(pid) if !pid_alive(pid) => {
                warn!(lock = %name, pid, "breaking stale lock");
                self.release(name)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Block until no live-held lock matches `pattern`, polling at the
    /// configured cadence, or fail `Timeout` once the budget is spent.
    pub async fn wait_clear(&self, pattern: &str, timeout: Duration) -> Result<(), LockError> {
        let started = tokio::time::Instant::now();
        loop {
            if !self.is_held(pattern, false)? {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    pattern: pattern.to_string(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Wait for the named lock to come free, then take it.
    ///
    /// Not atomic against a third party: a racing acquirer is seen as a
    /// fresh `Busy` and waiting resumes, until the budget expires. A stale
    /// holder is broken on demand here.
    pub async fn spin_acquire(&self, name: &LockName, timeout: Duration) -> Result<(), LockError> {
        let started = tokio::time::Instant::now();
        loop {
            match self.acquire(name) {
                Ok(()) => return Ok(()),
                Err(LockError::Busy { holder, .. }) => {
                    if holder != 0 && !pid_alive(holder) && self.break_stale(name)? {
                        continue;
                    }
                    if started.elapsed() >= timeout {
                        return Err(LockError::Timeout {
                            pattern: name.as_str().to_string(),
                            waited: started.elapsed(),
                        });
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn entries(&self) -> Result<Vec<String>, LockError> {
        let read = std::fs::read_dir(&self.dir).map_err(|source| LockError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let mut names = Vec::new();
        for entry in read {
            let entry = entry.map_err(|source| LockError::Io {
                path: self.dir.clone(),
                source,
            })?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

/// Anchor a user pattern so it must match the whole lock name.
fn full_match(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

/// Is the process with this PID still alive? Signal 0 probes existence;
/// EPERM still means the process exists.
pub fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
