// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Overlay mount composition.
//!
//! The merged view stacks, bottom to top: the game's read-only base
//! layer, the instance's config layers (earlier listed = lower), and
//! one writable persistence layer. Option-string assembly is pure; the
//! syscalls sit behind the `Mounter` trait so managers are testable
//! without privileges.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use tracing::{info, warn};

use crate::DriverError;

/// Inputs for one overlay mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySpec {
    pub base: PathBuf,
    /// Earlier listed = lower in the stack.
    pub config_layers: Vec<PathBuf>,
    pub persist: PathBuf,
    pub work: PathBuf,
    pub merged: PathBuf,
}

/// Render the overlayfs mount data string.
///
/// overlayfs lists `lowerdir` top-most first, so the config layers go in
/// reverse declaration order, with the base at the very bottom.
pub fn overlay_options(spec: &OverlaySpec) -> String {
    let mut lowers: Vec<String> = spec
        .config_layers
        .iter()
        .rev()
        .map(|p| p.display().to_string())
        .collect();
    lowers.push(spec.base.display().to_string());
    format!(
        "lowerdir={},upperdir={},workdir={}",
        lowers.join(":"),
        spec.persist.display(),
        spec.work.display()
    )
}

/// The mount/unmount seam.
#[async_trait]
pub trait Mounter: Send + Sync {
    async fn mount(&self, spec: &OverlaySpec) -> Result<(), DriverError>;

    /// One unmount attempt; a busy mount point is `MountBusy` with
    /// `attempts: 1` so the caller can drive the retry policy.
    async fn unmount(&self, merged: &Path) -> Result<(), DriverError>;
}

/// The real overlayfs mounter.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayMounter;

#[async_trait]
impl Mounter for OverlayMounter {
    async fn mount(&self, spec: &OverlaySpec) -> Result<(), DriverError> {
        for dir in [&spec.persist, &spec.work, &spec.merged] {
            std::fs::create_dir_all(dir).map_err(|source| DriverError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        let options = overlay_options(spec);
        info!(merged = %spec.merged.display(), %options, "mounting overlay");
        mount(
            Some("overlay"),
            &spec.merged,
            Some("overlay"),
            MsFlags::empty(),
            Some(options.as_str()),
        )
        .map_err(|source| DriverError::Mount {
            op: "mount",
            path: spec.merged.clone(),
            source,
        })
    }

    async fn unmount(&self, merged: &Path) -> Result<(), DriverError> {
        match umount2(merged, MntFlags::empty()) {
            Ok(()) => Ok(()),
            Err(nix::errno::Errno::EBUSY) => Err(DriverError::MountBusy {
                path: merged.to_path_buf(),
                attempts: 1,
            }),
            Err(source) => Err(DriverError::Mount {
                op: "unmount",
                path: merged.to_path_buf(),
                source,
            }),
        }
    }
}

/// Unmount with backoff on `EBUSY`, up to `attempts` tries.
///
/// The backoff doubles each round starting from `initial_backoff`; a
/// still-busy mount after the last try reports `MountBusy` with the
/// total attempt count.
pub async fn unmount_with_retry(
    mounter: &dyn Mounter,
    merged: &Path,
    attempts: u32,
    initial_backoff: Duration,
) -> Result<(), DriverError> {
    let mut backoff = initial_backoff;
    for attempt in 1..=attempts {
        match mounter.unmount(merged).await {
            Ok(()) => return Ok(()),
            Err(DriverError::MountBusy { .. }) if attempt < attempts => {
                warn!(merged = %merged.display(), attempt, "mount busy, retrying");
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(DriverError::MountBusy { path, .. }) => {
                return Err(DriverError::MountBusy { path, attempts })
            }
            Err(other) => return Err(other),
        }
    }
    Ok(())
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    //! An in-memory mounter for manager tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct FakeMounter {
        pub mounted: Mutex<HashMap<PathBuf, OverlaySpec>>,
        /// Next N unmount calls report `EBUSY`.
        pub busy_unmounts: Mutex<u32>,
    }

    #[async_trait]
    impl Mounter for FakeMounter {
        async fn mount(&self, spec: &OverlaySpec) -> Result<(), DriverError> {
            self.mounted.lock().insert(spec.merged.clone(), spec.clone());
            Ok(())
        }

        async fn unmount(&self, merged: &Path) -> Result<(), DriverError> {
            {
                let mut busy = self.busy_unmounts.lock();
                if *busy > 0 {
                    *busy -= 1;
                    return Err(DriverError::MountBusy {
                        path: merged.to_path_buf(),
                        attempts: 1,
                    });
                }
            }
            self.mounted.lock().remove(merged);
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "overlay_tests.rs"]
mod tests;
