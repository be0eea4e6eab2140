// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The gsm manager processes: the generic task supervisor, the four
//! managers (`downloadManager`, `configManager`, `overlayManager`,
//! `gameManager`) and the lifecycle coordinator that sequences them.
//!
//! Each manager is one long-lived process (`gsmd <module>`) whose only
//! shared state with its peers is the lock directory and the bus.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod env;
pub mod lifecycle;
pub mod managers;
pub mod signals;
pub mod supervisor;

use std::path::PathBuf;

use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Bus(#[from] gsm_bus::BusError),

    #[error(transparent)]
    Lock(#[from] gsm_lock::LockError),

    #[error(transparent)]
    Driver(#[from] gsm_adapters::DriverError),

    #[error(transparent)]
    Manifest(#[from] gsm_core::ManifestError),

    #[error(transparent)]
    Instance(#[from] gsm_core::InstanceError),

    #[error(transparent)]
    Id(#[from] gsm_core::IdError),

    #[error("required environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
