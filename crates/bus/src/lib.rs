// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem-backed pub/sub for the managers on one host.
//!
//! The bus lives in `<MANAGER_TMPDIR>/ipc/`: each subscribing process
//! registers itself with its patterns and owns an inbox directory;
//! publishing writes the message into every matching inbox with an
//! atomic rename. There is no durable queue — a message published while
//! nobody is registered for its topic is gone, which is why requesters
//! always subscribe to their reply channel before publishing.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod bus;
pub mod client;
mod liveness;

pub use bus::{Bus, BusMessage, Subscription};
pub use client::{attach, request, ReplyStream};
pub use liveness::{
    spawn_ping_responder, wait_for_module, Liveness, PING_INTERVAL, READY_UPTIME,
};

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Bus errors
#[derive(Debug, Error)]
pub enum BusError {
    #[error("ipc dir {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed bus message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Wire(#[from] gsm_wire::WireError),

    #[error("inbox watcher: {0}")]
    Watcher(#[from] notify::Error),

    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    #[error("bus stopped")]
    Stopped,
}
