// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus protocol for manager communication.
//!
//! Everything that crosses the message bus is defined here: the request
//! envelope, per-operation request payloads, the reply family
//! (`ack`/`nack`/`progress`/`output`/`status`/`finalStatus`/`error`), the
//! ping/pong liveness payloads, and the dotted-topic grammar with its
//! wildcard matcher.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod envelope;
mod reply;
mod request;
mod topic;

pub use envelope::Envelope;
pub use reply::{
    classify_reply, Ack, ErrorReply, FinalReason, FinalStatus, ModuleStatus, Nack, OutputLine,
    Pong, ReplyEvent, ResourceUsage, StatusReply, TaskSummary,
};
pub use request::{
    CancelDownload, DownloadGame, ListDownloads, Ping, RepoAction, RepoDownload, SetupMount,
    StartGame, StopGame, TeardownMount,
};
pub use topic::{matches, ping_topic, reply_sub, reply_topic, split_reply_suffix, sub, BROADCAST_PING};

use thiserror::Error;

/// Protocol decode errors
#[derive(Debug, Error)]
pub enum WireError {
    #[error("unknown reply kind {0:?}")]
    UnknownReplyKind(String),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}
