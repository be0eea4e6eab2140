// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dotted topic grammar and wildcard matching.
//!
//! Topics are dotted strings (`downloadManager.downloadUpdateGame`,
//! `cli.<uuid>.progress`). Subscription patterns may use `*` to match
//! exactly one segment and a trailing `#` to match any remainder,
//! including an empty one.

use gsm_core::RequestId;

/// Broadcast liveness topic every manager answers on.
pub const BROADCAST_PING: &str = "_broadcast.ping";

/// Reply sub-topic names, published under `<replyTo>.<sub>`.
pub mod sub {
    pub const ACK: &str = "ack";
    pub const NACK: &str = "nack";
    pub const ERROR: &str = "error";
    pub const PROGRESS: &str = "progress";
    pub const OUTPUT: &str = "output";
    pub const STATUS: &str = "status";
    pub const FINAL_STATUS: &str = "finalStatus";
}

/// Does `pattern` match `topic`?
///
/// Matching is segment-wise on `.`. `*` consumes exactly one segment; a
/// trailing `#` consumes the rest (zero or more segments). `#` anywhere
/// but the final position never matches.
pub fn matches(pattern: &str, topic: &str) -> bool {
    let mut pat = pattern.split('.');
    let mut top = topic.split('.');

    loop {
        match (pat.next(), top.next()) {
            (Some("#"), _) => return pat.next().is_none(),
            (Some(p), Some(t)) => {
                if p != "*" && p != t {
                    return false;
                }
            }
            (Some(p), None) => return p == "#" && pat.next().is_none(),
            (None, Some(_)) => return false,
            (None, None) => return true,
        }
    }
}

/// The reply-topic prefix for one request: `<module>.<requestId>`.
pub fn reply_topic(module_ident: &str, request_id: &RequestId) -> String {
    format!("{module_ident}.{request_id}")
}

/// A follow-up topic under a reply prefix: `<replyTo>.<sub>`.
pub fn reply_sub(reply_to: &str, sub: &str) -> String {
    format!("{reply_to}.{sub}")
}

/// A manager's own ping topic.
pub fn ping_topic(module_ident: &str) -> String {
    format!("{module_ident}.ping")
}

/// Strip `<replyTo>.` off a delivered topic, returning the sub-topic name.
pub fn split_reply_suffix<'a>(reply_to: &str, topic: &'a str) -> Option<&'a str> {
    topic
        .strip_prefix(reply_to)
        .and_then(|rest| rest.strip_prefix('.'))
}

#[cfg(test)]
#[path = "topic_tests.rs"]
mod tests;
