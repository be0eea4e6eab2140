// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reply payloads and the client-side reply classifier.

use chrono::{DateTime, Utc};
use gsm_core::ProgressSnapshot;
use serde::{Deserialize, Serialize};

use crate::topic::sub;
use crate::WireError;

/// `<replyTo>.ack` — the request was accepted; follow `subscribe_to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub subscribe_to: String,
}

/// `<replyTo>.nack` — the request was not accepted.
///
/// With `already_requested`, `subscribe_to` points at the channel of the
/// compatible task already in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nack {
    pub reason: String,
    #[serde(default)]
    pub already_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe_to: Option<String>,
}

/// `<replyTo>.output` — one raw line of tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputLine {
    pub line: String,
}

/// `<replyTo>.error` — the exchange failed; terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReply {
    pub message: String,
}

/// Why an exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FinalReason {
    Completed,
    Canceled,
    Failed,
}

/// `<replyTo>.finalStatus` — the single terminal message of a successful
/// exchange lifecycle (including cancellation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalStatus {
    pub reason: FinalReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FinalStatus {
    pub fn completed() -> Self {
        Self {
            reason: FinalReason::Completed,
            message: None,
        }
    }

    pub fn canceled() -> Self {
        Self {
            reason: FinalReason::Canceled,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            reason: FinalReason::Failed,
            message: Some(message.into()),
        }
    }
}

/// `<replyTo>.status` — an intermediate, non-terminal status note
/// (e.g. `{status: "ackCanceled"}`, or a `listDownloads` result).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    pub status: String,
    #[serde(flatten)]
    pub detail: serde_json::Map<String, serde_json::Value>,
}

impl StatusReply {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            detail: serde_json::Map::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.detail.insert(key.into(), value);
        self
    }
}

/// One in-flight task, as reported by `listDownloads`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub key: String,
    pub state: String,
    pub subscribe_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_progress: Option<ProgressSnapshot>,
}

/// Liveness status a manager reports in pongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleStatus {
    Ready,
    Working,
    Error,
}

/// Process resource usage snapshot included in pongs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    pub rss_bytes: u64,
    pub user_time_secs: f64,
}

/// Reply to a ping, on the requester's `replyTo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pong {
    pub module_ident: String,
    pub pid: u32,
    pub uptime_secs: f64,
    pub status: ModuleStatus,
    pub resource_usage: ResourceUsage,
    pub timestamp: DateTime<Utc>,
}

/// A classified reply, as seen by a requesting client.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyEvent {
    Ack(Ack),
    Nack(Nack),
    Output(OutputLine),
    Progress(ProgressSnapshot),
    Status(StatusReply),
    Final(FinalStatus),
    Error(ErrorReply),
}

impl ReplyEvent {
    /// Terminal events close the exchange; residual progress after one is
    /// ignored by consumers.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplyEvent::Final(_) | ReplyEvent::Error(_))
    }
}

/// Decode a reply delivered on `<replyTo>.<suffix>`.
pub fn classify_reply(suffix: &str, payload: serde_json::Value) -> Result<ReplyEvent, WireError> {
    match suffix {
        sub::ACK => Ok(ReplyEvent::Ack(serde_json::from_value(payload)?)),
        sub::NACK => Ok(ReplyEvent::Nack(serde_json::from_value(payload)?)),
        sub::OUTPUT => Ok(ReplyEvent::Output(serde_json::from_value(payload)?)),
        sub::PROGRESS => Ok(ReplyEvent::Progress(serde_json::from_value(payload)?)),
        sub::STATUS => Ok(ReplyEvent::Status(serde_json::from_value(payload)?)),
        sub::FINAL_STATUS => Ok(ReplyEvent::Final(serde_json::from_value(payload)?)),
        sub::ERROR => Ok(ReplyEvent::Error(serde_json::from_value(payload)?)),
        other => Err(WireError::UnknownReplyKind(other.to_string())),
    }
}

#[cfg(test)]
#[path = "reply_tests.rs"]
mod tests;
