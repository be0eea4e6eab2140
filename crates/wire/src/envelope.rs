// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The request envelope wrapping every operation payload.

use chrono::{DateTime, Utc};
use gsm_core::RequestId;
use serde::{Deserialize, Serialize};

use crate::topic::reply_topic;

/// A request as published on `<target>.<operation>`.
///
/// `reply_to` is unique per request; every follow-up for this exchange is
/// published under `<reply_to>.<sub>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<P> {
    pub request_id: RequestId,
    pub reply_to: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: P,
}

impl<P> Envelope<P> {
    /// Wrap a payload, minting a fresh request id and deriving `reply_to`
    /// from the requester's module ident.
    pub fn new(origin_module: &str, payload: P) -> Self {
        let request_id = RequestId::new();
        Self {
            reply_to: reply_topic(origin_module, &request_id),
            request_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
