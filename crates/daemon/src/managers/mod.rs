// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The manager processes, one module per bus ident.

pub mod config;
pub mod download;
pub mod game;
pub mod overlay;

use gsm_bus::BusMessage;
use gsm_wire::Envelope;
use serde::de::DeserializeOwned;

/// Decode an incoming request envelope.
///
/// A payload that decodes as an envelope but not as `T` is a validation
/// failure the sender should hear about: the error carries the
/// `reply_to` when it could be recovered.
pub(crate) fn decode_request<T: DeserializeOwned>(
    message: &BusMessage,
) -> Result<Envelope<T>, (Option<String>, String)> {
    match message.decode::<Envelope<T>>() {
        Ok(envelope) => Ok(envelope),
        Err(err) => {
            let reply_to = message
                .decode::<Envelope<serde_json::Value>>()
                .ok()
                .map(|envelope| envelope.reply_to);
            Err((reply_to, format!("invalid request: {err}")))
        }
    }
}
