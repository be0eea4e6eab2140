// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gsm send <channel> <message>` — raw publish, for debugging and
//! scripting.

use crate::exit_error::ExitError;

pub async fn run(channel: &str, message: &str) -> Result<(), ExitError> {
    let bus = super::open_bus().await?;

    // JSON goes through verbatim; anything else is wrapped.
    let payload: serde_json::Value = serde_json::from_str(message)
        .unwrap_or_else(|_| serde_json::json!({ "message": message }));

    bus.publish(channel, &payload)
        .map_err(|err| ExitError::new(1, format!("publish failed: {err}")))?;
    bus.stop_watching()
        .map_err(|err| ExitError::new(1, err.to_string()))?;
    Ok(())
}
