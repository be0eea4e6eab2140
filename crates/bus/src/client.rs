// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/reply client helper.
//!
//! Subscribes to the reply channel *before* publishing the request, so
//! no reply can be lost to the bus's no-durable-queue semantics.

use std::time::Duration;

use gsm_wire::{classify_reply, split_reply_suffix, Envelope, ReplyEvent};
use serde::Serialize;
use tracing::warn;

use crate::{Bus, BusError, Subscription};

/// An in-flight request: the reply subscription plus its channel prefix.
pub struct ReplyStream {
    bus: Bus,
    reply_to: String,
    pattern: String,
    sub: Subscription,
    done: bool,
}

/// Publish `payload` on `<target_topic>` and follow its replies.
pub async fn request<P: Serialize>(
    bus: &Bus,
    target_topic: &str,
    envelope: &Envelope<P>,
) -> Result<ReplyStream, BusError> {
    let pattern = format!("{}.#", envelope.reply_to);
    let sub = bus.subscribe(&pattern)?;
    bus.publish(target_topic, envelope)?;
    Ok(ReplyStream {
        bus: bus.clone(),
        reply_to: envelope.reply_to.clone(),
        pattern,
        sub,
        done: false,
    })
}

/// Re-attach to an already-running task's reply channel (after a
/// deflecting `nack` handed us its `subscribeTo`).
pub fn attach(bus: &Bus, subscribe_to: &str) -> Result<ReplyStream, BusError> {
    let pattern = format!("{subscribe_to}.#");
    let sub = bus.subscribe(&pattern)?;
    Ok(ReplyStream {
        bus: bus.clone(),
        reply_to: subscribe_to.to_string(),
        pattern,
        sub,
        done: false,
    })
}

impl ReplyStream {
    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    /// Next classified reply. Returns `None` after the terminal event
    /// (the subscription is dropped then — residual progress is ignored).
    pub async fn next(&mut self) -> Option<Result<ReplyEvent, BusError>> {
        loop {
            if self.done {
                return None;
            }
            let message = self.sub.recv().await?;
            let Some(suffix) = split_reply_suffix(&self.reply_to, &message.topic) else {
                // Bare reply_to topic (pongs) or foreign noise; skip.
                continue;
            };
            match classify_reply(suffix, message.payload) {
                Ok(event) => {
                    if event.is_terminal() {
                        self.done = true;
                        if let Err(err) = self.bus.unsubscribe(&self.pattern) {
                            warn!(%err, "unsubscribe after terminal failed");
                        }
                    }
                    return Some(Ok(event));
                }
                Err(err) => return Some(Err(err.into())),
            }
        }
    }

    /// Like [`ReplyStream::next`] with a per-event budget.
    pub async fn next_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ReplyEvent>, BusError> {
        match tokio::time::timeout(timeout, self.next()).await {
            Ok(Some(result)) => result.map(Some),
            Ok(None) => Ok(None),
            Err(_) => Err(BusError::Timeout(timeout, self.reply_to.clone())),
        }
    }
}

impl Drop for ReplyStream {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.bus.unsubscribe(&self.pattern);
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
