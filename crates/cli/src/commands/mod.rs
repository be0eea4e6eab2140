// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod config;
pub mod download;
pub mod send;

use gsm_bus::{Bus, ReplyStream};
use gsm_wire::{FinalReason, ReplyEvent};

use crate::exit_error::ExitError;
use crate::output::print_event;

/// The CLI's bus ident; reply channels are `cli.<uuid>`.
pub const MODULE: &str = "cli";

/// Open the bus under the host layout.
pub async fn open_bus() -> Result<Bus, ExitError> {
    let layout = gsm_daemon::env::layout();
    Bus::open(layout.ipc_dir(), MODULE)
        .await
        .map_err(|err| ExitError::new(1, format!("bus unavailable: {err}")))
}

/// Follow a reply stream to its terminal event, printing as we go.
///
/// A deflecting `nack` re-attaches to the running task's channel. The
/// exit code is 0 for `completed`/`canceled`, 1 for anything else.
pub async fn follow(bus: &Bus, mut stream: ReplyStream) -> Result<(), ExitError> {
    loop {
        let Some(event) = stream.next().await else {
            return Err(ExitError::new(1, "reply channel closed"));
        };
        let event = event.map_err(|err| ExitError::new(1, err.to_string()))?;
        print_event(&event);
        match event {
            ReplyEvent::Nack(nack) => {
                return match nack.subscribe_to {
                    Some(channel) if nack.already_requested => {
                        let attached = gsm_bus::client::attach(bus, &channel)
                            .map_err(|err| ExitError::new(1, err.to_string()))?;
                        Box::pin(follow(bus, attached)).await
                    }
                    _ => Err(ExitError::new(1, format!("rejected: {}", nack.reason))),
                }
            }
            ReplyEvent::Final(final_status) => {
                return match final_status.reason {
                    FinalReason::Completed | FinalReason::Canceled => Ok(()),
                    FinalReason::Failed => Err(ExitError::new(
                        1,
                        final_status.message.unwrap_or_else(|| "failed".to_string()),
                    )),
                }
            }
            ReplyEvent::Error(err) => return Err(ExitError::new(1, err.message)),
            _ => {}
        }
    }
}
