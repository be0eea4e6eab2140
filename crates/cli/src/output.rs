// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reply-stream rendering for the terminal.

use gsm_core::ProgressSnapshot;
use gsm_wire::{FinalReason, ReplyEvent};

/// One line per progress snapshot, e.g.
/// `[game-download] 64.2% downloading (6019886483/9372424940)`.
pub fn format_progress(progress: &ProgressSnapshot) -> String {
    let stage = match progress.stage {
        gsm_core::ProgressStage::ToolSelfUpdate => "tool-self-update",
        gsm_core::ProgressStage::GameDownload => "game-download",
    };
    format!(
        "[{stage}] {:.1}% {} ({}/{})",
        progress.percent, progress.state_name, progress.bytes_received, progress.bytes_total
    )
}

/// Print one event the way a terminal user wants to see it.
pub fn print_event(event: &ReplyEvent) {
    match event {
        ReplyEvent::Ack(ack) => eprintln!("accepted; following {}", ack.subscribe_to),
        ReplyEvent::Nack(nack) => match &nack.subscribe_to {
            Some(channel) if nack.already_requested => {
                eprintln!("already in flight; following {channel}")
            }
            _ => eprintln!("rejected: {}", nack.reason),
        },
        ReplyEvent::Output(out) => println!("{}", out.line),
        ReplyEvent::Progress(progress) => eprintln!("{}", format_progress(progress)),
        ReplyEvent::Status(status) => eprintln!("status: {}", status.status),
        ReplyEvent::Final(final_status) => match final_status.reason {
            FinalReason::Completed => eprintln!("done"),
            FinalReason::Canceled => eprintln!("canceled"),
            FinalReason::Failed => eprintln!(
                "failed{}",
                final_status
                    .message
                    .as_deref()
                    .map(|m| format!(": {m}"))
                    .unwrap_or_default()
            ),
        },
        ReplyEvent::Error(err) => eprintln!("error: {}", err.message),
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
