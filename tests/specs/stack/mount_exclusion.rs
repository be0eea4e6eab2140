// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutual exclusion between downloads and mounts, across managers.

use std::time::Duration;

use gsm_bus::{Bus, Subscription};
use gsm_wire::{DownloadGame, Envelope, ReplyEvent, SetupMount};

use super::{boot, game_id, instance_id};

const BUDGET: Duration = Duration::from_secs(10);

async fn next_event(sub: &mut Subscription, reply_to: &str) -> ReplyEvent {
    loop {
        let message = sub.recv_timeout(BUDGET).await.unwrap();
        if let Some(suffix) = gsm_wire::split_reply_suffix(reply_to, &message.topic) {
            return gsm_wire::classify_reply(suffix, message.payload).unwrap();
        }
    }
}

/// A download in flight holds `downloadGame-<g>`; a mount attempt during
/// it must not proceed (the base layer is being written).
#[tokio::test]
async fn mount_is_refused_while_a_download_runs() {
    let stack = boot("exec sleep 8", "exit 0").await;
    // The mount precondition needs an existing base dir to pass
    // validation and reach the lock wait.
    std::fs::create_dir_all(stack.layout.base_dir(&game_id())).unwrap();

    let client = Bus::open(stack.layout.ipc_dir(), "cli").await.unwrap();

    // Start the long download.
    let download = Envelope::new(
        "cli",
        DownloadGame {
            game_id: game_id(),
            force: false,
            validate: false,
            server_files_force: false,
            steamcmd_files_force: false,
            username: None,
            password: None,
            twofactor: false,
            root_directory: None,
        },
    );
    let mut download_sub = client.subscribe(&format!("{}.#", download.reply_to)).unwrap();
    client
        .publish("downloadManager.downloadUpdateGame", &download)
        .unwrap();
    loop {
        if let ReplyEvent::Ack(_) = next_event(&mut download_sub, &download.reply_to).await {
            break;
        }
    }

    // Now try to mount the same game.
    let mount = Envelope::new(
        "cli",
        SetupMount {
            game_id: game_id(),
            instance_id: instance_id(),
            config_layers: vec![],
        },
    );
    let mut mount_sub = client.subscribe(&format!("{}.#", mount.reply_to)).unwrap();
    client.publish("overlayManager.setupMount", &mount).unwrap();

    loop {
        match next_event(&mut mount_sub, &mount.reply_to).await {
            ReplyEvent::Error(err) => {
                assert!(err.message.contains("blocked"), "got: {}", err.message);
                break;
            }
            ReplyEvent::Ack(_) => panic!("mount must not be accepted during a download"),
            _ => continue,
        }
    }

    // The invariant held: no mount lock appeared while the download lock
    // was held.
    assert!(stack.locks.is_held("downloadGame-csgo", false).unwrap());
    assert!(!stack.locks.is_held("baseMount-csgo-.*", true).unwrap());
    stack.shutdown.cancel();
}
