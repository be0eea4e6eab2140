// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The whole sequence: download base → fetch config → mount → run game.

use std::time::Duration;

use gsm_bus::Bus;
use gsm_daemon::lifecycle::{self, exit_code, LifecycleConfig, RepoSettings};
use gsm_lock::LockDir;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::{boot, game_id, init_origin, instance_id};

/// Readiness needs uptime ≥ 5 s, so this spec inherently takes a few
/// seconds: the managers must age into readiness first.
#[tokio::test]
async fn coordinator_drives_all_four_managers_to_a_running_game() {
    let stack = boot(
        r#"printf ' Update state (0x61) downloading, progress: 100.00 (10 / 10)\r\n'
printf "Success! App '740' fully installed.\r\n"
exit 0"#,
        "echo 'VAC secure mode activated'\nexit 0",
    )
    .await;

    let origin = TempDir::new().unwrap();
    init_origin(origin.path());

    let bus = Bus::open(stack.layout.ipc_dir(), lifecycle::MODULE).await.unwrap();
    let config = LifecycleConfig {
        game_id: game_id(),
        instance_id: instance_id(),
        layout: stack.layout.clone(),
        repo: Some(RepoSettings {
            url: format!("{}#main", origin.path().display()),
            layer_ident: "live".to_string(),
        }),
        download_ready_timeout: Duration::from_secs(20),
        ready_timeout: Duration::from_secs(15),
        shutdown: CancellationToken::new(),
    };

    let code = lifecycle::run(&bus, &stack.locks, config).await;
    assert_eq!(code, exit_code::OK, "full sequence should succeed");

    // Base files were downloaded (the driver created the base dir).
    assert!(stack.layout.base_dir(&game_id()).is_dir());

    // The config layer was cloned where the overlay expects it.
    let layer = stack
        .layout
        .config_dir(&game_id(), &instance_id())
        .join("live");
    assert!(layer.join("server.cfg").exists());

    // The overlay was mounted with base below the config layer.
    {
        let mounted = stack.mounter.mounted.lock();
        let spec = mounted
            .get(&stack.layout.merged_dir(&game_id(), &instance_id()))
            .expect("overlay mounted");
        assert_eq!(spec.base, stack.layout.base_dir(&game_id()));
        assert_eq!(spec.config_layers, vec![layer]);
    }

    // Lock postconditions: the mount pair stays held for the mount's
    // lifetime; the transient locks are all gone.
    assert!(stack.locks.is_held("baseMount-csgo-eu-main", false).unwrap());
    assert!(stack.locks.is_held("configMount-csgo-eu-main", false).unwrap());
    assert!(!stack.locks.is_held("downloadGame-csgo", true).unwrap());
    assert!(!stack.locks.is_held("repoDownload-eu-main", true).unwrap());
    assert!(!stack.locks.is_held("running-csgo-eu-main", true).unwrap());
    assert!(!stack.locks.is_held("lifecycleManager-csgo-eu-main", true).unwrap());

    stack.shutdown.cancel();
}

#[tokio::test]
async fn coordinator_without_managers_times_out_with_code_2() {
    let dir = TempDir::new().unwrap();
    let layout = gsm_core::Layout::new(dir.path().join("tmp"), dir.path().join("files"));
    let bus = Bus::open(layout.ipc_dir(), lifecycle::MODULE).await.unwrap();
    let locks = LockDir::open(layout.lock_dir()).unwrap();

    let config = LifecycleConfig {
        game_id: game_id(),
        instance_id: instance_id(),
        layout,
        repo: None,
        download_ready_timeout: Duration::from_millis(400),
        ready_timeout: Duration::from_millis(400),
        shutdown: CancellationToken::new(),
    };

    let started = std::time::Instant::now();
    let code = lifecycle::run(&bus, &locks, config).await;
    assert_eq!(code, exit_code::READY_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(60));
}
