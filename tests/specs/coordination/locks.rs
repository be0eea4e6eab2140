// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock service round trips against one shared directory.

use std::time::Duration;

use gsm_core::GameId;
use gsm_lock::{exact_pattern, LockDir, LockError, LockName};
use tempfile::TempDir;

fn lockdir(dir: &TempDir) -> LockDir {
    LockDir::open(dir.path())
        .unwrap()
        .with_poll_interval(Duration::from_millis(5))
}

#[test]
fn acquire_release_acquire() {
    let dir = TempDir::new().unwrap();
    let locks = lockdir(&dir);
    let name = LockName::download_game(&GameId::parse("csgo").unwrap());

    locks.acquire(&name).unwrap();
    locks.release(&name).unwrap();
    locks.acquire(&name).unwrap();
}

#[tokio::test]
async fn spin_acquire_succeeds_when_holder_releases_within_budget() {
    let dir = TempDir::new().unwrap();
    let locks = lockdir(&dir);
    let name = LockName::download_game(&GameId::parse("csgo").unwrap());
    locks.acquire(&name).unwrap();

    let releaser = locks.clone();
    let release_name = name.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        releaser.release(&release_name).unwrap();
    });

    locks.spin_acquire(&name, Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn spin_acquire_fails_timeout_when_never_released() {
    let dir = TempDir::new().unwrap();
    let locks = lockdir(&dir);
    let name = LockName::download_game(&GameId::parse("csgo").unwrap());
    locks.acquire(&name).unwrap();

    let err = locks
        .spin_acquire(&name, Duration::from_millis(80))
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::Timeout { .. }));
}

#[test]
fn two_lock_dirs_over_one_directory_share_state() {
    let dir = TempDir::new().unwrap();
    let a = lockdir(&dir);
    let b = lockdir(&dir);
    let name = LockName::download_game(&GameId::parse("csgo").unwrap());

    a.acquire(&name).unwrap();
    assert!(matches!(b.acquire(&name), Err(LockError::Busy { .. })));
    assert!(b.is_held(&exact_pattern(&name), false).unwrap());

    a.release(&name).unwrap();
    b.acquire(&name).unwrap();
}
