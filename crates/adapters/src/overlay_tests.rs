// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::fake::FakeMounter;
use super::*;
use std::time::Duration;

fn spec() -> OverlaySpec {
    OverlaySpec {
        base: PathBuf::from("/opt/gsm/base/csgo"),
        config_layers: vec![
            PathBuf::from("/opt/gsm/config/csgo/eu-main/defaults"),
            PathBuf::from("/opt/gsm/config/csgo/eu-main/tournament"),
        ],
        persist: PathBuf::from("/opt/gsm/persist/csgo/eu-main"),
        work: PathBuf::from("/opt/gsm/workdir/csgo/eu-main"),
        merged: PathBuf::from("/opt/gsm/merged/csgo/eu-main"),
    }
}

#[test]
fn options_stack_config_over_base_with_later_layers_on_top() {
    let options = overlay_options(&spec());
    assert_eq!(
        options,
        "lowerdir=/opt/gsm/config/csgo/eu-main/tournament:/opt/gsm/config/csgo/eu-main/defaults:/opt/gsm/base/csgo,upperdir=/opt/gsm/persist/csgo/eu-main,workdir=/opt/gsm/workdir/csgo/eu-main"
    );
}

#[test]
fn options_without_config_layers_use_base_alone() {
    let mut spec = spec();
    spec.config_layers.clear();
    let options = overlay_options(&spec);
    assert!(options.starts_with("lowerdir=/opt/gsm/base/csgo,"));
}

#[tokio::test]
async fn unmount_retries_through_transient_busy() {
    let mounter = FakeMounter::default();
    let spec = spec();
    mounter.mount(&spec).await.unwrap();
    *mounter.busy_unmounts.lock() = 2;

    unmount_with_retry(&mounter, &spec.merged, 5, Duration::from_millis(1))
        .await
        .unwrap();
    assert!(mounter.mounted.lock().is_empty());
}

#[tokio::test]
async fn unmount_gives_up_after_budget() {
    let mounter = FakeMounter::default();
    let spec = spec();
    mounter.mount(&spec).await.unwrap();
    *mounter.busy_unmounts.lock() = 10;

    let err = unmount_with_retry(&mounter, &spec.merged, 3, Duration::from_millis(1))
        .await
        .unwrap_err();
    match err {
        DriverError::MountBusy { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected MountBusy, got {other}"),
    }
    assert!(!mounter.mounted.lock().is_empty());
}
