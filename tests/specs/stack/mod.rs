// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Whole-stack specs: every manager in-process over one tempdir.

mod full_lifecycle;
mod mount_exclusion;

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gsm_adapters::overlay::fake::FakeMounter;
use gsm_adapters::{fetch::fake::FakeFetcher, SteamCmd, SteamLogin};
use gsm_bus::Bus;
use gsm_core::{GameId, InstanceId, Layout};
use gsm_daemon::managers::{config, download, game, overlay};
use gsm_lock::LockDir;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub(crate) struct Stack {
    // Held for the tempdir's lifetime.
    pub _dir: TempDir,
    pub layout: Layout,
    pub locks: LockDir,
    pub mounter: Arc<FakeMounter>,
    pub shutdown: CancellationToken,
}

pub(crate) fn game_id() -> GameId {
    GameId::parse("csgo").unwrap()
}

pub(crate) fn instance_id() -> InstanceId {
    InstanceId::parse("eu-main").unwrap()
}

fn write_script(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Boot all four managers over one tempdir, with a scripted content tool
/// and a fake mounter. The merged view is pre-seeded with a fake game
/// binary (the fake mounter does not materialize files).
pub(crate) async fn boot(steamcmd_body: &str, game_body: &str) -> Stack {
    let dir = TempDir::new().unwrap();
    let layout = Layout::new(dir.path().join("tmp"), dir.path().join("files"));
    let game = game_id();
    let instance = instance_id();

    write_script(&layout.steamcmd_dir().join("steamcmd.sh"), steamcmd_body);
    write_script(
        &layout.merged_dir(&game, &instance).join("srcds_run"),
        game_body,
    );

    let instances_dir = layout.instances_dir().join(game.as_str());
    std::fs::create_dir_all(&instances_dir).unwrap();
    std::fs::write(
        instances_dir.join(format!("{instance}.json")),
        r#"{"name": "eu-main", "uuid": "u", "displayName": "EU Main",
            "port": 27015, "maxplayers": 16, "rcon": ""}"#,
    )
    .unwrap();

    let locks = LockDir::open(layout.lock_dir())
        .unwrap()
        .with_poll_interval(Duration::from_millis(10));
    let shutdown = CancellationToken::new();
    let mounter = Arc::new(FakeMounter::default());

    // downloadManager
    {
        let bus = Bus::open(layout.ipc_dir(), download::MODULE).await.unwrap();
        let manager = download::DownloadManager::new(
            bus,
            locks.clone(),
            download::DownloadManagerConfig {
                layout: layout.clone(),
                steamcmd: SteamCmd::new(layout.steamcmd_dir(), "https://example.invalid/t.tgz"),
                fetcher: Arc::new(FakeFetcher::default()),
                login: SteamLogin::Anonymous,
                twofactor_enabled: false,
                steamcmd_files_force: false,
                server_files_force: false,
                validate_default: false,
                lock_timeout: Duration::from_secs(2),
            },
        );
        let token = shutdown.clone();
        tokio::spawn(async move { manager.run(token).await });
    }

    // configManager
    {
        let bus = Bus::open(layout.ipc_dir(), config::MODULE).await.unwrap();
        let manager = config::ConfigManager::new(
            bus,
            locks.clone(),
            config::ConfigManagerConfig {
                layout: layout.clone(),
                ssh_key_default: None,
                clean_default: false,
                lock_timeout: Duration::from_secs(2),
            },
        );
        let token = shutdown.clone();
        tokio::spawn(async move { manager.run(token).await });
    }

    // overlayManager
    {
        let bus = Bus::open(layout.ipc_dir(), overlay::MODULE).await.unwrap();
        let manager = overlay::OverlayManager::new(
            bus,
            locks.clone(),
            overlay::OverlayManagerConfig {
                layout: layout.clone(),
                mounter: mounter.clone(),
                lock_timeout: Duration::from_secs(2),
            },
        );
        let token = shutdown.clone();
        tokio::spawn(async move { manager.run(token).await });
    }

    // gameManager
    {
        let bus = Bus::open(layout.ipc_dir(), game::MODULE).await.unwrap();
        let manager = game::GameManager::new(
            bus,
            locks.clone(),
            game::GameManagerConfig {
                layout: layout.clone(),
                terminate_grace: Duration::from_secs(5),
                lock_timeout: Duration::from_secs(2),
            },
        );
        let token = shutdown.clone();
        tokio::spawn(async move { manager.run(token).await });
    }

    // Subscriptions land before anyone publishes at the managers.
    tokio::time::sleep(Duration::from_millis(100)).await;

    Stack {
        _dir: dir,
        layout,
        locks,
        mounter,
        shutdown,
    }
}

/// A git origin with one commit on `main`.
pub(crate) fn init_origin(dir: &Path) {
    let repo = git2::Repository::init(dir).unwrap();
    std::fs::write(dir.join("server.cfg"), "hostname \"spec stack\"\n").unwrap();
    let sig = git2::Signature::now("gsm-spec", "spec@localhost").unwrap();
    {
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("server.cfg")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let commit = repo
            .commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();
        let commit = repo.find_commit(commit).unwrap();
        repo.branch("main", &commit, true).unwrap();
    }
    repo.set_head("refs/heads/main").unwrap();
    repo.checkout_head(None).unwrap();
}
