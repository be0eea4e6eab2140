// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gsm_bus::Subscription;
use gsm_core::{GameId, InstanceId};
use gsm_wire::ReplyEvent;
use std::time::Duration;
use tempfile::TempDir;

const BUDGET: Duration = Duration::from_secs(5);

struct Harness {
    _dir: TempDir,
    client: Bus,
    layout: Layout,
    shutdown: CancellationToken,
}

async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let layout = Layout::new(dir.path().join("tmp"), dir.path().join("files"));

    let bus = Bus::open(layout.ipc_dir(), MODULE).await.unwrap();
    let client = Bus::open(layout.ipc_dir(), "cli").await.unwrap();
    let locks = LockDir::open(layout.lock_dir())
        .unwrap()
        .with_poll_interval(Duration::from_millis(5));

    let config = ConfigManagerConfig {
        layout: layout.clone(),
        ssh_key_default: None,
        clean_default: false,
        lock_timeout: Duration::from_millis(500),
    };
    let manager = ConfigManager::new(bus, locks, config);
    let shutdown = CancellationToken::new();
    let run_shutdown = shutdown.clone();
    tokio::spawn(async move { manager.run(run_shutdown).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    Harness {
        _dir: dir,
        client,
        layout,
        shutdown,
    }
}

fn signature() -> git2::Signature<'static> {
    git2::Signature::now("gsm-test", "gsm-test@localhost").unwrap()
}

fn init_origin(dir: &std::path::Path) -> git2::Repository {
    let repo = git2::Repository::init(dir).unwrap();
    std::fs::write(dir.join("server.cfg"), "hostname \"config layer\"\n").unwrap();
    {
        let mut index = repo.index().unwrap();
        index.add_path(std::path::Path::new("server.cfg")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let commit = repo
            .commit(Some("HEAD"), &signature(), &signature(), "initial", &tree, &[])
            .unwrap();
        let commit = repo.find_commit(commit).unwrap();
        repo.branch("main", &commit, true).unwrap();
    }
    repo.set_head("refs/heads/main").unwrap();
    repo.checkout_head(None).unwrap();
    repo
}

async fn next_event(sub: &mut Subscription, reply_to: &str) -> ReplyEvent {
    loop {
        let message = sub.recv_timeout(BUDGET).await.unwrap();
        if let Some(suffix) = gsm_wire::split_reply_suffix(reply_to, &message.topic) {
            return gsm_wire::classify_reply(suffix, message.payload).unwrap();
        }
    }
}

fn repo_request(url: String, action: RepoAction) -> Envelope<RepoDownload> {
    Envelope::new(
        "cli",
        RepoDownload {
            instance_id: InstanceId::parse("eu-main").unwrap(),
            game_id: GameId::parse("csgo").unwrap(),
            repo_url: url,
            layer_ident: "live".to_string(),
            action,
            repo_branch: None,
            clean: false,
            ssh_key: None,
            root_directory: None,
        },
    )
}

#[tokio::test]
async fn clone_lands_in_the_instance_layer_dir() {
    let h = harness().await;
    let origin = TempDir::new().unwrap();
    init_origin(origin.path());

    let envelope = repo_request(
        format!("{}#main", origin.path().display()),
        RepoAction::Clone,
    );
    let mut sub = h.client.subscribe(&format!("{}.#", envelope.reply_to)).unwrap();
    h.client
        .publish(&format!("{MODULE}.downloadUpdateRepo"), &envelope)
        .unwrap();

    let mut completed = false;
    loop {
        match next_event(&mut sub, &envelope.reply_to).await {
            ReplyEvent::Ack(_) | ReplyEvent::Output(_) => continue,
            ReplyEvent::Final(final_status) => {
                assert_eq!(final_status.reason, gsm_wire::FinalReason::Completed);
                completed = true;
                break;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(completed);

    let layer_dir = h
        .layout
        .config_dir(
            &GameId::parse("csgo").unwrap(),
            &InstanceId::parse("eu-main").unwrap(),
        )
        .join("live");
    assert!(layer_dir.join("server.cfg").exists());
    h.shutdown.cancel();
}

#[tokio::test]
async fn missing_layer_ident_is_rejected() {
    let h = harness().await;
    let mut envelope = repo_request("https://example.com/org/repo.git".to_string(), RepoAction::Clone);
    envelope.payload.layer_ident = String::new();

    let mut sub = h.client.subscribe(&format!("{}.#", envelope.reply_to)).unwrap();
    h.client
        .publish(&format!("{MODULE}.downloadUpdateRepo"), &envelope)
        .unwrap();

    match next_event(&mut sub, &envelope.reply_to).await {
        ReplyEvent::Error(err) => assert!(err.message.contains("layerIdent"), "got: {}", err.message),
        other => panic!("expected error, got {other:?}"),
    }
    h.shutdown.cancel();
}

#[tokio::test]
async fn pull_of_unknown_checkout_fails_cleanly() {
    let h = harness().await;
    let envelope = repo_request("/nonexistent/repo".to_string(), RepoAction::Pull);

    let mut sub = h.client.subscribe(&format!("{}.#", envelope.reply_to)).unwrap();
    h.client
        .publish(&format!("{MODULE}.downloadUpdateRepo"), &envelope)
        .unwrap();

    loop {
        match next_event(&mut sub, &envelope.reply_to).await {
            ReplyEvent::Ack(_) | ReplyEvent::Output(_) => continue,
            ReplyEvent::Error(_) => break,
            other => panic!("expected error, got {other:?}"),
        }
    }
    h.shutdown.cancel();
}
