// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use git2::{Repository, Signature};
use tempfile::TempDir;
use tokio::sync::mpsc;
use yare::parameterized;

#[parameterized(
    ssh_style = { "git@github.com:org/config.git#live", "git@github.com:org/config.git", Some("live") },
    https_style = { "https://example.com/org/config.git#main", "https://example.com/org/config.git", Some("main") },
    no_fragment = { "https://example.com/org/config.git", "https://example.com/org/config.git", None },
    empty_fragment = { "https://example.com/org/config.git#", "https://example.com/org/config.git", None },
)]
fn repo_url_fragment_parsing(raw: &str, url: &str, branch: Option<&str>) {
    let (parsed_url, parsed_branch) = parse_repo_url(raw);
    assert_eq!(parsed_url, url);
    assert_eq!(parsed_branch.as_deref(), branch);
}

fn signature() -> Signature<'static> {
    Signature::now("gsm-test", "gsm-test@localhost").unwrap()
}

/// Create an origin repo with one commit on `main` containing `server.cfg`.
fn init_origin(dir: &std::path::Path) -> Repository {
    let repo = Repository::init(dir).unwrap();
    std::fs::write(dir.join("server.cfg"), "hostname \"gsm test\"\n").unwrap();
    {
        let mut index = repo.index().unwrap();
        index.add_path(std::path::Path::new("server.cfg")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let commit = repo
            .commit(Some("HEAD"), &signature(), &signature(), "initial config", &tree, &[])
            .unwrap();
        let commit = repo.find_commit(commit).unwrap();
        repo.branch("main", &commit, true).unwrap();
    }
    repo.set_head("refs/heads/main").unwrap();
    repo.checkout_head(None).unwrap();
    repo
}

/// Add a commit touching `path` to the origin's main branch.
fn commit_file(repo: &Repository, path: &str, contents: &str, message: &str) {
    let workdir = repo.workdir().unwrap();
    std::fs::write(workdir.join(path), contents).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(std::path::Path::new(path)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let parent = repo.head().unwrap().peel_to_commit().unwrap();
    repo.commit(Some("HEAD"), &signature(), &signature(), message, &tree, &[&parent])
        .unwrap();
}

fn spec(origin: &std::path::Path, dir: std::path::PathBuf) -> RepoSpec {
    RepoSpec {
        url: origin.display().to_string(),
        branch: "main".to_string(),
        dir,
        ssh_key: None,
    }
}

#[tokio::test]
async fn clone_checks_out_the_branch() {
    let origin_dir = TempDir::new().unwrap();
    init_origin(origin_dir.path());
    let work = TempDir::new().unwrap();
    let checkout = work.path().join("layers/live");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = RepoDriver
        .clone(
            &spec(origin_dir.path(), checkout.clone()),
            false,
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome, DriveOutcome::Completed);
    assert!(checkout.join("server.cfg").exists());
    assert!(is_checkout(&checkout));

    // Progress lines, when the transport reports them, use the
    // `git.<method> <stage> <pct>%` shape.
    while let Ok(line) = rx.try_recv() {
        assert!(line.starts_with("git.clone "), "unexpected line: {line}");
    }
}

#[tokio::test]
async fn clean_clone_replaces_existing_checkout() {
    let origin_dir = TempDir::new().unwrap();
    init_origin(origin_dir.path());
    let work = TempDir::new().unwrap();
    let checkout = work.path().join("live");
    std::fs::create_dir_all(&checkout).unwrap();
    std::fs::write(checkout.join("stale.txt"), "old").unwrap();

    let (tx, _rx) = mpsc::unbounded_channel();
    RepoDriver
        .clone(
            &spec(origin_dir.path(), checkout.clone()),
            true,
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!checkout.join("stale.txt").exists());
    assert!(checkout.join("server.cfg").exists());
}

#[tokio::test]
async fn pull_fast_forwards_to_new_commits() {
    let origin_dir = TempDir::new().unwrap();
    let origin = init_origin(origin_dir.path());
    let work = TempDir::new().unwrap();
    let checkout = work.path().join("live");

    let (tx, _rx) = mpsc::unbounded_channel();
    let spec = spec(origin_dir.path(), checkout.clone());
    RepoDriver
        .clone(&spec, false, tx, CancellationToken::new())
        .await
        .unwrap();

    commit_file(&origin, "motd.txt", "welcome\n", "add motd");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = RepoDriver
        .pull(&spec, tx, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, DriveOutcome::Completed);
    assert!(checkout.join("motd.txt").exists());

    let mut saw_ff = false;
    while let Ok(line) = rx.try_recv() {
        if line.contains("fast-forward") {
            saw_ff = true;
        }
    }
    assert!(saw_ff, "expected a fast-forward note");
}

#[tokio::test]
async fn pull_of_current_head_is_up_to_date() {
    let origin_dir = TempDir::new().unwrap();
    init_origin(origin_dir.path());
    let work = TempDir::new().unwrap();
    let checkout = work.path().join("live");

    let (tx, _rx) = mpsc::unbounded_channel();
    let spec = spec(origin_dir.path(), checkout);
    RepoDriver
        .clone(&spec, false, tx, CancellationToken::new())
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    RepoDriver
        .pull(&spec, tx, CancellationToken::new())
        .await
        .unwrap();

    let mut saw_up_to_date = false;
    while let Ok(line) = rx.try_recv() {
        if line.contains("up-to-date") {
            saw_up_to_date = true;
        }
    }
    assert!(saw_up_to_date);
}

#[tokio::test]
async fn diverged_checkout_refuses_to_pull() {
    let origin_dir = TempDir::new().unwrap();
    let origin = init_origin(origin_dir.path());
    let work = TempDir::new().unwrap();
    let checkout = work.path().join("live");

    let (tx, _rx) = mpsc::unbounded_channel();
    let spec = spec(origin_dir.path(), checkout.clone());
    RepoDriver
        .clone(&spec, false, tx, CancellationToken::new())
        .await
        .unwrap();

    // Diverge both sides.
    let local = Repository::open(&checkout).unwrap();
    commit_file(&local, "local.txt", "local\n", "local change");
    commit_file(&origin, "remote.txt", "remote\n", "remote change");

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = RepoDriver
        .pull(&spec, tx, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::Repo { .. }), "got: {err}");
}
