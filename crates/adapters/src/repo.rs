// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config repo driver on libgit2.
//!
//! `clone` and fast-forward-only `pull`, with transfer and checkout
//! progress forwarded as formatted output lines. git2 is blocking, so
//! each operation runs on the blocking pool; the progress callbacks
//! also poll the cancellation token so a cancel aborts the transfer.

use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Cred, FetchOptions, RemoteCallbacks, Repository};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{DriveOutcome, DriverError};

/// One repo operation, resolved from the request and environment.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoSpec {
    pub url: String,
    pub branch: String,
    /// Checkout directory (the config layer directory).
    pub dir: PathBuf,
    /// SSH private key; without it only public HTTPS repos work.
    pub ssh_key: Option<PathBuf>,
}

/// Split a `...#branch` fragment off a repo URL.
///
/// Both `user@host:org/repo#branch` and `https://host/org/repo#branch`
/// carry the branch in the fragment.
pub fn parse_repo_url(raw: &str) -> (String, Option<String>) {
    match raw.split_once('#') {
        Some((url, branch)) if !branch.is_empty() => (url.to_string(), Some(branch.to_string())),
        Some((url, _)) => (url.to_string(), None),
        None => (raw.to_string(), None),
    }
}

/// The VCS client.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepoDriver;

impl RepoDriver {
    /// Clone `spec.url` into `spec.dir` and check out the branch.
    ///
    /// With `clean`, an existing checkout is removed first.
    pub async fn clone(
        &self,
        spec: &RepoSpec,
        clean: bool,
        output: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<DriveOutcome, DriverError> {
        if clean && spec.dir.exists() {
            info!(dir = %spec.dir.display(), "removing checkout before clone");
            std::fs::remove_dir_all(&spec.dir).map_err(|source| DriverError::Io {
                path: spec.dir.clone(),
                source,
            })?;
        }
        if let Some(parent) = spec.dir.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DriverError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let spec = spec.clone();
        run_blocking(cancel.clone(), move |cancel| {
            let mut builder = RepoBuilder::new();
            builder.fetch_options(fetch_options(&spec, &output, &cancel, "clone"));
            builder.with_checkout(checkout_progress(&output, "clone"));
            builder.branch(&spec.branch);
            builder.clone(&spec.url, &spec.dir)?;
            Ok(())
        })
        .await
    }

    /// Fast-forward `spec.dir` to the remote branch head.
    ///
    /// Anything that is not a fast-forward fails; the checkout is never
    /// rebased or merged.
    pub async fn pull(
        &self,
        spec: &RepoSpec,
        output: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<DriveOutcome, DriverError> {
        let spec = spec.clone();
        run_blocking(cancel.clone(), move |cancel| {
            let repo = Repository::open(&spec.dir)?;
            let mut remote = repo.find_remote("origin")?;
            remote.fetch(
                &[spec.branch.as_str()],
                Some(&mut fetch_options(&spec, &output, &cancel, "pull")),
                None,
            )?;

            let fetch_head = repo.find_reference("FETCH_HEAD")?;
            let fetched = repo.reference_to_annotated_commit(&fetch_head)?;
            let (analysis, _) = repo.merge_analysis(&[&fetched])?;

            if analysis.is_up_to_date() {
                let _ = output.send(format!("git.pull up-to-date {}", spec.branch));
            } else if analysis.is_fast_forward() {
                let refname = format!("refs/heads/{}", spec.branch);
                let mut reference = repo.find_reference(&refname)?;
                reference.set_target(fetched.id(), "fast-forward")?;
                repo.set_head(&refname)?;
                repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
                let _ = output.send(format!("git.pull fast-forward {}", spec.branch));
            } else {
                return Err(DriverError::Repo {
                    dir: spec.dir.clone(),
                    message: format!("branch {} cannot be fast-forwarded", spec.branch),
                });
            }

            // Land on the requested branch even if HEAD pointed elsewhere.
            checkout_branch(&repo, &spec.branch)?;
            Ok(())
        })
        .await
    }
}

fn checkout_branch(repo: &Repository, branch: &str) -> Result<(), git2::Error> {
    let refname = format!("refs/heads/{branch}");
    repo.set_head(&refname)?;
    repo.checkout_head(Some(CheckoutBuilder::new().force()))
}

fn fetch_options<'a>(
    spec: &RepoSpec,
    output: &mpsc::UnboundedSender<String>,
    cancel: &CancellationToken,
    method: &'static str,
) -> FetchOptions<'a> {
    let mut callbacks = RemoteCallbacks::new();

    if let Some(key) = spec.ssh_key.clone() {
        callbacks.credentials(move |_url, username_from_url, _allowed| {
            Cred::ssh_key(username_from_url.unwrap_or("git"), None, &key, None)
        });
    }

    let progress_output = output.clone();
    let progress_cancel = cancel.clone();
    let mut last_pct = u32::MAX;
    callbacks.transfer_progress(move |stats| {
        if progress_cancel.is_cancelled() {
            return false;
        }
        let total = stats.total_objects();
        if total > 0 {
            let pct = (stats.received_objects() * 100 / total) as u32;
            if pct != last_pct {
                last_pct = pct;
                let _ = progress_output.send(format!("git.{method} transfer {pct}%"));
            }
        }
        true
    });

    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

fn checkout_progress<'a>(
    output: &mpsc::UnboundedSender<String>,
    method: &'static str,
) -> CheckoutBuilder<'a> {
    let output = output.clone();
    let mut builder = CheckoutBuilder::new();
    let mut last_pct = usize::MAX;
    builder.progress(move |_path, completed, total| {
        if total > 0 {
            let pct = completed * 100 / total;
            if pct != last_pct {
                last_pct = pct;
                let _ = output.send(format!("git.{method} checkout {pct}%"));
            }
        }
    });
    builder
}

/// Run a git2 closure on the blocking pool, translating a cancel-aborted
/// transfer into `Canceled` rather than an error.
async fn run_blocking<F>(cancel: CancellationToken, work: F) -> Result<DriveOutcome, DriverError>
where
    F: FnOnce(CancellationToken) -> Result<(), DriverError> + Send + 'static,
{
    let result = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        move || work(cancel)
    })
    .await
    .map_err(|join_err| DriverError::Io {
        path: PathBuf::from("<git task>"),
        source: std::io::Error::other(join_err),
    })?;

    match result {
        Ok(()) => Ok(DriveOutcome::Completed),
        Err(DriverError::Git(err))
            if cancel.is_cancelled() && err.code() == git2::ErrorCode::User =>
        {
            Ok(DriveOutcome::Canceled)
        }
        Err(other) => Err(other),
    }
}

/// Shared helper for managers: does `dir` already hold a git checkout?
pub fn is_checkout(dir: &Path) -> bool {
    dir.join(".git").exists()
}

#[cfg(test)]
#[path = "repo_tests.rs"]
mod tests;
