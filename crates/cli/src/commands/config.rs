// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gsm download-game-config` — fetch an instance's config layer.

use std::path::PathBuf;

use gsm_adapters::repo::is_checkout;
use gsm_core::{GameId, InstanceId};
use gsm_wire::{Envelope, RepoAction, RepoDownload};

use crate::exit_error::ExitError;

pub struct ConfigArgs {
    pub instance_id: String,
    pub repo_url: String,
    pub layer_ident: String,
    /// Defaults to `GAME_ID` from the environment.
    pub game: Option<String>,
    pub clean: bool,
    pub root_directory: Option<PathBuf>,
}

pub async fn download_game_config(args: ConfigArgs) -> Result<(), ExitError> {
    let instance_id = InstanceId::parse(&args.instance_id)
        .map_err(|err| ExitError::new(2, err.to_string()))?;
    let game_id = match args.game {
        Some(raw) => GameId::parse(raw).map_err(|err| ExitError::new(2, err.to_string()))?,
        None => gsm_daemon::env::game_id().map_err(|err| {
            ExitError::new(2, format!("{err}; pass --game or set GAME_ID"))
        })?,
    };

    // Fresh layer directories are cloned, existing checkouts pulled.
    let layer_dir = match &args.root_directory {
        Some(root) => root
            .join("config")
            .join(game_id.as_str())
            .join(instance_id.as_str())
            .join(&args.layer_ident),
        None => gsm_daemon::env::layout()
            .config_dir(&game_id, &instance_id)
            .join(&args.layer_ident),
    };
    let action = if is_checkout(&layer_dir) {
        RepoAction::Pull
    } else {
        RepoAction::Clone
    };

    let bus = super::open_bus().await?;
    let envelope = Envelope::new(
        super::MODULE,
        RepoDownload {
            instance_id,
            game_id,
            repo_url: args.repo_url,
            layer_ident: args.layer_ident,
            action,
            repo_branch: None,
            clean: args.clean,
            ssh_key: None,
            root_directory: args.root_directory,
        },
    );
    let stream = gsm_bus::client::request(&bus, "configManager.downloadUpdateRepo", &envelope)
        .await
        .map_err(|err| ExitError::new(1, err.to_string()))?;

    let result = super::follow(&bus, stream).await;
    let _ = bus.stop_watching();
    result
}
