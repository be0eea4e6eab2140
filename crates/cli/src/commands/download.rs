// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Download commands: `download-game`, `list-downloads`,
//! `cancel-download`.

use std::path::PathBuf;

use gsm_core::GameId;
use gsm_wire::{CancelDownload, DownloadGame, Envelope, ListDownloads};

use crate::exit_error::ExitError;

pub struct DownloadArgs {
    pub game: String,
    pub force: bool,
    pub validate: bool,
    pub clean: bool,
    pub steamcmd_clean: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub root_directory: Option<PathBuf>,
}

pub async fn download_game(args: DownloadArgs) -> Result<(), ExitError> {
    let game_id = parse_game(&args.game)?;
    let bus = super::open_bus().await?;

    let envelope = Envelope::new(
        super::MODULE,
        DownloadGame {
            game_id,
            force: args.force,
            validate: args.validate,
            server_files_force: args.clean,
            steamcmd_files_force: args.steamcmd_clean,
            username: args.username,
            password: args.password,
            twofactor: false,
            root_directory: args.root_directory,
        },
    );
    let stream = gsm_bus::client::request(&bus, "downloadManager.downloadUpdateGame", &envelope)
        .await
        .map_err(|err| ExitError::new(1, err.to_string()))?;

    let result = super::follow(&bus, stream).await;
    let _ = bus.stop_watching();
    result
}

pub async fn list_downloads() -> Result<(), ExitError> {
    let bus = super::open_bus().await?;
    let envelope = Envelope::new(super::MODULE, ListDownloads {});
    let stream = gsm_bus::client::request(&bus, "downloadManager.listDownloads", &envelope)
        .await
        .map_err(|err| ExitError::new(1, err.to_string()))?;

    let result = super::follow(&bus, stream).await;
    let _ = bus.stop_watching();
    result
}

pub async fn cancel_download(game: &str, cleanup: bool) -> Result<(), ExitError> {
    let game_id = parse_game(game)?;
    let bus = super::open_bus().await?;
    let envelope = Envelope::new(super::MODULE, CancelDownload { game_id, cleanup });
    let stream = gsm_bus::client::request(&bus, "downloadManager.cancelDownload", &envelope)
        .await
        .map_err(|err| ExitError::new(1, err.to_string()))?;

    let result = super::follow(&bus, stream).await;
    let _ = bus.stop_watching();
    result
}

fn parse_game(raw: &str) -> Result<GameId, ExitError> {
    GameId::parse(raw).map_err(|err| ExitError::new(2, err.to_string()))
}
