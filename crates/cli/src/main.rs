// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gsm` — command-line front-end for the manager processes.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod commands;
mod exit_error;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigArgs;
use commands::download::DownloadArgs;
use exit_error::ExitError;

#[derive(Parser)]
#[command(name = "gsm", version, about = "Game server manager control")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish a raw message on a bus channel
    Send { channel: String, message: String },

    /// Download or update a game's base files
    DownloadGame {
        game: String,
        /// Reinstall the content tool unconditionally
        #[arg(long)]
        force: bool,
        /// Validate files after download
        #[arg(long)]
        validate: bool,
        /// Remove the game's download directory first
        #[arg(long)]
        clean: bool,
        /// Reinstall the content tool if unhealthy
        #[arg(long)]
        steamcmd_clean: bool,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        /// Override SERVER_FILES_ROOT_DIR for this download
        #[arg(long)]
        root_directory: Option<PathBuf>,
    },

    /// List downloads in flight
    ListDownloads,

    /// Cancel a running download
    CancelDownload {
        game: String,
        /// Also remove the partial download
        #[arg(long)]
        cleanup: bool,
    },

    /// Fetch an instance's config layer from a repo
    DownloadGameConfig {
        instance_id: String,
        repo_url: String,
        layer_ident: String,
        /// Game the instance belongs to (default: $GAME_ID)
        #[arg(long)]
        game: Option<String>,
        /// Remove the checkout before cloning
        #[arg(long)]
        clean: bool,
        /// Override SERVER_FILES_ROOT_DIR for this fetch
        #[arg(long)]
        root_directory: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("gsm: {err}");
        std::process::exit(err.code);
    }
}

async fn run(cli: Cli) -> Result<(), ExitError> {
    match cli.command {
        Command::Send { channel, message } => commands::send::run(&channel, &message).await,
        Command::DownloadGame {
            game,
            force,
            validate,
            clean,
            steamcmd_clean,
            username,
            password,
            root_directory,
        } => {
            commands::download::download_game(DownloadArgs {
                game,
                force,
                validate,
                clean,
                steamcmd_clean,
                username,
                password,
                root_directory,
            })
            .await
        }
        Command::ListDownloads => commands::download::list_downloads().await,
        Command::CancelDownload { game, cleanup } => {
            commands::download::cancel_download(&game, cleanup).await
        }
        Command::DownloadGameConfig {
            instance_id,
            repo_url,
            layer_ident,
            game,
            clean,
            root_directory,
        } => {
            commands::config::download_game_config(ConfigArgs {
                instance_id,
                repo_url,
                layer_ident,
                game,
                clean,
                root_directory,
            })
            .await
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
