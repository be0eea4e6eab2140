// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::Parser;

#[test]
fn download_game_parses_all_flags() {
    let cli = Cli::try_parse_from([
        "gsm",
        "download-game",
        "csgo",
        "--force",
        "--validate",
        "--clean",
        "--steamcmd-clean",
        "--username",
        "steamuser",
        "--password",
        "hunter2",
        "--root-directory",
        "/srv/games",
    ])
    .unwrap();

    match cli.command {
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
            assert_eq!(game, "csgo");
            assert!(force && validate && clean && steamcmd_clean);
            assert_eq!(username.as_deref(), Some("steamuser"));
            assert_eq!(password.as_deref(), Some("hunter2"));
            assert_eq!(root_directory, Some(PathBuf::from("/srv/games")));
        }
        _ => panic!("wrong subcommand"),
    }
}

#[test]
fn cancel_download_defaults_to_no_cleanup() {
    let cli = Cli::try_parse_from(["gsm", "cancel-download", "csgo"]).unwrap();
    match cli.command {
        Command::CancelDownload { game, cleanup } => {
            assert_eq!(game, "csgo");
            assert!(!cleanup);
        }
        _ => panic!("wrong subcommand"),
    }
}

#[test]
fn download_game_config_takes_positionals_in_order() {
    let cli = Cli::try_parse_from([
        "gsm",
        "download-game-config",
        "eu-main",
        "git@example.com:org/config.git#live",
        "tournament",
        "--game",
        "csgo",
        "--clean",
    ])
    .unwrap();
    match cli.command {
        Command::DownloadGameConfig {
            instance_id,
            repo_url,
            layer_ident,
            game,
            clean,
            root_directory,
        } => {
            assert_eq!(instance_id, "eu-main");
            assert_eq!(repo_url, "git@example.com:org/config.git#live");
            assert_eq!(layer_ident, "tournament");
            assert_eq!(game.as_deref(), Some("csgo"));
            assert!(clean);
            assert!(root_directory.is_none());
        }
        _ => panic!("wrong subcommand"),
    }
}

#[test]
fn send_requires_channel_and_message() {
    assert!(Cli::try_parse_from(["gsm", "send", "only-channel"]).is_err());
    let cli = Cli::try_parse_from(["gsm", "send", "_broadcast.ping", "{}"]).unwrap();
    match cli.command {
        Command::Send { channel, message } => {
            assert_eq!(channel, "_broadcast.ping");
            assert_eq!(message, "{}");
        }
        _ => panic!("wrong subcommand"),
    }
}

#[test]
fn unknown_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(["gsm", "frobnicate"]).is_err());
}
