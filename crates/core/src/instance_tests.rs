// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn sample_json() -> &'static str {
    r#"{
        "name": "eu-main",
        "uuid": "8c3f9f5e-0000-4000-8000-000000000001",
        "displayName": "EU Main",
        "port": 27015,
        "maxplayers": 24,
        "rcon": "hunter2",
        "srcds_tickrate": 128,
        "csgo_startupMap": "de_dust2",
        "csgo_gameType": "0"
    }"#
}

#[test]
fn loads_instance_file_by_game_and_instance() {
    let dir = TempDir::new().unwrap();
    let game_dir = dir.path().join("csgo");
    std::fs::create_dir_all(&game_dir).unwrap();
    std::fs::write(game_dir.join("eu-main.json"), sample_json()).unwrap();

    let store = InstanceStore::new(dir.path());
    let config = store
        .lookup(
            &GameId::parse("csgo").unwrap(),
            &InstanceId::parse("eu-main").unwrap(),
        )
        .unwrap();

    assert_eq!(config.port, 27015);
    assert_eq!(config.maxplayers, 24);
    assert_eq!(config.display_name, "EU Main");
    assert!(config.cmdline_override.is_none());
}

#[test]
fn missing_instance_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = InstanceStore::new(dir.path());
    let err = store
        .lookup(
            &GameId::parse("csgo").unwrap(),
            &InstanceId::parse("nope").unwrap(),
        )
        .unwrap_err();
    assert!(matches!(err, InstanceError::NotFound { .. }));
}

#[test]
fn prefixed_params_filter_and_render() {
    let config: InstanceConfig = serde_json::from_str(sample_json()).unwrap();

    let srcds = config.prefixed_params("srcds_");
    assert_eq!(srcds, vec![("tickrate".to_string(), "128".to_string())]);

    let csgo = config.prefixed_params("csgo_");
    assert_eq!(
        csgo,
        vec![
            ("gameType".to_string(), "0".to_string()),
            ("startupMap".to_string(), "de_dust2".to_string()),
        ]
    );
}

#[test]
fn overrides_deserialize_when_present() {
    let json = r#"{
        "name": "x", "uuid": "u", "displayName": "X",
        "port": 1, "maxplayers": 2,
        "binDirOverride": "bin64",
        "binNameOverride": "srcds64",
        "cmdlineOverride": "./srcds64 -custom"
    }"#;
    let config: InstanceConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.bin_dir_override.as_deref(), Some("bin64"));
    assert_eq!(config.bin_name_override.as_deref(), Some("srcds64"));
    assert_eq!(config.cmdline_override.as_deref(), Some("./srcds64 -custom"));
}
