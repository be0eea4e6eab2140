// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus round trips between separate bus handles.

use std::time::Duration;

use gsm_bus::Bus;
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn identical_payload_arrives_for_matching_subscriber() {
    let dir = TempDir::new().unwrap();
    let publisher = Bus::open(dir.path(), "downloadManager").await.unwrap();
    let subscriber = Bus::open(dir.path(), "cli").await.unwrap();

    let mut sub = subscriber.subscribe("cli.42.progress").unwrap();
    let payload = json!({
        "stage": "game-download",
        "percent": 12.5,
        "bytesReceived": 125,
        "bytesTotal": 1000
    });
    publisher.publish("cli.42.progress", &payload).unwrap();

    let message = sub.recv_timeout(Duration::from_secs(2)).await.unwrap();
    assert_eq!(message.topic, "cli.42.progress");
    assert_eq!(message.payload, payload);
}

#[tokio::test]
async fn broadcast_convention_reaches_every_manager() {
    let dir = TempDir::new().unwrap();
    let sender = Bus::open(dir.path(), "cli").await.unwrap();
    let download = Bus::open(dir.path(), "downloadManager").await.unwrap();
    let config = Bus::open(dir.path(), "configManager").await.unwrap();

    let mut download_sub = download.subscribe("_broadcast.ping").unwrap();
    let mut config_sub = config.subscribe("_broadcast.ping").unwrap();

    sender.publish("_broadcast.ping", &json!({"requestId": "x"})).unwrap();

    download_sub.recv_timeout(Duration::from_secs(2)).await.unwrap();
    config_sub.recv_timeout(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn late_subscriber_misses_earlier_messages() {
    let dir = TempDir::new().unwrap();
    let publisher = Bus::open(dir.path(), "downloadManager").await.unwrap();
    let subscriber = Bus::open(dir.path(), "cli").await.unwrap();

    publisher.publish("cli.topic", &json!({"n": 1})).unwrap();
    let mut sub = subscriber.subscribe("cli.topic").unwrap();
    publisher.publish("cli.topic", &json!({"n": 2})).unwrap();

    let message = sub.recv_timeout(Duration::from_secs(2)).await.unwrap();
    assert_eq!(message.payload["n"], 2, "the pre-subscribe message is lost");
}
