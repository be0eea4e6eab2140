// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

const RECV_BUDGET: Duration = Duration::from_secs(2);

async fn two_buses() -> (TempDir, Bus, Bus) {
    let dir = TempDir::new().unwrap();
    let a = Bus::open(dir.path(), "alpha").await.unwrap();
    let b = Bus::open(dir.path(), "beta").await.unwrap();
    (dir, a, b)
}

#[tokio::test]
async fn publish_subscribe_round_trip() {
    let (_dir, publisher, subscriber) = two_buses().await;
    let mut sub = subscriber.subscribe("games.csgo.status").unwrap();

    let payload = json!({"state": "running", "players": 12});
    publisher.publish("games.csgo.status", &payload).unwrap();

    let message = sub.recv_timeout(RECV_BUDGET).await.unwrap();
    assert_eq!(message.topic, "games.csgo.status");
    assert_eq!(message.payload, payload);
    assert_eq!(message.publisher, std::process::id());
}

#[tokio::test]
async fn wildcard_subscription_sees_matching_topics() {
    let (_dir, publisher, subscriber) = two_buses().await;
    let mut sub = subscriber.subscribe("cli.42.#").unwrap();

    publisher.publish("cli.42.progress", &json!({"p": 1})).unwrap();
    publisher.publish("cli.43.progress", &json!({"p": 2})).unwrap();
    publisher.publish("cli.42.finalStatus", &json!({"p": 3})).unwrap();

    let first = sub.recv_timeout(RECV_BUDGET).await.unwrap();
    assert_eq!(first.topic, "cli.42.progress");
    let second = sub.recv_timeout(RECV_BUDGET).await.unwrap();
    assert_eq!(second.topic, "cli.42.finalStatus");
}

#[tokio::test]
async fn delivery_is_ordered_per_publisher() {
    let (_dir, publisher, subscriber) = two_buses().await;
    let mut sub = subscriber.subscribe("seq.#").unwrap();

    for i in 0..20 {
        publisher.publish("seq.test", &json!({"i": i})).unwrap();
    }
    for i in 0..20 {
        let message = sub.recv_timeout(RECV_BUDGET).await.unwrap();
        assert_eq!(message.payload["i"], i, "out of order at {i}");
    }
}

#[tokio::test]
async fn message_without_subscriber_is_lost() {
    let (_dir, publisher, subscriber) = two_buses().await;

    publisher.publish("late.topic", &json!({"n": 1})).unwrap();
    let mut sub = subscriber.subscribe("late.topic").unwrap();
    publisher.publish("late.topic", &json!({"n": 2})).unwrap();

    // Only the message published after subscribing arrives.
    let message = sub.recv_timeout(RECV_BUDGET).await.unwrap();
    assert_eq!(message.payload["n"], 2);
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let (_dir, publisher, subscriber) = two_buses().await;
    let mut sub = subscriber.subscribe("quiet.topic").unwrap();

    publisher.publish("quiet.topic", &json!({"n": 1})).unwrap();
    sub.recv_timeout(RECV_BUDGET).await.unwrap();

    subscriber.unsubscribe("quiet.topic").unwrap();
    publisher.publish("quiet.topic", &json!({"n": 2})).unwrap();

    assert!(matches!(
        sub.recv_timeout(Duration::from_millis(400)).await,
        Err(BusError::Stopped) | Err(BusError::Timeout(..))
    ));
}

#[tokio::test]
async fn stop_watching_deregisters_and_removes_inbox() {
    let dir = TempDir::new().unwrap();
    let bus = Bus::open(dir.path(), "gone").await.unwrap();
    bus.subscribe("any.topic").unwrap();

    let subscribers = std::fs::read_dir(dir.path().join("subscribers")).unwrap().count();
    assert_eq!(subscribers, 1);

    bus.stop_watching().unwrap();
    let subscribers = std::fs::read_dir(dir.path().join("subscribers")).unwrap().count();
    assert_eq!(subscribers, 0);
    assert_eq!(std::fs::read_dir(dir.path().join("inbox")).unwrap().count(), 0);
}

#[tokio::test]
async fn self_delivery_works_within_one_process() {
    let dir = TempDir::new().unwrap();
    let bus = Bus::open(dir.path(), "solo").await.unwrap();
    let mut sub = bus.subscribe("loop.back").unwrap();

    bus.publish("loop.back", &json!({"ok": true})).unwrap();
    let message = sub.recv_timeout(RECV_BUDGET).await.unwrap();
    assert_eq!(message.payload["ok"], true);
}
