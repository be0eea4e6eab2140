// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    exact = { "downloadManager.downloadUpdateGame", "downloadManager.downloadUpdateGame", true },
    exact_mismatch = { "downloadManager.ping", "configManager.ping", false },
    hash_tail = { "cli.42.#", "cli.42.progress", true },
    hash_deep = { "cli.42.#", "cli.42.a.b.c", true },
    hash_empty_remainder = { "cli.42.#", "cli.42", true },
    hash_everything = { "#", "any.topic.at.all", true },
    hash_not_final = { "a.#.b", "a.x.b", false },
    star_one_segment = { "_broadcast.*", "_broadcast.ping", true },
    star_needs_segment = { "_broadcast.*", "_broadcast", false },
    star_only_one = { "_broadcast.*", "_broadcast.ping.extra", false },
    prefix_is_not_match = { "cli.42", "cli.42.progress", false },
)]
fn matching(pattern: &str, topic: &str, expected: bool) {
    assert_eq!(matches(pattern, topic), expected, "{pattern} vs {topic}");
}

#[test]
fn reply_topic_embeds_request_id() {
    let id = gsm_core::RequestId::new();
    let reply_to = reply_topic("cli", &id);
    assert_eq!(reply_to, format!("cli.{id}"));
    assert_eq!(reply_sub(&reply_to, sub::ACK), format!("cli.{id}.ack"));
}

#[test]
fn split_reply_suffix_requires_exact_prefix() {
    assert_eq!(split_reply_suffix("cli.42", "cli.42.finalStatus"), Some("finalStatus"));
    assert_eq!(split_reply_suffix("cli.42", "cli.42"), None);
    assert_eq!(split_reply_suffix("cli.42", "cli.43.ack"), None);
}
