// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use yare::parameterized;

#[parameterized(
    one = { "1", Some(true) },
    zero = { "0", Some(false) },
    word_true = { "true", Some(true) },
    word_false = { "false", Some(false) },
    yes_upper = { "YES", Some(true) },
    no_mixed = { "No", Some(false) },
    on = { "on", Some(true) },
    off = { "off", Some(false) },
    padded = { "  true ", Some(true) },
    garbage = { "maybe", None },
    empty = { "", None },
)]
fn parse_bool_cases(raw: &str, expected: Option<bool>) {
    assert_eq!(parse_bool(raw), expected);
}

#[test]
#[serial]
fn env_bool_falls_back_on_unset_and_garbage() {
    std::env::remove_var("GSM_TEST_BOOL");
    assert!(env_bool("GSM_TEST_BOOL", true));
    assert!(!env_bool("GSM_TEST_BOOL", false));

    std::env::set_var("GSM_TEST_BOOL", "nonsense");
    assert!(env_bool("GSM_TEST_BOOL", true));

    std::env::set_var("GSM_TEST_BOOL", "no");
    assert!(!env_bool("GSM_TEST_BOOL", true));
    std::env::remove_var("GSM_TEST_BOOL");
}

#[test]
#[serial]
fn env_or_treats_empty_as_unset() {
    std::env::set_var("GSM_TEST_STR", "");
    assert_eq!(env_or("GSM_TEST_STR", "fallback"), "fallback");
    std::env::set_var("GSM_TEST_STR", "value");
    assert_eq!(env_or("GSM_TEST_STR", "fallback"), "value");
    std::env::remove_var("GSM_TEST_STR");
}
