// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment/boolean parsing helpers shared by every binary.

/// Parse a human boolean. Accepts `1`/`0`, `true`/`false`, `yes`/`no`,
/// `on`/`off` in any case; anything else is `None`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a boolean environment variable, falling back to `default` when the
/// variable is unset or unparseable.
pub fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .as_deref()
        .and_then(parse_bool)
        .unwrap_or(default)
}

/// Read a string environment variable with a default. Empty values count
/// as unset.
pub fn env_or(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

#[cfg(test)]
#[path = "envparse_tests.rs"]
mod tests;
