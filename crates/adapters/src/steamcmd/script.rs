// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Non-interactive steamcmd script rendering.

use std::path::PathBuf;

/// Steam credentials for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SteamLogin {
    Anonymous,
    Account { username: String, password: String },
}

/// Everything needed to render one `runscript` file.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptSpec {
    pub install_dir: PathBuf,
    pub login: SteamLogin,
    /// Steam app id of the dedicated server.
    pub app_id: String,
    pub validate: bool,
}

impl ScriptSpec {
    /// Render the directive script steamcmd runs with `+runscript`.
    pub fn render(&self) -> String {
        let mut lines = vec![
            "@ShutdownOnFailedCommand 1".to_string(),
            "@NoPromptForPassword 1".to_string(),
            format!("force_install_dir {}", self.install_dir.display()),
        ];
        match &self.login {
            SteamLogin::Anonymous => lines.push("login anonymous".to_string()),
            SteamLogin::Account { username, password } => {
                lines.push(format!("login {username} {password}"));
            }
        }
        if self.validate {
            lines.push(format!("app_update {} validate", self.app_id));
        } else {
            lines.push(format!("app_update {}", self.app_id));
        }
        lines.push("quit".to_string());
        lines.join("\n") + "\n"
    }
}

#[cfg(test)]
#[path = "script_tests.rs"]
mod tests;
