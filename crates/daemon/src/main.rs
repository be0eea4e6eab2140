// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gsmd <module>` — run one manager process.
//!
//! Modules: `downloadManager`, `configManager`, `overlayManager`,
//! `gameManager`, `lifecycle`. Each process joins the bus under its
//! module ident and coordinates with its peers only through the lock
//! directory and the bus.

use gsm_bus::Bus;
use gsm_daemon::managers::{config, download, game, overlay};
use gsm_daemon::{env, lifecycle, signals, DaemonError};
use gsm_lock::LockDir;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!(
        "usage: gsmd <module>\n\
         modules: downloadManager | configManager | overlayManager | gameManager | lifecycle"
    );
    std::process::exit(2)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env::log_filter()))
        .init();

    let module = match std::env::args().nth(1) {
        Some(module) => module,
        None => usage(),
    };

    let shutdown = CancellationToken::new();
    let layout = env::layout();

    let result = run_module(&module, &layout, shutdown.clone()).await;
    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!(%err, module, "manager failed");
            std::process::exit(1)
        }
    }
}

async fn run_module(
    module: &str,
    layout: &gsm_core::Layout,
    shutdown: CancellationToken,
) -> Result<i32, DaemonError> {
    let locks = LockDir::open(layout.lock_dir())?;

    match module {
        "downloadManager" | "download" => {
            let bus = Bus::open(layout.ipc_dir(), download::MODULE).await?;
            let manager =
                download::DownloadManager::new(bus.clone(), locks, download::DownloadManagerConfig::from_env());
            // The only module with an external tool child to relay into.
            signals::spawn_signal_forwarder(Some(manager.active_child()), shutdown.clone())
                .map_err(|source| DaemonError::Io {
                    path: "<signals>".into(),
                    source,
                })?;
            signals::spawn_force_exit_watchdog(shutdown.clone(), signals::FORCE_EXIT_GRACE);
            manager.run(shutdown).await?;
            bus.stop_watching()?;
            Ok(0)
        }
        "configManager" | "config" => {
            let bus = Bus::open(layout.ipc_dir(), config::MODULE).await?;
            let manager =
                config::ConfigManager::new(bus.clone(), locks, config::ConfigManagerConfig::from_env());
            signals::spawn_signal_forwarder(None, shutdown.clone()).map_err(
                |source| DaemonError::Io {
                    path: "<signals>".into(),
                    source,
                },
            )?;
            signals::spawn_force_exit_watchdog(shutdown.clone(), signals::FORCE_EXIT_GRACE);
            manager.run(shutdown).await?;
            bus.stop_watching()?;
            Ok(0)
        }
        "overlayManager" | "overlay" => {
            let bus = Bus::open(layout.ipc_dir(), overlay::MODULE).await?;
            let manager =
                overlay::OverlayManager::new(bus.clone(), locks, overlay::OverlayManagerConfig::from_env());
            signals::spawn_signal_forwarder(None, shutdown.clone()).map_err(
                |source| DaemonError::Io {
                    path: "<signals>".into(),
                    source,
                },
            )?;
            signals::spawn_force_exit_watchdog(shutdown.clone(), signals::FORCE_EXIT_GRACE);
            manager.run(shutdown).await?;
            bus.stop_watching()?;
            Ok(0)
        }
        "gameManager" | "game" => {
            let bus = Bus::open(layout.ipc_dir(), game::MODULE).await?;
            let manager = game::GameManager::new(bus.clone(), locks, game::GameManagerConfig::from_env());
            signals::spawn_signal_forwarder(None, shutdown.clone()).map_err(
                |source| DaemonError::Io {
                    path: "<signals>".into(),
                    source,
                },
            )?;
            signals::spawn_force_exit_watchdog(shutdown.clone(), signals::FORCE_EXIT_GRACE);
            manager.run(shutdown).await?;
            bus.stop_watching()?;
            Ok(0)
        }
        "lifecycle" | "lifecycleManager" => {
            let bus = Bus::open(layout.ipc_dir(), lifecycle::MODULE).await?;
            let config = lifecycle::LifecycleConfig::from_env(shutdown.clone())?;
            signals::spawn_signal_forwarder(None, shutdown.clone()).map_err(
                |source| DaemonError::Io {
                    path: "<signals>".into(),
                    source,
                },
            )?;
            signals::spawn_force_exit_watchdog(shutdown, signals::FORCE_EXIT_GRACE);
            let code = lifecycle::run(&bus, &locks, config).await;
            bus.stop_watching()?;
            Ok(code)
        }
        _ => usage(),
    }
}
