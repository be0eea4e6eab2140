// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bus itself: registration, publish, inbox watching, dispatch.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::BusError;

/// Fallback drain cadence when inotify misses an event.
const POLL_FALLBACK: Duration = Duration::from_millis(250);

/// Distinguishes multiple bus handles inside one process (tests run
/// several managers in-process under a single PID).
static INSTANCE_TOKEN: AtomicU32 = AtomicU32::new(0);

/// One delivered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub topic: String,
    pub payload: serde_json::Value,
    /// Publisher PID, for diagnostics.
    pub publisher: u32,
    /// Publisher-local sequence; ordering is guaranteed per publisher only.
    pub seq: u64,
}

impl BusMessage {
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, BusError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Registration record other processes read at publish time.
#[derive(Debug, Serialize, Deserialize)]
struct Registration {
    ident: String,
    pid: u32,
    patterns: Vec<String>,
}

struct SubEntry {
    pattern: String,
    tx: mpsc::UnboundedSender<BusMessage>,
}

struct BusInner {
    ipc_dir: PathBuf,
    ident: String,
    sub_id: String,
    inbox: PathBuf,
    reg_path: PathBuf,
    subs: Mutex<Vec<SubEntry>>,
    seq: AtomicU64,
    token: u32,
    cancel: CancellationToken,
}

/// A handle to the host bus for one process (clone-cheap).
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

/// One subscription's receiving end.
pub struct Subscription {
    pattern: String,
    rx: mpsc::UnboundedReceiver<BusMessage>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }

    /// Receive with a budget; `Timeout` when nothing arrives in time.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<BusMessage, BusError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(BusError::Stopped),
            Err(_) => Err(BusError::Timeout(timeout, self.pattern.clone())),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Bus {
    /// Join the bus rooted at `ipc_dir` as `ident`.
    ///
    /// Creates the spool layout, registers this process (with no patterns
    /// yet) and starts the inbox watcher. Must be called from within a
    /// tokio runtime.
    pub async fn open(ipc_dir: impl Into<PathBuf>, ident: &str) -> Result<Self, BusError> {
        let ipc_dir = ipc_dir.into();
        let token = INSTANCE_TOKEN.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        let sub_id = format!("{ident}-{pid}-{token}");
        let inbox = ipc_dir.join("inbox").join(&sub_id);
        let reg_path = ipc_dir.join("subscribers").join(format!("{sub_id}.json"));

        for dir in [ipc_dir.join("subscribers"), inbox.clone()] {
            std::fs::create_dir_all(&dir).map_err(|source| BusError::Io { path: dir, source })?;
        }

        let inner = Arc::new(BusInner {
            ipc_dir,
            ident: ident.to_string(),
            sub_id,
            inbox,
            reg_path,
            subs: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
            token,
            cancel: CancellationToken::new(),
        });
        inner.write_registration()?;

        let bus = Self { inner };
        bus.spawn_watcher()?;
        debug!(ident, sub_id = %bus.inner.sub_id, "joined bus");
        Ok(bus)
    }

    pub fn ident(&self) -> &str {
        &self.inner.ident
    }

    /// Publish fire-and-forget: deliver into every registered inbox whose
    /// patterns match `topic`. Dead registrations are pruned on the way.
    pub fn publish<T: Serialize>(&self, topic: &str, payload: &T) -> Result<(), BusError> {
        let message = BusMessage {
            topic: topic.to_string(),
            payload: serde_json::to_value(payload)?,
            publisher: std::process::id(),
            seq: self.inner.seq.fetch_add(1, Ordering::Relaxed),
        };
        let bytes = serde_json::to_vec(&message)?;
        let file_name = format!(
            "{:016x}-{:08x}{:04x}.json",
            message.seq,
            message.publisher,
            self.inner.token
        );

        let subscribers_dir = self.inner.ipc_dir.join("subscribers");
        let entries = std::fs::read_dir(&subscribers_dir).map_err(|source| BusError::Io {
            path: subscribers_dir.clone(),
            source,
        })?;

        for entry in entries.flatten() {
            let reg_path = entry.path();
            let Ok(raw) = std::fs::read(&reg_path) else {
                continue;
            };
            let Ok(reg) = serde_json::from_slice::<Registration>(&raw) else {
                warn!(path = %reg_path.display(), "removing unreadable registration");
                let _ = std::fs::remove_file(&reg_path);
                continue;
            };
            if reg.pid != std::process::id() && !crate::liveness::pid_alive(reg.pid) {
                debug!(ident = %reg.ident, pid = reg.pid, "pruning dead subscriber");
                let _ = std::fs::remove_file(&reg_path);
                if let Some(stem) = reg_path.file_stem().and_then(|s| s.to_str()) {
                    let _ = std::fs::remove_dir_all(self.inner.ipc_dir.join("inbox").join(stem));
                }
                continue;
            }
            if !reg.patterns.iter().any(|p| gsm_wire::matches(p, topic)) {
                continue;
            }
            if let Some(stem) = reg_path.file_stem().and_then(|s| s.to_str()) {
                let inbox = self.inner.ipc_dir.join("inbox").join(stem);
                if let Err(err) = deliver(&inbox, &file_name, &bytes) {
                    warn!(topic, inbox = %inbox.display(), %err, "delivery failed");
                }
            }
        }
        trace!(topic, seq = message.seq, "published");
        Ok(())
    }

    /// Subscribe to a topic pattern (`*` one segment, trailing `#` any
    /// remainder). The registration is visible to publishers before this
    /// returns.
    pub fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut subs = self.inner.subs.lock();
            subs.push(SubEntry {
                pattern: pattern.to_string(),
                tx,
            });
        }
        self.inner.write_registration()?;
        debug!(ident = %self.inner.ident, pattern, "subscribed");
        Ok(Subscription {
            pattern: pattern.to_string(),
            rx,
        })
    }

    /// Drop every local subscription with this exact pattern.
    pub fn unsubscribe(&self, pattern: &str) -> Result<(), BusError> {
        {
            let mut subs = self.inner.subs.lock();
            subs.retain(|entry| entry.pattern != pattern);
        }
        self.inner.write_registration()
    }

    pub fn unsubscribe_all(&self) -> Result<(), BusError> {
        self.inner.subs.lock().clear();
        self.inner.write_registration()
    }

    /// Leave the bus: deregister, stop the watcher, drop the inbox.
    /// Spooled-but-undelivered messages are discarded with it.
    pub fn stop_watching(&self) -> Result<(), BusError> {
        self.inner.cancel.cancel();
        self.inner.subs.lock().clear();
        let _ = std::fs::remove_file(&self.inner.reg_path);
        let _ = std::fs::remove_dir_all(&self.inner.inbox);
        debug!(ident = %self.inner.ident, "left bus");
        Ok(())
    }

    fn spawn_watcher(&self) -> Result<(), BusError> {
        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(16);
        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if res.is_ok() {
                let _ = wake_tx.try_send(());
            }
        })?;
        watcher.watch(&self.inner.inbox, RecursiveMode::NonRecursive)?;

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            // Watcher moves into the task so it lives as long as the loop.
            let _watcher = watcher;
            loop {
                if let Err(err) = inner.drain_inbox() {
                    warn!(%err, "inbox drain failed");
                }
                tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    _ = wake_rx.recv() => {}
                    _ = tokio::time::sleep(POLL_FALLBACK) => {}
                }
            }
        });
        Ok(())
    }
}

impl BusInner {
    fn write_registration(&self) -> Result<(), BusError> {
        let patterns: Vec<String> = self
            .subs
            .lock()
            .iter()
            .map(|entry| entry.pattern.clone())
            .collect();
        let reg = Registration {
            ident: self.ident.clone(),
            pid: std::process::id(),
            patterns,
        };
        let bytes = serde_json::to_vec(&reg)?;
        let tmp = self.reg_path.with_extension("tmp");
        std::fs::write(&tmp, &bytes).map_err(|source| BusError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.reg_path).map_err(|source| BusError::Io {
            path: self.reg_path.clone(),
            source,
        })?;
        Ok(())
    }

    fn drain_inbox(&self) -> Result<(), BusError> {
        let entries = match std::fs::read_dir(&self.inbox) {
            Ok(entries) => entries,
            // Inbox removed by stop_watching or a pruner: nothing to do.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(BusError::Io {
                    path: self.inbox.clone(),
                    source,
                })
            }
        };

        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| name.ends_with(".json") && !name.starts_with('.'))
            .collect();
        names.sort();

        for name in names {
            let path = self.inbox.join(&name);
            match std::fs::read(&path) {
                Ok(raw) => match serde_json::from_slice::<BusMessage>(&raw) {
                    Ok(message) => self.dispatch(message),
                    Err(err) => warn!(file = %path.display(), %err, "dropping malformed message"),
                },
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => warn!(file = %path.display(), %err, "unreadable message"),
            }
            let _ = std::fs::remove_file(&path);
        }
        Ok(())
    }

    fn dispatch(&self, message: BusMessage) {
        let mut subs = self.subs.lock();
        subs.retain(|entry| {
            if gsm_wire::matches(&entry.pattern, &message.topic) {
                entry.tx.send(message.clone()).is_ok()
            } else {
                !entry.tx.is_closed()
            }
        });
        trace!(topic = %message.topic, "dispatched");
    }
}

/// Write-then-rename so readers never see a partial message.
fn deliver(inbox: &Path, file_name: &str, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = inbox.join(format!(".tmp-{file_name}"));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, inbox.join(file_name))
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
