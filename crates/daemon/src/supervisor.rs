// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The generic task supervisor every manager instantiates.
//!
//! One in-flight task per key: a duplicate request is deflected onto the
//! running task's reply channel with a `nack`. An accepted task acquires
//! the driver's global lock, waits for its cross-task pattern locks,
//! wires its output/progress streams onto the bus, and is guaranteed to
//! end in exactly one terminal message. Locks are released on every exit
//! path except a pattern-wait timeout, where the global lock is retained
//! for the operator to inspect.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gsm_adapters::{DriveOutcome, DriverError};
use gsm_bus::{Bus, Liveness};
use gsm_core::{OutputRing, ProgressSnapshot};
use gsm_lock::{LockDir, LockError, LockName};
use gsm_wire::{
    reply_sub, sub, Ack, ErrorReply, FinalStatus, ModuleStatus, Nack, OutputLine, StatusReply,
    TaskSummary,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default budget for the global-lock spin and each pattern wait.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    CheckingLocks,
    Preparing,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::CheckingLocks => "checking-locks",
            TaskState::Preparing => "preparing",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
        }
    }
}

/// What a task driver gets to work with.
pub struct TaskContext {
    pub output: mpsc::UnboundedSender<String>,
    pub progress: mpsc::UnboundedSender<ProgressSnapshot>,
    pub cancel: CancellationToken,
}

/// Shared handle to one in-flight task.
#[derive(Clone)]
pub struct TaskHandle {
    pub key: String,
    pub reply_to: String,
    state: Arc<Mutex<TaskState>>,
    last_progress: Arc<Mutex<Option<ProgressSnapshot>>>,
    ring: Arc<Mutex<OutputRing>>,
    /// Fire to request cooperative cancellation.
    pub cancel: CancellationToken,
    /// Fires once the task record is gone (terminal published).
    pub done: CancellationToken,
}

impl TaskHandle {
    fn new(key: String, reply_to: String) -> Self {
        Self {
            key,
            reply_to,
            // State exists before the record is visible to anyone.
            state: Arc::new(Mutex::new(TaskState::CheckingLocks)),
            last_progress: Arc::new(Mutex::new(None)),
            ring: Arc::new(Mutex::new(OutputRing::new())),
            cancel: CancellationToken::new(),
            done: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    pub fn last_progress(&self) -> Option<ProgressSnapshot> {
        self.last_progress.lock().clone()
    }

    /// Newest retained output line.
    pub fn last_output(&self) -> Option<String> {
        self.ring.lock().latest().map(str::to_string)
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            key: self.key.clone(),
            state: self.state().as_str().to_string(),
            subscribe_to: self.reply_to.clone(),
            last_progress: self.last_progress(),
        }
    }
}

/// Parameters for one accepted request.
pub struct TaskSpec {
    pub key: String,
    pub reply_to: String,
    /// The driver's own exclusive lock for this key.
    pub global_lock: LockName,
    /// Cross-task patterns that must be clear before work starts.
    pub clear_patterns: Vec<String>,
    pub lock_timeout: Duration,
}

impl TaskSpec {
    pub fn new(key: impl Into<String>, reply_to: impl Into<String>, global_lock: LockName) -> Self {
        Self {
            key: key.into(),
            reply_to: reply_to.into(),
            global_lock,
            clear_patterns: Vec::new(),
            lock_timeout: LOCK_TIMEOUT,
        }
    }

    pub fn clear_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.clear_patterns.push(pattern.into());
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

/// One manager's task registry and execution shell.
#[derive(Clone)]
pub struct Supervisor {
    bus: Bus,
    locks: LockDir,
    liveness: Liveness,
    tasks: Arc<Mutex<HashMap<String, TaskHandle>>>,
}

impl Supervisor {
    pub fn new(bus: Bus, locks: LockDir, liveness: Liveness) -> Self {
        Self {
            bus,
            locks,
            liveness,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Find the in-flight task for a key, if any.
    pub fn find(&self, key: &str) -> Option<TaskHandle> {
        self.tasks.lock().get(key).cloned()
    }

    /// Summaries of every in-flight task.
    pub fn summaries(&self) -> Vec<TaskSummary> {
        let mut summaries: Vec<TaskSummary> =
            self.tasks.lock().values().map(TaskHandle::summary).collect();
        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        summaries
    }

    /// Cancel every in-flight task and wait for each to finish.
    ///
    /// Part of manager shutdown: a drained task has published its
    /// terminal message and released its locks. A task that never
    /// honors its cancel token is the force-exit watchdog's problem.
    pub async fn shutdown_tasks(&self) {
        let handles: Vec<TaskHandle> = self.tasks.lock().values().cloned().collect();
        if handles.is_empty() {
            return;
        }
        info!(tasks = handles.len(), "canceling in-flight tasks for shutdown");
        for handle in &handles {
            handle.cancel.cancel();
        }
        for handle in handles {
            handle.done.cancelled().await;
        }
    }

    /// Publish a reply on `<reply_to>.<sub>`.
    pub fn reply<T: serde::Serialize>(&self, reply_to: &str, sub_name: &str, payload: &T) {
        if let Err(err) = self.bus.publish(&reply_sub(reply_to, sub_name), payload) {
            warn!(reply_to, sub_name, %err, "reply publish failed");
        }
    }

    /// Immediate validation failure: `error`, nothing acquired.
    pub fn reject(&self, reply_to: &str, message: impl Into<String>) {
        let message = message.into();
        debug!(reply_to, %message, "rejecting request");
        self.reply(reply_to, sub::ERROR, &ErrorReply { message });
    }

    /// Start (or deflect) a task for `spec.key`.
    ///
    /// Returns the handle when a new task was accepted, `None` when the
    /// request was deflected onto an existing task.
    pub fn start_task<F, Fut>(&self, spec: TaskSpec, driver: F) -> Option<TaskHandle>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<DriveOutcome, DriverError>> + Send + 'static,
    {
        // Dedup and insert under one lock so concurrent duplicates cannot
        // both win.
        let handle = {
            let mut tasks = self.tasks.lock();
            if let Some(existing) = tasks.get(&spec.key) {
                info!(key = %spec.key, "deflecting duplicate request");
                self.reply(
                    &spec.reply_to,
                    sub::NACK,
                    &Nack {
                        reason: "alreadyRequested".to_string(),
                        already_requested: true,
                        subscribe_to: Some(existing.reply_to.clone()),
                    },
                );
                return None;
            }
            let handle = TaskHandle::new(spec.key.clone(), spec.reply_to.clone());
            tasks.insert(spec.key.clone(), handle.clone());
            handle
        };

        let supervisor = self.clone();
        let task_handle = handle.clone();
        tokio::spawn(async move {
            supervisor.run_task(spec, task_handle, driver).await;
        });
        Some(handle)
    }

    async fn run_task<F, Fut>(&self, spec: TaskSpec, handle: TaskHandle, driver: F)
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<DriveOutcome, DriverError>> + Send + 'static,
    {
        let reply_to = spec.reply_to.clone();

        // Driver-global lock.
        match self.locks.spin_acquire(&spec.global_lock, spec.lock_timeout).await {
            Ok(()) => {}
            Err(LockError::Timeout { .. }) => {
                self.finish_rejected(
                    &handle,
                    &reply_to,
                    format!("lock {} busy after {:?}", spec.global_lock, spec.lock_timeout),
                );
                return;
            }
            Err(err) => {
                self.finish_rejected(&handle, &reply_to, format!("lock error: {err}"));
                return;
            }
        }

        // Cross-task preconditions. On timeout the global lock is
        // deliberately retained: an operator needs to look at the host.
        for pattern in &spec.clear_patterns {
            match self.locks.wait_clear(pattern, spec.lock_timeout).await {
                Ok(()) => {}
                Err(err @ LockError::Timeout { .. }) => {
                    error!(key = %spec.key, pattern, %err, "precondition locks never cleared");
                    self.finish_rejected(
                        &handle,
                        &reply_to,
                        format!("blocking locks matching {pattern} did not clear: {err}"),
                    );
                    return;
                }
                Err(err) => {
                    if let Err(release_err) = self.locks.release(&spec.global_lock) {
                        warn!(lock = %spec.global_lock, %release_err, "release failed");
                    }
                    self.finish_rejected(&handle, &reply_to, format!("lock error: {err}"));
                    return;
                }
            }
        }

        *handle.state.lock() = TaskState::Preparing;

        // Streams: output → bus + ring, progress → bus + snapshot.
        let (output_tx, mut output_rx) = mpsc::unbounded_channel::<String>();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ProgressSnapshot>();

        let out_bus = self.bus.clone();
        let out_reply = reply_to.clone();
        let out_ring = Arc::clone(&handle.ring);
        let output_forward = tokio::spawn(async move {
            while let Some(line) = output_rx.recv().await {
                out_ring.lock().unshift(line.clone());
                if let Err(err) = out_bus.publish(&reply_sub(&out_reply, sub::OUTPUT), &OutputLine { line }) {
                    warn!(%err, "output publish failed");
                }
            }
        });

        let prog_bus = self.bus.clone();
        let prog_reply = reply_to.clone();
        let prog_last = Arc::clone(&handle.last_progress);
        let progress_forward = tokio::spawn(async move {
            while let Some(snapshot) = progress_rx.recv().await {
                *prog_last.lock() = Some(snapshot.clone());
                if let Err(err) = prog_bus.publish(&reply_sub(&prog_reply, sub::PROGRESS), &snapshot) {
                    warn!(%err, "progress publish failed");
                }
            }
        });

        self.reply(&reply_to, sub::ACK, &Ack { subscribe_to: reply_to.clone() });
        *handle.state.lock() = TaskState::Running;
        self.liveness.set_status(ModuleStatus::Working);
        info!(key = %spec.key, reply_to, "task started");

        let context = TaskContext {
            output: output_tx,
            progress: progress_tx,
            cancel: handle.cancel.clone(),
        };
        let outcome = driver(context).await;

        // The driver dropped its senders; drain the streams so every
        // output line precedes the terminal message.
        let _ = output_forward.await;
        let _ = progress_forward.await;

        match outcome {
            Ok(DriveOutcome::Completed) => {
                *handle.state.lock() = TaskState::Completed;
                self.reply(&reply_to, sub::FINAL_STATUS, &FinalStatus::completed());
                self.liveness.set_status(ModuleStatus::Ready);
                info!(key = %spec.key, "task completed");
            }
            Ok(DriveOutcome::Canceled) => {
                *handle.state.lock() = TaskState::Canceled;
                self.reply(&reply_to, sub::STATUS, &StatusReply::new("ackCanceled"));
                self.reply(&reply_to, sub::FINAL_STATUS, &FinalStatus::canceled());
                self.liveness.set_status(ModuleStatus::Ready);
                info!(key = %spec.key, "task canceled");
            }
            Err(err) => {
                *handle.state.lock() = TaskState::Failed;
                let mut message = err.to_string();
                if let Some(last) = handle.last_output() {
                    message = format!("{message} (last output: {last})");
                }
                self.reply(&reply_to, sub::ERROR, &ErrorReply { message });
                self.liveness.set_status(ModuleStatus::Error);
                error!(key = %spec.key, %err, "task failed");
            }
        }

        if let Err(err) = self.locks.release(&spec.global_lock) {
            warn!(lock = %spec.global_lock, %err, "global lock release failed");
        }
        self.remove(&handle);
    }

    /// Error out a task that never reached its driver: publish `error`,
    /// drop the record. The caller decides which locks stay held.
    fn finish_rejected(&self, handle: &TaskHandle, reply_to: &str, message: String) {
        *handle.state.lock() = TaskState::Failed;
        self.reply(reply_to, sub::ERROR, &ErrorReply { message });
        self.remove(handle);
    }

    fn remove(&self, handle: &TaskHandle) {
        self.tasks.lock().remove(&handle.key);
        handle.done.cancel();
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
