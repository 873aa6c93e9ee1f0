//! The Pulse task state machine: `ready → running → (stopped | error → retry)`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use runtime_core::RuntimeError;

pub type TaskCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<(), RuntimeError>> + Send>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Ready,
    Running,
    Stopped,
    Error,
}

/// `{attempts, autostart, delay, repeat, debug}`.
#[derive(Debug, Clone)]
pub struct TaskOptions {
    /// Number of retries allowed after the first attempt; `-1` retries indefinitely.
    pub attempts: i64,
    pub autostart: bool,
    pub delay_ms: u64,
    /// `-1` repeats forever; `0` or `1` runs once.
    pub repeat: i64,
    pub debug: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            attempts: -1,
            autostart: false,
            delay_ms: 0,
            repeat: 1,
            debug: false,
        }
    }
}

/// Point-in-time view of a task's state, safe to hand out without holding any lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    pub attempt: i64,
    pub count: i64,
    pub progress: f64,
    pub failed: bool,
}

struct TaskState {
    status: TaskStatus,
    attempt: i64,
    count: i64,
    failed: bool,
}

/// A single scheduled unit of recurring work. Construct via [`crate::Scheduler::register`]
/// rather than directly, so the scheduler's task table stays authoritative.
pub struct Task {
    pub id: String,
    callback: TaskCallback,
    attempts: i64,
    repeat: i64,
    delay_ms: AtomicU64,
    debug: bool,
    state: Mutex<TaskState>,
    pending_stop: AtomicBool,
}

impl Task {
    pub fn new(id: impl Into<String>, callback: TaskCallback, options: TaskOptions) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            callback,
            attempts: options.attempts,
            repeat: options.repeat,
            delay_ms: AtomicU64::new(options.delay_ms),
            debug: options.debug,
            state: Mutex::new(TaskState {
                status: TaskStatus::Ready,
                attempt: 0,
                count: 0,
                failed: false,
            }),
            pending_stop: AtomicBool::new(false),
        })
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let s = self.state.lock();
        let complete = s.status == TaskStatus::Stopped && !s.failed;
        let progress = if complete {
            1.0
        } else if self.repeat > 0 {
            s.count as f64 / self.repeat as f64
        } else {
            0.0
        };
        TaskSnapshot {
            status: s.status,
            attempt: s.attempt,
            count: s.count,
            progress,
            failed: s.failed,
        }
    }

    pub fn set_delay_ms(&self, delay_ms: u64) {
        self.delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms.load(Ordering::SeqCst)
    }

    /// Schedules the first execution after the task's delay elapses.
    pub async fn start(self: &Arc<Self>) {
        self.run(true).await;
    }

    /// Pre-empts the timer and runs immediately.
    pub async fn now(self: &Arc<Self>) {
        self.run(false).await;
    }

    /// If currently running, requests a stop honored at the next callback boundary;
    /// otherwise stops immediately.
    pub fn stop(&self) {
        let mut s = self.state.lock();
        if s.status == TaskStatus::Running {
            self.pending_stop.store(true, Ordering::SeqCst);
        } else {
            s.status = TaskStatus::Stopped;
        }
    }

    /// Re-enters the schedule from `Error`, keeping accumulated `attempt`/`count`.
    pub async fn retry(self: &Arc<Self>) {
        {
            let mut s = self.state.lock();
            if s.status != TaskStatus::Error {
                return;
            }
            s.status = TaskStatus::Ready;
        }
        self.start().await;
    }

    /// Clears accumulated state back to a fresh `Ready` task.
    pub fn reset(&self) {
        let mut s = self.state.lock();
        s.status = TaskStatus::Ready;
        s.attempt = 0;
        s.count = 0;
        s.failed = false;
        self.pending_stop.store(false, Ordering::SeqCst);
    }

    async fn run(self: &Arc<Self>, wait_initial_delay: bool) {
        if wait_initial_delay {
            let delay = self.delay_ms();
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        loop {
            if self.pending_stop.swap(false, Ordering::SeqCst) {
                self.state.lock().status = TaskStatus::Stopped;
                return;
            }

            {
                let mut s = self.state.lock();
                s.status = TaskStatus::Running;
                s.count += 1;
            }

            let result = (self.callback)().await;

            match result {
                Ok(()) => {
                    let mut s = self.state.lock();
                    let complete = self.repeat > 0 && s.count >= self.repeat;
                    if complete {
                        s.status = TaskStatus::Stopped;
                        return;
                    }
                    s.status = TaskStatus::Ready;
                }
                Err(err) => {
                    let mut s = self.state.lock();
                    s.count -= 1;
                    if self.debug {
                        tracing::warn!(task_id = %self.id, attempt = s.attempt, error = %err, "task callback failed");
                    }
                    let should_stop = self.attempts >= 0 && s.attempt >= self.attempts;
                    if should_stop {
                        s.status = TaskStatus::Stopped;
                        s.failed = true;
                        return;
                    }
                    s.attempt += 1;
                    s.status = TaskStatus::Error;
                }
            }

            if self.pending_stop.swap(false, Ordering::SeqCst) {
                self.state.lock().status = TaskStatus::Stopped;
                return;
            }

            let delay = self.delay_ms();
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn always_fails() -> TaskCallback {
        Arc::new(|| Box::pin(async { Err(RuntimeError::Store("boom".into())) }))
    }

    #[tokio::test]
    async fn retry_scenario_invokes_callback_attempts_plus_one_times() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let inv = invocations.clone();
        let callback: TaskCallback = Arc::new(move || {
            let inv = inv.clone();
            Box::pin(async move {
                inv.fetch_add(1, Ordering::SeqCst);
                Err(RuntimeError::Store("boom".into()))
            })
        });

        let task = Task::new(
            "retry-task",
            callback,
            TaskOptions {
                attempts: 2,
                repeat: 1,
                delay_ms: 0,
                ..Default::default()
            },
        );
        task.start().await;

        let snapshot = task.snapshot();
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
        assert_eq!(snapshot.attempt, 2);
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.status, TaskStatus::Stopped);
        assert!(snapshot.failed);
    }

    #[tokio::test]
    async fn finite_repeat_stops_after_n_successes_with_full_progress() {
        let callback: TaskCallback = Arc::new(|| Box::pin(async { Ok(()) }));
        let task = Task::new(
            "repeat-task",
            callback,
            TaskOptions {
                attempts: -1,
                repeat: 3,
                delay_ms: 0,
                ..Default::default()
            },
        );
        task.start().await;

        let snapshot = task.snapshot();
        assert_eq!(snapshot.status, TaskStatus::Stopped);
        assert_eq!(snapshot.count, 3);
        assert!(!snapshot.failed);
        assert_eq!(snapshot.progress, 1.0);
    }

    #[tokio::test]
    async fn unlimited_attempts_eventually_succeeds() {
        let attempt_no = Arc::new(AtomicUsize::new(0));
        let a = attempt_no.clone();
        let callback: TaskCallback = Arc::new(move || {
            let a = a.clone();
            Box::pin(async move {
                if a.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RuntimeError::Store("boom".into()))
                } else {
                    Ok(())
                }
            })
        });

        let task = Task::new(
            "eventual-success",
            callback,
            TaskOptions {
                attempts: -1,
                repeat: 1,
                delay_ms: 0,
                ..Default::default()
            },
        );
        task.start().await;

        let snapshot = task.snapshot();
        assert_eq!(snapshot.status, TaskStatus::Stopped);
        assert!(!snapshot.failed);
    }

    #[tokio::test]
    async fn reset_clears_accumulated_state() {
        let task = Task::new("resettable", always_fails(), TaskOptions { attempts: 0, repeat: 1, delay_ms: 0, ..Default::default() });
        task.start().await;
        assert!(task.snapshot().failed);
        task.reset();
        let snapshot = task.snapshot();
        assert_eq!(snapshot.status, TaskStatus::Ready);
        assert_eq!(snapshot.attempt, 0);
        assert!(!snapshot.failed);
    }
}
