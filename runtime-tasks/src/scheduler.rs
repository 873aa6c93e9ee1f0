//! The singleton task table. Owns every [`Task`] by id and is the only thing allowed to
//! spawn their execution loops.

use std::sync::{Arc, OnceLock, Weak};

use chrono::Utc;
use dashmap::DashMap;
use runtime_core::RuntimeError;

use crate::cron;
use crate::task::{Task, TaskCallback, TaskOptions, TaskSnapshot};

#[derive(Default)]
pub struct Scheduler {
    tasks: DashMap<String, Arc<Task>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new task under `id`, spawning its execution loop immediately when
    /// `options.autostart` is set.
    pub fn register(&self, id: impl Into<String>, callback: TaskCallback, options: TaskOptions) -> Arc<Task> {
        let id = id.into();
        let task = Task::new(id.clone(), callback, options.clone());
        self.tasks.insert(id, task.clone());
        if options.autostart {
            let spawned = task.clone();
            tokio::spawn(async move {
                spawned.start().await;
            });
        }
        task
    }

    /// Registers a recurring task driven by a cron expression instead of a fixed delay.
    /// Kept on the very same [`Task`] machinery as an interval task — the only
    /// difference is that the callback itself recomputes and installs the next delay
    /// after every successful run, so the schedule keeps moving with the expression
    /// instead of repeating a fixed interval.
    pub fn register_cron(
        &self,
        id: impl Into<String>,
        expression: impl Into<String>,
        callback: TaskCallback,
    ) -> Result<Arc<Task>, RuntimeError> {
        let id = id.into();
        let expression = expression.into();
        let initial_delay = cron::next_delay_ms(&expression, Utc::now())?;

        let handle: Arc<OnceLock<Weak<Task>>> = Arc::new(OnceLock::new());
        let handle_for_closure = handle.clone();
        let expr_for_closure = expression.clone();
        let wrapped: TaskCallback = Arc::new(move || {
            let inner = callback.clone();
            let handle = handle_for_closure.clone();
            let expr = expr_for_closure.clone();
            Box::pin(async move {
                let result = inner().await;
                if result.is_ok() {
                    if let Some(task) = handle.get().and_then(Weak::upgrade) {
                        if let Ok(next) = cron::next_delay_ms(&expr, Utc::now()) {
                            task.set_delay_ms(next);
                        }
                    }
                }
                result
            })
        });

        let task = self.register(
            id,
            wrapped,
            TaskOptions {
                attempts: -1,
                autostart: true,
                delay_ms: initial_delay,
                repeat: -1,
                debug: false,
            },
        );
        let _ = handle.set(Arc::downgrade(&task));
        Ok(task)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Task>> {
        self.tasks.get(id).map(|t| t.clone())
    }

    pub fn snapshot(&self, id: &str) -> Option<TaskSnapshot> {
        self.get(id).map(|t| t.snapshot())
    }

    /// Stops the task if present, then drops it from the table. The stop is cooperative:
    /// a running task finishes its in-flight callback before the handle is released.
    pub fn unregister(&self, id: &str) {
        if let Some((_, task)) = self.tasks.remove(id) {
            task.stop();
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.tasks.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn register_runs_to_completion_for_finite_repeat() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let callback: TaskCallback = Arc::new(move || {
            let c = c.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let task = scheduler.register(
            "t1",
            callback,
            TaskOptions {
                attempts: -1,
                autostart: false,
                delay_ms: 0,
                repeat: 2,
                debug: false,
            },
        );
        task.start().await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(scheduler.get("t1").is_some());
    }

    #[test]
    fn unregister_removes_the_task_from_the_table() {
        let scheduler = Scheduler::new();
        let callback: TaskCallback = Arc::new(|| Box::pin(async { Ok(()) }));
        scheduler.register("t2", callback, TaskOptions::default());
        assert!(scheduler.get("t2").is_some());
        scheduler.unregister("t2");
        assert!(scheduler.get("t2").is_none());
    }
}
