//! Task/context correlation.
//!
//! Maps task ids to live tasks and enforces the identity protocol: a new
//! task without a task id, the same task while it awaits input, and a
//! rejection once it is terminal. The map sits behind a short-held
//! `std::sync::Mutex`; each task serializes its own turns.

use crate::error::{Result, TaskError};
use crate::task::TaskHandle;
use crate::turn::ResumeToken;
use statecraft_core::task::TaskStatus;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, Arc<TaskHandle>>>,
    max_tasks: usize,
    next_seq: AtomicU64,
}

impl TaskRegistry {
    pub fn new(max_tasks: usize) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            max_tasks: max_tasks.max(1),
            next_seq: AtomicU64::new(0),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, Arc<TaskHandle>>> {
        // The map is never left half-updated, so a poisoned lock is still usable
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Find or create the task a request belongs to.
    ///
    /// Returns the task and whether it was just created.
    pub fn resolve(
        &self,
        context_id: Option<&str>,
        task_id: Option<&str>,
    ) -> Result<(Arc<TaskHandle>, bool)> {
        let Some(task_id) = task_id else {
            let context_id = context_id
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let handle = self.create(context_id, Uuid::new_v4().to_string());
            return Ok((handle, true));
        };

        let handle = self.get(task_id)?;
        if let Some(context_id) = context_id
            && context_id != handle.context_id()
        {
            return Err(TaskError::ContextMismatch {
                task_id: task_id.to_string(),
                expected: handle.context_id().to_string(),
                actual: context_id.to_string(),
            });
        }
        let status = handle.status();
        if status.is_terminal() {
            return Err(TaskError::TaskAlreadyTerminal {
                task_id: task_id.to_string(),
                status,
            });
        }
        Ok((handle, false))
    }

    pub fn get(&self, task_id: &str) -> Result<Arc<TaskHandle>> {
        self.tasks()
            .get(task_id)
            .cloned()
            .ok_or_else(|| TaskError::TaskNotFound(task_id.to_string()))
    }

    /// Cancel a task that is waiting for input.
    ///
    /// A task with a turn in progress, or one already terminal, cannot be
    /// canceled.
    pub fn cancel(&self, task_id: &str) -> Result<Arc<TaskHandle>> {
        let handle = self.get(task_id)?;
        let not_cancelable = |status| TaskError::TaskNotCancelable {
            task_id: task_id.to_string(),
            status,
        };

        let Some(mut instance) = handle.try_lock() else {
            return Err(not_cancelable(handle.status()));
        };
        let status = handle.status();
        if status != TaskStatus::InputRequired {
            return Err(not_cancelable(status));
        }
        instance.interrupt.take();
        handle.set_status(TaskStatus::Canceled, None);
        drop(instance);

        info!(task_id, "task canceled");
        Ok(handle)
    }

    /// Re-register a task from its resume token.
    pub fn restore(&self, token: ResumeToken) -> Arc<TaskHandle> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(TaskHandle::restore(token, seq));
        self.insert(handle.clone());
        debug!(task_id = handle.task_id(), "task restored");
        handle
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }

    fn create(&self, context_id: String, task_id: String) -> Arc<TaskHandle> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(TaskHandle::new(context_id, task_id, seq));
        self.insert(handle.clone());
        debug!(
            context_id = handle.context_id(),
            task_id = handle.task_id(),
            "task created"
        );
        handle
    }

    fn insert(&self, handle: Arc<TaskHandle>) {
        let mut tasks = self.tasks();
        if tasks.len() >= self.max_tasks {
            let excess = tasks.len() + 1 - self.max_tasks;
            evict_terminal(&mut tasks, excess);
            if tasks.len() >= self.max_tasks {
                warn!(
                    live = tasks.len(),
                    max_tasks = self.max_tasks,
                    "task registry over capacity; no terminal tasks to evict"
                );
            }
        }
        tasks.insert(handle.task_id().to_string(), handle);
    }
}

/// Drop up to `count` terminal tasks, oldest first.
fn evict_terminal(tasks: &mut HashMap<String, Arc<TaskHandle>>, count: usize) {
    let mut terminal: Vec<(u64, String)> = tasks
        .values()
        .filter(|t| t.status().is_terminal())
        .map(|t| (t.seq(), t.task_id().to_string()))
        .collect();
    terminal.sort_unstable();
    for (_, task_id) in terminal.into_iter().take(count) {
        debug!(task_id = %task_id, "evicting terminal task");
        tasks.remove(&task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statecraft_core::message::Message;
    use statecraft_state::StateSnapshot;

    #[test]
    fn no_task_id_creates_new_task() {
        let registry = TaskRegistry::new(10);
        let (a, new_a) = registry.resolve(Some("ctx"), None).unwrap();
        let (b, new_b) = registry.resolve(Some("ctx"), None).unwrap();
        assert!(new_a && new_b);
        assert_ne!(a.task_id(), b.task_id());
        assert_eq!(a.context_id(), "ctx");

        let (c, _) = registry.resolve(None, None).unwrap();
        assert!(!c.context_id().is_empty());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn awaiting_task_is_reused() {
        let registry = TaskRegistry::new(10);
        let (task, _) = registry.resolve(Some("ctx"), None).unwrap();
        task.set_status(TaskStatus::InputRequired, None);

        let (again, is_new) = registry.resolve(Some("ctx"), Some(task.task_id())).unwrap();
        assert!(!is_new);
        assert!(Arc::ptr_eq(&task, &again));

        // The context id may be omitted when continuing
        assert!(registry.resolve(None, Some(task.task_id())).is_ok());
    }

    #[test]
    fn terminal_task_is_rejected() {
        let registry = TaskRegistry::new(10);
        let (task, _) = registry.resolve(Some("ctx"), None).unwrap();
        task.set_status(TaskStatus::Completed, None);

        let err = registry
            .resolve(Some("ctx"), Some(task.task_id()))
            .unwrap_err();
        assert_eq!(
            err,
            TaskError::TaskAlreadyTerminal {
                task_id: task.task_id().to_string(),
                status: TaskStatus::Completed,
            }
        );
    }

    #[test]
    fn unknown_task_and_context_mismatch() {
        let registry = TaskRegistry::new(10);
        assert!(matches!(
            registry.resolve(Some("ctx"), Some("nope")),
            Err(TaskError::TaskNotFound(_))
        ));

        let (task, _) = registry.resolve(Some("ctx"), None).unwrap();
        task.set_status(TaskStatus::InputRequired, None);
        assert!(matches!(
            registry.resolve(Some("other"), Some(task.task_id())),
            Err(TaskError::ContextMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_only_when_awaiting_input() {
        let registry = TaskRegistry::new(10);
        let (task, _) = registry.resolve(None, None).unwrap();

        task.set_status(TaskStatus::Working, None);
        let guard = task.lock().await;
        assert!(matches!(
            registry.cancel(task.task_id()),
            Err(TaskError::TaskNotCancelable { status: TaskStatus::Working, .. })
        ));
        drop(guard);

        task.set_status(TaskStatus::InputRequired, None);
        registry.cancel(task.task_id()).unwrap();
        assert_eq!(task.status(), TaskStatus::Canceled);

        assert!(matches!(
            registry.cancel(task.task_id()),
            Err(TaskError::TaskNotCancelable { status: TaskStatus::Canceled, .. })
        ));
    }

    #[test]
    fn evicts_oldest_terminal_tasks_first() {
        let registry = TaskRegistry::new(2);
        let (first, _) = registry.resolve(None, None).unwrap();
        let (second, _) = registry.resolve(None, None).unwrap();
        first.set_status(TaskStatus::Completed, None);
        second.set_status(TaskStatus::Completed, None);

        let (third, _) = registry.resolve(None, None).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get(first.task_id()).is_err());
        assert!(registry.get(second.task_id()).is_ok());
        assert!(registry.get(third.task_id()).is_ok());
    }

    #[test]
    fn live_tasks_are_never_evicted() {
        let registry = TaskRegistry::new(1);
        let (first, _) = registry.resolve(None, None).unwrap();
        first.set_status(TaskStatus::InputRequired, None);
        registry.resolve(None, None).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get(first.task_id()).is_ok());
    }

    #[tokio::test]
    async fn restore_registers_awaiting_task() {
        let registry = TaskRegistry::new(10);
        let token = ResumeToken {
            context_id: "ctx".into(),
            task_id: "t-restored".into(),
            snapshot: StateSnapshot {
                revision: 2,
                messages: vec![Message::user("hi")],
                data: serde_json::json!({}),
            },
            pending: Some(Message::agent("Name?")),
        };
        registry.restore(token);
        let (task, is_new) = registry.resolve(Some("ctx"), Some("t-restored")).unwrap();
        assert!(!is_new);
        assert_eq!(task.status(), TaskStatus::InputRequired);
        assert_eq!(task.snapshot().revision, 2);
    }
}
