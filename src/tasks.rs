use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::CoreError;
use crate::events::{AppEvent, EventBus};
use crate::models::{Task, Timestamp, ValidationError};
use crate::reminder::ReminderScheduler;
use crate::storage::{PreferenceStore, TASK_STORE};

const TASKS_KEY: &str = "tasks";

/// Task list view state. Every mutation persists the full list while holding
/// the list lock, so concurrent commands never drop each other's edits.
#[derive(Clone)]
pub struct TaskBoard {
    inner: Arc<Mutex<Vec<Task>>>,
    store: PreferenceStore,
    scheduler: ReminderScheduler,
    bus: EventBus,
}

impl TaskBoard {
    pub fn new(store: PreferenceStore, scheduler: ReminderScheduler, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
            store,
            scheduler,
            bus,
        }
    }

    /// Replaces the in-memory list with the stored one. Unreadable data loads as empty.
    pub fn load(&self) -> usize {
        let mut guard = self.lock();
        let tasks: Vec<Task> = self.store.load(TASK_STORE, TASKS_KEY, Vec::new());
        let count = tasks.len();
        *guard = tasks;
        log::info!("tasks loaded count={count}");
        count
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.lock().clone()
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.lock().iter().find(|task| task.id == task_id).cloned()
    }

    /// Persists the task, then registers its reminders. A refused alarm is
    /// logged; the task stays saved.
    pub fn add(&self, task: Task, now: Timestamp) -> Result<Task, CoreError> {
        if task.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }
        {
            let mut guard = self.lock();
            let mut tasks = guard.clone();
            tasks.push(task.clone());
            self.commit(&mut guard, tasks)?;
        }
        if !task.completed {
            self.schedule(&task, now);
        }
        Ok(task)
    }

    /// Replaces the task with the same id; unknown ids are ignored.
    pub fn update(&self, task: Task, now: Timestamp) -> Result<bool, CoreError> {
        if task.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }
        {
            let mut guard = self.lock();
            let mut tasks = guard.clone();
            let Some(existing) = tasks.iter_mut().find(|t| t.id == task.id) else {
                log::debug!("update ignored, task not found id={}", task.id);
                return Ok(false);
            };
            *existing = task.clone();
            self.commit(&mut guard, tasks)?;
        }
        if task.completed {
            self.cancel(&task.id);
        } else {
            self.schedule(&task, now);
        }
        Ok(true)
    }

    /// Cancels pending reminders and drops the task. Returns whether it existed.
    pub fn remove(&self, task_id: &str) -> Result<bool, CoreError> {
        self.scheduler
            .cancel(task_id)
            .map_err(CoreError::Reminder)?;
        let mut guard = self.lock();
        let mut tasks = guard.clone();
        let before = tasks.len();
        tasks.retain(|task| task.id != task_id);
        if tasks.len() == before {
            return Ok(false);
        }
        self.commit(&mut guard, tasks)?;
        log::info!("task removed id={task_id}");
        Ok(true)
    }

    /// Flips completion. Completing cancels reminders; reopening does not re-register them.
    pub fn toggle_completion(&self, task_id: &str) -> Result<Option<Task>, CoreError> {
        let toggled = {
            let mut guard = self.lock();
            let mut tasks = guard.clone();
            let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) else {
                return Ok(None);
            };
            task.completed = !task.completed;
            let toggled = task.clone();
            self.commit(&mut guard, tasks)?;
            toggled
        };
        if toggled.completed {
            self.cancel(&toggled.id);
        }
        Ok(Some(toggled))
    }

    pub fn has_overdue(&self, now: Timestamp) -> bool {
        self.lock().iter().any(|task| task.is_overdue(now))
    }

    pub fn overdue_tasks(&self, now: Timestamp) -> Vec<Task> {
        self.lock()
            .iter()
            .filter(|task| task.is_overdue(now))
            .cloned()
            .collect()
    }

    /// Saves `tasks` and only then swaps them into `guard`.
    fn commit(
        &self,
        guard: &mut MutexGuard<'_, Vec<Task>>,
        tasks: Vec<Task>,
    ) -> Result<(), CoreError> {
        self.store.save(TASK_STORE, TASKS_KEY, &tasks)?;
        **guard = tasks.clone();
        self.bus.publish(AppEvent::TasksChanged { tasks });
        Ok(())
    }

    fn schedule(&self, task: &Task, now: Timestamp) {
        if let Err(error) = self.scheduler.schedule(task, now) {
            log::error!(
                "reminder registration failed task_id={} error={error}",
                task.id
            );
        }
    }

    fn cancel(&self, task_id: &str) {
        if let Err(error) = self.scheduler.cancel(task_id) {
            log::error!("reminder cancel failed task_id={task_id} error={error}");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Task>> {
        self.inner.lock().expect("state poisoned")
    }
}
