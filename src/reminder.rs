use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::models::{Task, Timestamp};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Start,
    Reminder,
    Other,
}

impl ReminderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderKind::Start => "start",
            ReminderKind::Reminder => "reminder",
            ReminderKind::Other => "other",
        }
    }
}

/// Identity of one scheduled alarm. A task owns at most one alarm per kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub struct AlarmKey {
    pub task_id: String,
    pub kind: ReminderKind,
}

impl AlarmKey {
    pub fn start(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            kind: ReminderKind::Start,
        }
    }

    pub fn reminder(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            kind: ReminderKind::Reminder,
        }
    }

    /// Integer id for wake services that only accept `i32`, hashed over `<task_id>:<kind>`.
    pub fn request_code(&self) -> i32 {
        request_code(&format!("{}:{}", self.task_id, self.kind.as_str()))
    }
}

/// Everything needed to notify at fire time. The owning model may not be loaded by then.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ReminderPayload {
    pub task_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: ReminderKind,
    #[serde(default)]
    pub remaining: String,
}

impl ReminderPayload {
    pub fn message(&self) -> String {
        match self.kind {
            ReminderKind::Start => self.title.clone(),
            ReminderKind::Reminder => {
                format!("Task \"{}\" starts in {}", self.title, self.remaining)
            }
            ReminderKind::Other => format!("Reminder for task \"{}\"", self.title),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub key: AlarmKey,
    pub fire_at: Timestamp,
    pub payload: ReminderPayload,
}

/// Platform scheduled-wake service. Registering an existing key replaces it;
/// cancelling touches only that key.
pub trait AlarmPort: Send + Sync {
    fn register(
        &self,
        key: &AlarmKey,
        fire_at: Timestamp,
        payload: ReminderPayload,
    ) -> Result<(), String>;
    fn cancel(&self, key: &AlarmKey) -> Result<(), String>;
}

/// Platform notification service used when an alarm fires.
pub trait NotificationSink: Send + Sync {
    fn permission_granted(&self) -> bool;
    fn request_permission(&self);
    fn show(&self, title: &str, body: &str) -> Result<(), String>;
    fn vibrate(&self, duration_ms: u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    PermissionRequested,
    Failed,
}

/// Stable across processes: 31-polynomial over UTF-16 code units, wrapping at `i32`.
pub fn request_code(task_id: &str) -> i32 {
    task_id
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Start trigger always; offset trigger when the task has a reminder policy.
pub fn plan_triggers(task: &Task) -> Vec<Trigger> {
    let mut triggers = vec![Trigger {
        key: AlarmKey::start(&task.id),
        fire_at: task.start_at,
        payload: ReminderPayload {
            task_id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            kind: ReminderKind::Start,
            remaining: String::new(),
        },
    }];
    if let Some(offset) = task.reminder.offset_secs() {
        triggers.push(Trigger {
            key: AlarmKey::reminder(&task.id),
            fire_at: task.start_at - offset,
            payload: ReminderPayload {
                task_id: task.id.clone(),
                title: task.title.clone(),
                description: task.description.clone(),
                kind: ReminderKind::Reminder,
                remaining: task.reminder.remaining_label().to_string(),
            },
        });
    }
    triggers
}

pub fn deliver(
    payload: &ReminderPayload,
    sink: &dyn NotificationSink,
    settings: &Settings,
) -> DeliveryOutcome {
    if !sink.permission_granted() {
        log::info!(
            "notification permission missing, requesting task_id={}",
            payload.task_id
        );
        sink.request_permission();
        return DeliveryOutcome::PermissionRequested;
    }
    if let Err(error) = sink.show(&settings.notification_title, &payload.message()) {
        log::error!(
            "notification failed task_id={} error={error}",
            payload.task_id
        );
        return DeliveryOutcome::Failed;
    }
    sink.vibrate(settings.vibration_ms);
    DeliveryOutcome::Delivered
}

/// Registers and cancels the start and offset alarms of a task.
#[derive(Clone)]
pub struct ReminderScheduler {
    port: Arc<dyn AlarmPort>,
}

impl ReminderScheduler {
    pub fn new(port: Arc<dyn AlarmPort>) -> Self {
        Self { port }
    }

    /// Replaces any earlier registration for the task. Triggers at or before `now` are skipped.
    pub fn schedule(&self, task: &Task, now: Timestamp) -> Result<usize, String> {
        self.cancel(&task.id)?;
        let mut registered = 0;
        for trigger in plan_triggers(task) {
            if trigger.fire_at <= now {
                log::debug!(
                    "skipping past trigger task_id={} kind={:?}",
                    task.id,
                    trigger.payload.kind
                );
                continue;
            }
            self.port
                .register(&trigger.key, trigger.fire_at, trigger.payload)?;
            registered += 1;
        }
        log::info!("reminders scheduled task_id={} count={registered}", task.id);
        Ok(registered)
    }

    pub fn cancel(&self, task_id: &str) -> Result<(), String> {
        self.port.cancel(&AlarmKey::start(task_id))?;
        self.port.cancel(&AlarmKey::reminder(task_id))?;
        Ok(())
    }
}
