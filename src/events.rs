use tokio::sync::broadcast;

use crate::models::Task;
use crate::reminder::ReminderPayload;

pub const EVENT_EXPENSES_UPDATED: &str = "expenses_updated";
pub const EVENT_LIMIT_SAVED: &str = "limit_saved";
pub const EVENT_GOAL_SAVED: &str = "goal_saved";
pub const EVENT_SAVINGS_CHANGED: &str = "savings_changed";
pub const EVENT_TASKS_CHANGED: &str = "tasks_changed";
pub const EVENT_REMINDER: &str = "reminder_fired";

const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// The ledger wrote new expense totals; budget views should reload them.
    ExpensesUpdated,
    LimitSaved { category: String },
    GoalSaved,
    SavingsChanged { amounts: Vec<f64> },
    TasksChanged { tasks: Vec<Task> },
    ReminderFired { payload: ReminderPayload },
}

impl AppEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::ExpensesUpdated => EVENT_EXPENSES_UPDATED,
            AppEvent::LimitSaved { .. } => EVENT_LIMIT_SAVED,
            AppEvent::GoalSaved => EVENT_GOAL_SAVED,
            AppEvent::SavingsChanged { .. } => EVENT_SAVINGS_CHANGED,
            AppEvent::TasksChanged { .. } => EVENT_TASKS_CHANGED,
            AppEvent::ReminderFired { .. } => EVENT_REMINDER,
        }
    }
}

/// Publish/subscribe channel shared by the models and the presentation layer.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Returns how many subscribers received the event. Publishing with no subscriber is fine.
    pub fn publish(&self, event: AppEvent) -> usize {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => {
                log::debug!("event published name={name} receivers={receivers}");
                receivers
            }
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
