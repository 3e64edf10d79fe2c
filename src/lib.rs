//! Home budgeting core: category limits, a savings goal and task reminders over
//! per-store preference documents. The `app` feature exposes it as a Tauri plugin.

pub mod budget;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod reminder;
pub mod scheduler;
pub mod state;
pub mod storage;
pub mod tasks;

#[cfg(all(feature = "app", not(test)))]
pub mod platform;

pub use budget::BudgetPlanner;
pub use config::Settings;
pub use error::CoreError;
pub use events::{AppEvent, EventBus};
pub use models::{Goal, ReminderPolicy, Task};
pub use reminder::{AlarmPort, NotificationSink, ReminderScheduler};
pub use scheduler::LocalAlarmClock;
pub use state::AppState;
pub use storage::PreferenceStore;
pub use tasks::TaskBoard;

#[cfg(all(feature = "app", not(test)))]
pub use platform::init;
