use serde::{Deserialize, Serialize};

use crate::models::ReminderPolicy;
use crate::storage::{PreferenceStore, StorageError, SETTINGS_STORE};

const SETTINGS_KEY: &str = "settings";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(default = "default_notification_title")]
    pub notification_title: String,
    #[serde(default = "default_vibration_ms")]
    pub vibration_ms: u64,
    #[serde(default = "default_alarm_poll_secs")]
    pub alarm_poll_secs: u64,
    #[serde(default)]
    pub default_reminder: ReminderPolicy,
    #[serde(default = "default_currency_suffix")]
    pub currency_suffix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            notification_title: default_notification_title(),
            vibration_ms: default_vibration_ms(),
            alarm_poll_secs: default_alarm_poll_secs(),
            default_reminder: ReminderPolicy::default(),
            currency_suffix: default_currency_suffix(),
        }
    }
}

impl Settings {
    pub fn load(store: &PreferenceStore) -> Self {
        store.load(SETTINGS_STORE, SETTINGS_KEY, Settings::default())
    }

    pub fn save(&self, store: &PreferenceStore) -> Result<(), StorageError> {
        store.save(SETTINGS_STORE, SETTINGS_KEY, self)?;
        Ok(())
    }

    /// Clamps values the alarm loop cannot work with.
    pub fn normalized(mut self) -> Self {
        if self.alarm_poll_secs == 0 {
            self.alarm_poll_secs = default_alarm_poll_secs();
        }
        self.notification_title = self.notification_title.trim().to_string();
        if self.notification_title.is_empty() {
            self.notification_title = default_notification_title();
        }
        self.currency_suffix = self.currency_suffix.trim().to_string();
        self
    }
}

fn default_notification_title() -> String {
    "Reminder".to_string()
}

fn default_vibration_ms() -> u64 {
    500
}

fn default_alarm_poll_secs() -> u64 {
    1
}

fn default_currency_suffix() -> String {
    "UAH".to_string()
}
