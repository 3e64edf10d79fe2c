use serde::{Deserialize, Serialize};

/// Unix timestamp in seconds.
pub type Timestamp = i64;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("task title must not be empty")]
    EmptyTitle,
    #[error("amount must not be negative: {0}")]
    NegativeAmount(f64),
    #[error("amount is not a number: {0:?}")]
    InvalidAmount(String),
}

/// How long before a task starts the second notification fires.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReminderPolicy {
    None,
    #[default]
    TenMinutes,
    ThirtyMinutes,
    OneHour,
    OneDay,
    OneWeek,
}

impl ReminderPolicy {
    pub const ALL: [ReminderPolicy; 6] = [
        ReminderPolicy::None,
        ReminderPolicy::TenMinutes,
        ReminderPolicy::ThirtyMinutes,
        ReminderPolicy::OneHour,
        ReminderPolicy::OneDay,
        ReminderPolicy::OneWeek,
    ];

    /// Offset in seconds before the start instant, `None` when no reminder is wanted.
    pub fn offset_secs(self) -> Option<i64> {
        match self {
            ReminderPolicy::None => None,
            ReminderPolicy::TenMinutes => Some(10 * MINUTE),
            ReminderPolicy::ThirtyMinutes => Some(30 * MINUTE),
            ReminderPolicy::OneHour => Some(HOUR),
            ReminderPolicy::OneDay => Some(DAY),
            ReminderPolicy::OneWeek => Some(7 * DAY),
        }
    }

    /// Human-readable remaining time carried in the reminder payload.
    pub fn remaining_label(self) -> &'static str {
        match self {
            ReminderPolicy::None => "",
            ReminderPolicy::TenMinutes => "10 minutes",
            ReminderPolicy::ThirtyMinutes => "half an hour",
            ReminderPolicy::OneHour => "an hour",
            ReminderPolicy::OneDay => "a day",
            ReminderPolicy::OneWeek => "a week",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_at: Timestamp,
    pub end_at: Timestamp,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub reminder: ReminderPolicy,
}

impl Task {
    pub fn new(
        title: &str,
        description: Option<String>,
        start_at: Timestamp,
        end_at: Timestamp,
        reminder: ReminderPolicy,
    ) -> Result<Self, ValidationError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        let description = description
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        let task = Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            description,
            start_at,
            end_at,
            completed: false,
            reminder,
        };
        if task.has_inverted_range() {
            log::warn!("task created with end before start id={}", task.id);
        }
        Ok(task)
    }

    pub fn is_overdue(&self, now: Timestamp) -> bool {
        !self.completed && self.end_at < now
    }

    /// End before start is accepted and only reported.
    pub fn has_inverted_range(&self) -> bool {
        self.end_at < self.start_at
    }
}

/// Savings goal: a target amount over a number of months.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Goal {
    pub amount: f64,
    pub period_months: u32,
}

impl Goal {
    pub fn new(amount: f64, period_months: u32) -> Self {
        Self {
            amount: amount.max(0.0),
            period_months,
        }
    }

    pub fn monthly_saving(&self) -> f64 {
        if self.period_months == 0 {
            return 0.0;
        }
        self.amount / f64::from(self.period_months)
    }

    pub fn weekly_saving(&self) -> f64 {
        if self.period_months == 0 {
            return 0.0;
        }
        self.amount / (f64::from(self.period_months) * 4.0)
    }

    /// Percentage of the target already saved; 0 when the target is not positive.
    pub fn progress_percentage(&self, saved_amounts: &[f64]) -> f64 {
        if self.amount <= 0.0 {
            return 0.0;
        }
        let total: f64 = saved_amounts.iter().sum();
        total / self.amount * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reminder_policy_offsets_match_labels() {
        assert_eq!(ReminderPolicy::None.offset_secs(), None);
        assert_eq!(ReminderPolicy::TenMinutes.offset_secs(), Some(600));
        assert_eq!(ReminderPolicy::ThirtyMinutes.offset_secs(), Some(1800));
        assert_eq!(ReminderPolicy::OneHour.offset_secs(), Some(3600));
        assert_eq!(ReminderPolicy::OneDay.offset_secs(), Some(86_400));
        assert_eq!(ReminderPolicy::OneWeek.offset_secs(), Some(604_800));

        for policy in ReminderPolicy::ALL {
            assert_eq!(
                policy.offset_secs().is_some(),
                !policy.remaining_label().is_empty()
            );
        }
    }

    #[test]
    fn reminder_policy_serializes_as_snake_case() {
        let value = serde_json::to_value(ReminderPolicy::ThirtyMinutes).unwrap();
        assert_eq!(value, serde_json::json!("thirty_minutes"));
        let back: ReminderPolicy = serde_json::from_value(serde_json::json!("one_week")).unwrap();
        assert_eq!(back, ReminderPolicy::OneWeek);
        assert_eq!(ReminderPolicy::default(), ReminderPolicy::TenMinutes);
    }

    #[test]
    fn new_task_trims_title_and_generates_unique_ids() {
        let a = Task::new("  Pay rent ", Some("  ".into()), 10, 20, ReminderPolicy::OneDay)
            .expect("valid task");
        let b = Task::new("Pay rent", None, 10, 20, ReminderPolicy::OneDay).expect("valid task");
        assert_eq!(a.title, "Pay rent");
        assert_eq!(a.description, None);
        assert!(!a.completed);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn new_task_rejects_blank_title() {
        let err = Task::new("   ", None, 0, 0, ReminderPolicy::None).unwrap_err();
        assert_eq!(err, ValidationError::EmptyTitle);
    }

    #[test]
    fn inverted_range_is_accepted_but_reported() {
        let task = Task::new("x", None, 100, 50, ReminderPolicy::None).unwrap();
        assert!(task.has_inverted_range());
    }

    #[test]
    fn overdue_requires_incomplete_and_past_end() {
        let mut task = Task::new("x", None, 0, 100, ReminderPolicy::None).unwrap();
        assert!(task.is_overdue(101));
        assert!(!task.is_overdue(100));
        task.completed = true;
        assert!(!task.is_overdue(101));
    }

    #[test]
    fn task_missing_optional_fields_uses_defaults() {
        let json = r#"
        {
          "id": "t1",
          "title": "task",
          "start_at": 10,
          "end_at": 20
        }
        "#;
        let task: Task = serde_json::from_str(json).expect("task should deserialize");
        assert_eq!(task.description, None);
        assert!(!task.completed);
        assert_eq!(task.reminder, ReminderPolicy::TenMinutes);
    }

    #[test]
    fn goal_required_savings() {
        let goal = Goal::new(1200.0, 6);
        assert_eq!(goal.monthly_saving(), 200.0);
        assert_eq!(goal.weekly_saving(), 50.0);

        let zero = Goal::new(1200.0, 0);
        assert_eq!(zero.monthly_saving(), 0.0);
        assert_eq!(zero.weekly_saving(), 0.0);
    }

    #[test]
    fn goal_progress_percentage() {
        let goal = Goal::new(1000.0, 10);
        assert_eq!(goal.progress_percentage(&[100.0, 150.0]), 25.0);
        assert_eq!(goal.progress_percentage(&[]), 0.0);
        assert_eq!(Goal::new(0.0, 10).progress_percentage(&[50.0]), 0.0);
        assert_eq!(Goal::new(-5.0, 10).progress_percentage(&[50.0]), 0.0);
    }
}
