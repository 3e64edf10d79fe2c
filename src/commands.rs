#[cfg(all(feature = "app", not(test)))]
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::budget::{
    parse_amount, parse_non_negative, BudgetSummary, CategoryProgress, GoalDraft, GoalProgress,
};
use crate::config::Settings;
use crate::models::{ReminderPolicy, Task, Timestamp};
use crate::state::AppState;

#[cfg(all(feature = "app", not(test)))]
use tauri::State;

#[derive(Debug, Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
    }
}

fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message.to_string()),
    }
}

/// Everything the budget screen renders.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetView {
    pub rows: Vec<CategoryProgress>,
    pub goal: GoalDraft,
    pub progress: GoalProgress,
    pub saved_amounts: Vec<f64>,
    pub summary: BudgetSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskListView {
    pub tasks: Vec<Task>,
    pub has_overdue: bool,
}

/// Task fields as entered in the edit dialog.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_at: Timestamp,
    pub end_at: Timestamp,
    #[serde(default)]
    pub reminder: Option<ReminderPolicy>,
}

fn budget_view(state: &AppState) -> BudgetView {
    let budget = state.budget();
    let settings = state.settings();
    BudgetView {
        rows: budget.category_rows(&settings.currency_suffix),
        goal: budget.goal_draft(),
        progress: budget.goal_progress(),
        saved_amounts: budget.saved_amounts(),
        summary: budget.summary(),
    }
}

pub fn load_budget_impl(state: &AppState) -> CommandResult<BudgetView> {
    state.budget().load_all();
    ok(budget_view(state))
}

pub fn set_category_limit_impl(
    state: &AppState,
    category: String,
    amount: String,
) -> CommandResult<BudgetView> {
    let amount = parse_amount(&amount);
    if let Err(error) = state.budget().set_category_limit(&category, amount) {
        return err(&error.to_string());
    }
    ok(budget_view(state))
}

pub fn set_goal_impl(state: &AppState, amount: String, period: String) -> CommandResult<BudgetView> {
    if let Err(error) = state.budget().set_goal(&amount, &period) {
        return err(&error.to_string());
    }
    ok(budget_view(state))
}

pub fn add_saved_amount_impl(state: &AppState, amount: String) -> CommandResult<Vec<f64>> {
    match state.budget().add_saved_amount(&amount) {
        Ok(_) => ok(state.budget().saved_amounts()),
        Err(error) => err(&error.to_string()),
    }
}

pub async fn update_saved_amount_impl(
    state: &AppState,
    index: usize,
    amount: String,
) -> CommandResult<Vec<f64>> {
    // Unparsable edits leave the entry as it was.
    let Some(amount) = parse_non_negative(&amount) else {
        return ok(state.budget().saved_amounts());
    };
    match state.budget().update_saved_amount(index, amount).await {
        Ok(_) => ok(state.budget().saved_amounts()),
        Err(error) => err(&error.to_string()),
    }
}

pub async fn delete_saved_amount_impl(state: &AppState, index: usize) -> CommandResult<Vec<f64>> {
    match state.budget().delete_saved_amount(index).await {
        Ok(_) => ok(state.budget().saved_amounts()),
        Err(error) => err(&error.to_string()),
    }
}

pub fn load_tasks_impl(state: &AppState, now: Timestamp) -> CommandResult<TaskListView> {
    state.tasks().load();
    ok(TaskListView {
        tasks: state.tasks().tasks(),
        has_overdue: state.tasks().has_overdue(now),
    })
}

pub fn create_task_impl(state: &AppState, input: TaskInput, now: Timestamp) -> CommandResult<Task> {
    let reminder = input
        .reminder
        .unwrap_or_else(|| state.settings().default_reminder);
    let task = match Task::new(
        &input.title,
        input.description,
        input.start_at,
        input.end_at,
        reminder,
    ) {
        Ok(task) => task,
        Err(error) => return err(&format!("validation error: {error}")),
    };
    match state.tasks().add(task, now) {
        Ok(task) => ok(task),
        Err(error) => err(&error.to_string()),
    }
}

pub fn update_task_impl(state: &AppState, task: Task, now: Timestamp) -> CommandResult<bool> {
    match state.tasks().update(task, now) {
        Ok(updated) => ok(updated),
        Err(error) => err(&error.to_string()),
    }
}

pub fn delete_task_impl(state: &AppState, task_id: String) -> CommandResult<bool> {
    match state.tasks().remove(&task_id) {
        Ok(removed) => ok(removed),
        Err(error) => err(&error.to_string()),
    }
}

pub fn toggle_task_impl(state: &AppState, task_id: String) -> CommandResult<Task> {
    match state.tasks().toggle_completion(&task_id) {
        Ok(Some(task)) => ok(task),
        Ok(None) => err("task not found"),
        Err(error) => err(&error.to_string()),
    }
}

pub fn has_overdue_impl(state: &AppState, now: Timestamp) -> CommandResult<bool> {
    ok(state.tasks().has_overdue(now))
}

pub fn load_settings_impl(state: &AppState) -> CommandResult<Settings> {
    ok(state.settings())
}

pub fn update_settings_impl(state: &AppState, settings: Settings) -> CommandResult<Settings> {
    match state.update_settings(settings) {
        Ok(saved) => ok(saved),
        Err(error) => err(&format!("storage error: {error}")),
    }
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn load_budget(state: State<'_, AppState>) -> CommandResult<BudgetView> {
    load_budget_impl(state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn set_category_limit(
    state: State<'_, AppState>,
    category: String,
    amount: String,
) -> CommandResult<BudgetView> {
    set_category_limit_impl(state.inner(), category, amount)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn set_goal(
    state: State<'_, AppState>,
    amount: String,
    period: String,
) -> CommandResult<BudgetView> {
    set_goal_impl(state.inner(), amount, period)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn add_saved_amount(state: State<'_, AppState>, amount: String) -> CommandResult<Vec<f64>> {
    add_saved_amount_impl(state.inner(), amount)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub async fn update_saved_amount(
    state: State<'_, AppState>,
    index: usize,
    amount: String,
) -> Result<CommandResult<Vec<f64>>, String> {
    Ok(update_saved_amount_impl(state.inner(), index, amount).await)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub async fn delete_saved_amount(
    state: State<'_, AppState>,
    index: usize,
) -> Result<CommandResult<Vec<f64>>, String> {
    Ok(delete_saved_amount_impl(state.inner(), index).await)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn load_tasks(state: State<'_, AppState>) -> CommandResult<TaskListView> {
    load_tasks_impl(state.inner(), Utc::now().timestamp())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn create_task(state: State<'_, AppState>, input: TaskInput) -> CommandResult<Task> {
    create_task_impl(state.inner(), input, Utc::now().timestamp())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn update_task(state: State<'_, AppState>, task: Task) -> CommandResult<bool> {
    update_task_impl(state.inner(), task, Utc::now().timestamp())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn delete_task(state: State<'_, AppState>, task_id: String) -> CommandResult<bool> {
    delete_task_impl(state.inner(), task_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn toggle_task(state: State<'_, AppState>, task_id: String) -> CommandResult<Task> {
    toggle_task_impl(state.inner(), task_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn has_overdue(state: State<'_, AppState>) -> CommandResult<bool> {
    has_overdue_impl(state.inner(), Utc::now().timestamp())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn load_settings(state: State<'_, AppState>) -> CommandResult<Settings> {
    load_settings_impl(state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn update_settings(state: State<'_, AppState>, settings: Settings) -> CommandResult<Settings> {
    update_settings_impl(state.inner(), settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminder::testing::{RecordingPort, RejectingPort};
    use crate::reminder::AlarmKey;
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000;

    fn make_state() -> (tempfile::TempDir, AppState, Arc<RecordingPort>) {
        let dir = tempfile::tempdir().unwrap();
        let port = Arc::new(RecordingPort::default());
        let state = AppState::open(dir.path().to_path_buf(), port.clone()).unwrap();
        (dir, state, port)
    }

    fn input(title: &str, start_at: i64, end_at: i64) -> TaskInput {
        TaskInput {
            title: title.to_string(),
            description: None,
            start_at,
            end_at,
            reminder: None,
        }
    }

    #[test]
    fn ok_and_err_helpers_construct_expected_shape() {
        let r = ok(123);
        assert!(r.ok);
        assert_eq!(r.data, Some(123));
        assert_eq!(r.error, None);

        let r: CommandResult<i32> = err("nope");
        assert!(!r.ok);
        assert_eq!(r.data, None);
        assert_eq!(r.error, Some("nope".to_string()));
    }

    #[test]
    fn budget_commands_cover_limits_goal_and_labels() {
        let (_dir, state, _port) = make_state();
        state
            .store()
            .save(
                crate::storage::EXPENSE_STORE,
                "categories",
                &vec!["Food", "Transport"],
            )
            .unwrap();
        let mut expenses = crate::budget::AmountMap::new();
        expenses.insert("Food".into(), 250.0);
        state.budget().record_ledger_expenses(&expenses).unwrap();

        let view = load_budget_impl(&state).data.unwrap();
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.rows[0].category, "Transport");
        assert_eq!(view.rows[1].limit_label, "not set");

        let view = set_category_limit_impl(&state, "Food".into(), "1000".into())
            .data
            .unwrap();
        let food = view.rows.iter().find(|row| row.category == "Food").unwrap();
        assert_eq!(food.percentage, 25);
        assert_eq!(food.limit_label, "1000.00 UAH");

        let view = set_goal_impl(&state, "1200".into(), "6".into()).data.unwrap();
        assert_eq!(view.goal.monthly_saving, "200.00");
        assert_eq!(view.progress.weekly_saving, "50.00");
    }

    #[test]
    fn unparsable_limit_degrades_to_zero() {
        let (_dir, state, _port) = make_state();
        let result = set_category_limit_impl(&state, "Food".into(), "lots".into());
        assert!(result.ok);
        assert_eq!(state.budget().snapshot().limits.get("Food"), Some(&0.0));

        let result = set_category_limit_impl(&state, "Food".into(), "-10".into());
        assert!(!result.ok);
        assert!(result.error.unwrap().starts_with("validation error"));
    }

    #[tokio::test]
    async fn saved_amount_commands() {
        let (_dir, state, _port) = make_state();
        assert_eq!(
            add_saved_amount_impl(&state, "10".into()).data.unwrap(),
            vec![10.0]
        );
        assert_eq!(
            add_saved_amount_impl(&state, "x".into()).data.unwrap(),
            vec![10.0]
        );
        add_saved_amount_impl(&state, "20".into());

        let updated = update_saved_amount_impl(&state, 0, "15".into()).await;
        assert_eq!(updated.data.unwrap(), vec![15.0, 20.0]);
        let unparsable = update_saved_amount_impl(&state, 0, "abc".into()).await;
        assert!(unparsable.ok);
        assert_eq!(unparsable.data.unwrap(), vec![15.0, 20.0]);
        let stored: Vec<f64> = state
            .store()
            .load(crate::storage::GOAL_STORE, "saved_amounts", Vec::new());
        assert_eq!(stored, vec![15.0, 20.0]);
        let deleted = delete_saved_amount_impl(&state, 9).await;
        assert_eq!(deleted.data.unwrap(), vec![15.0, 20.0]);
        let deleted = delete_saved_amount_impl(&state, 1).await;
        assert_eq!(deleted.data.unwrap(), vec![15.0]);
    }

    #[test]
    fn task_commands_cover_create_toggle_delete() {
        let (_dir, state, port) = make_state();

        let bad = create_task_impl(&state, input("  ", NOW + 10, NOW + 20), NOW);
        assert!(!bad.ok);
        assert_eq!(
            bad.error.as_deref(),
            Some("validation error: task title must not be empty")
        );

        let task = create_task_impl(&state, input("Dentist", NOW + 7200, NOW + 9000), NOW)
            .data
            .unwrap();
        assert_eq!(task.reminder, ReminderPolicy::TenMinutes);
        assert_eq!(
            port.keys(),
            vec![AlarmKey::start(&task.id), AlarmKey::reminder(&task.id)]
        );

        let toggled = toggle_task_impl(&state, task.id.clone()).data.unwrap();
        assert!(toggled.completed);
        assert!(port.keys().is_empty());

        let missing = toggle_task_impl(&state, "missing".into());
        assert_eq!(missing.error.as_deref(), Some("task not found"));

        assert_eq!(delete_task_impl(&state, task.id.clone()).data, Some(true));
        assert_eq!(delete_task_impl(&state, task.id).data, Some(false));
    }

    #[test]
    fn create_reports_success_when_alarm_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::open(dir.path().to_path_buf(), Arc::new(RejectingPort)).unwrap();

        let created = create_task_impl(&state, input("Dentist", NOW + 7200, NOW + 9000), NOW);
        assert!(created.ok);
        assert_eq!(load_tasks_impl(&state, NOW).data.unwrap().tasks.len(), 1);
    }

    #[test]
    fn update_and_overdue_commands() {
        let (_dir, state, _port) = make_state();
        let task = create_task_impl(&state, input("Bills", NOW - 7200, NOW - 3600), NOW)
            .data
            .unwrap();

        let view = load_tasks_impl(&state, NOW).data.unwrap();
        assert_eq!(view.tasks.len(), 1);
        assert!(view.has_overdue);

        let mut edited = task.clone();
        edited.end_at = NOW + 3600;
        assert_eq!(update_task_impl(&state, edited, NOW).data, Some(true));
        assert_eq!(has_overdue_impl(&state, NOW).data, Some(false));

        let mut unknown = task;
        unknown.id = "unknown".into();
        assert_eq!(update_task_impl(&state, unknown, NOW).data, Some(false));
    }

    #[test]
    fn settings_commands_round_trip() {
        let (_dir, state, _port) = make_state();
        let mut settings = load_settings_impl(&state).data.unwrap();
        settings.default_reminder = ReminderPolicy::OneWeek;
        let saved = update_settings_impl(&state, settings).data.unwrap();
        assert_eq!(saved.default_reminder, ReminderPolicy::OneWeek);

        let task = create_task_impl(&state, input("Trip", NOW + 900_000, NOW + 990_000), NOW)
            .data
            .unwrap();
        assert_eq!(task.reminder, ReminderPolicy::OneWeek);
    }
}
