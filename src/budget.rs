use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::CoreError;
use crate::events::{AppEvent, EventBus};
use crate::models::{Goal, ValidationError};
use crate::storage::{PreferenceStore, StorageError, EXPENSE_STORE, GOAL_STORE, INCOME_STORE};

const CATEGORIES_KEY: &str = "categories";
const MAX_EXPENSES_KEY: &str = "max_expenses";
const EXPENSES_KEY: &str = "expenses";
const INCOMES_KEY: &str = "incomes";
const GOAL_AMOUNT_KEY: &str = "goal_amount";
const GOAL_PERIOD_KEY: &str = "goal_period";
const WEEKLY_SAVING_KEY: &str = "weekly_saving";
const MONTHLY_SAVING_KEY: &str = "monthly_saving";
const SAVED_AMOUNTS_KEY: &str = "saved_amounts";

const NOT_SET_LABEL: &str = "not set";
const ZERO_SAVING: &str = "0.0";

pub type AmountMap = BTreeMap<String, f64>;

/// Free-text amount; anything unparsable degrades to 0.0.
pub fn parse_amount(text: &str) -> f64 {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

/// Free-text month count; anything unparsable or negative degrades to 0.
pub fn parse_period(text: &str) -> u32 {
    text.trim().parse::<u32>().unwrap_or(0)
}

pub fn format_amount(value: f64) -> String {
    format!("{value:.2}")
}

/// Weekly and monthly savings needed to reach `goal`, as display strings.
pub fn required_savings(goal: &Goal) -> (String, String) {
    if goal.period_months == 0 {
        return (ZERO_SAVING.to_string(), ZERO_SAVING.to_string());
    }
    (
        format_amount(goal.weekly_saving()),
        format_amount(goal.monthly_saving()),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryProgress {
    pub category: String,
    pub spent: f64,
    pub limit: Option<f64>,
    /// Spend over limit in percent, truncated; 0 without a positive limit.
    pub percentage: i64,
    pub limit_label: String,
}

pub fn category_progress(
    category: &str,
    spent: f64,
    limit: Option<f64>,
    currency_suffix: &str,
) -> CategoryProgress {
    let positive_limit = limit.filter(|value| *value > 0.0);
    let ratio = positive_limit.map(|value| spent / value).unwrap_or(0.0);
    let limit_label = match positive_limit {
        Some(value) => format!("{} {currency_suffix}", format_amount(value))
            .trim_end()
            .to_string(),
        None => NOT_SET_LABEL.to_string(),
    };
    CategoryProgress {
        category: category.to_string(),
        spent,
        limit,
        percentage: (ratio * 100.0) as i64,
        limit_label,
    }
}

/// Goal fields exactly as entered and stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GoalDraft {
    pub amount: String,
    pub period: String,
    pub weekly_saving: String,
    pub monthly_saving: String,
}

impl GoalDraft {
    pub fn goal(&self) -> Goal {
        Goal::new(parse_amount(&self.amount), parse_period(&self.period))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalProgress {
    pub amount: f64,
    pub period_months: u32,
    pub weekly_saving: String,
    pub monthly_saving: String,
    pub total_saved: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSummary {
    pub total_expenses: f64,
    pub total_incomes: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BudgetSnapshot {
    pub categories: Vec<String>,
    pub limits: AmountMap,
    pub expenses: AmountMap,
    pub incomes: AmountMap,
    pub goal: GoalDraft,
    pub saved_amounts: Vec<f64>,
}

/// Budget-planning view state: category limits, ledger totals, savings goal and saved amounts.
///
/// Mutators hold the snapshot lock across their store write, so concurrent
/// commands serialize instead of overwriting each other.
#[derive(Clone)]
pub struct BudgetPlanner {
    inner: Arc<Mutex<BudgetSnapshot>>,
    store: PreferenceStore,
    bus: EventBus,
    savings_issued: Arc<AtomicU64>,
    savings_written: Arc<Mutex<u64>>,
}

impl BudgetPlanner {
    pub fn new(store: PreferenceStore, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BudgetSnapshot::default())),
            store,
            bus,
            savings_issued: Arc::new(AtomicU64::new(0)),
            savings_written: Arc::new(Mutex::new(0)),
        }
    }

    pub fn load_all(&self) {
        self.load_categories();
        self.load_limits();
        self.load_expenses();
        self.load_incomes();
        self.load_goal();
        self.load_saved_amounts();
    }

    pub fn load_categories(&self) {
        let stored: Vec<String> = self.store.load(EXPENSE_STORE, CATEGORIES_KEY, Vec::new());
        let mut categories: Vec<String> = Vec::with_capacity(stored.len());
        for category in stored {
            if !categories.contains(&category) {
                categories.push(category);
            }
        }
        self.lock().categories = categories;
    }

    pub fn load_limits(&self) {
        let limits = self.store.load(EXPENSE_STORE, MAX_EXPENSES_KEY, AmountMap::new());
        self.lock().limits = limits;
    }

    /// Also the reaction to `AppEvent::ExpensesUpdated`.
    pub fn load_expenses(&self) {
        let expenses = self.store.load(EXPENSE_STORE, EXPENSES_KEY, AmountMap::new());
        log::debug!("expenses loaded categories={}", expenses.len());
        self.lock().expenses = expenses;
    }

    pub fn load_incomes(&self) {
        let incomes = self.store.load(INCOME_STORE, INCOMES_KEY, AmountMap::new());
        self.lock().incomes = incomes;
    }

    pub fn load_goal(&self) {
        let read = |key: &str| self.store.load(GOAL_STORE, key, String::new());
        let goal = GoalDraft {
            amount: read(GOAL_AMOUNT_KEY),
            period: read(GOAL_PERIOD_KEY),
            weekly_saving: read(WEEKLY_SAVING_KEY),
            monthly_saving: read(MONTHLY_SAVING_KEY),
        };
        self.lock().goal = goal;
    }

    pub fn load_saved_amounts(&self) {
        let amounts: Vec<f64> = self.store.load(GOAL_STORE, SAVED_AMOUNTS_KEY, Vec::new());
        self.lock().saved_amounts = amounts;
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        self.lock().clone()
    }

    pub fn saved_amounts(&self) -> Vec<f64> {
        self.lock().saved_amounts.clone()
    }

    pub fn goal_draft(&self) -> GoalDraft {
        self.lock().goal.clone()
    }

    /// Upserts a limit for `category` and persists the whole limit map.
    pub fn set_category_limit(&self, category: &str, amount: f64) -> Result<(), CoreError> {
        if amount.is_nan() {
            return Err(ValidationError::InvalidAmount(amount.to_string()).into());
        }
        if amount < 0.0 {
            return Err(ValidationError::NegativeAmount(amount).into());
        }
        let mut guard = self.lock();
        let mut limits = guard.limits.clone();
        limits.insert(category.to_string(), amount);
        self.store.save(EXPENSE_STORE, MAX_EXPENSES_KEY, &limits)?;
        guard.limits = limits;
        drop(guard);
        log::info!("category limit saved category={category}");
        self.bus.publish(AppEvent::LimitSaved {
            category: category.to_string(),
        });
        Ok(())
    }

    pub fn progress(&self, category: &str, currency_suffix: &str) -> CategoryProgress {
        let guard = self.lock();
        let spent = guard.expenses.get(category).copied().unwrap_or(0.0);
        let limit = guard.limits.get(category).copied();
        category_progress(category, spent, limit, currency_suffix)
    }

    /// Every known category, ascending by current spend. Ties keep stored order.
    pub fn category_rows(&self, currency_suffix: &str) -> Vec<CategoryProgress> {
        let guard = self.lock();
        let mut rows: Vec<CategoryProgress> = guard
            .categories
            .iter()
            .map(|category| {
                let spent = guard.expenses.get(category).copied().unwrap_or(0.0);
                let limit = guard.limits.get(category).copied();
                category_progress(category, spent, limit, currency_suffix)
            })
            .collect();
        rows.sort_by(|a, b| a.spent.partial_cmp(&b.spent).unwrap_or(Ordering::Equal));
        rows
    }

    /// Stores the goal as entered together with the derived weekly/monthly savings.
    pub fn set_goal(&self, amount_text: &str, period_text: &str) -> Result<GoalDraft, CoreError> {
        let mut draft = GoalDraft {
            amount: amount_text.trim().to_string(),
            period: period_text.trim().to_string(),
            ..GoalDraft::default()
        };
        let (weekly, monthly) = required_savings(&draft.goal());
        draft.weekly_saving = weekly;
        draft.monthly_saving = monthly;

        let mut guard = self.lock();
        self.store.save_many(
            GOAL_STORE,
            &[
                (GOAL_AMOUNT_KEY, Value::from(draft.amount.as_str())),
                (GOAL_PERIOD_KEY, Value::from(draft.period.as_str())),
                (WEEKLY_SAVING_KEY, Value::from(draft.weekly_saving.as_str())),
                (MONTHLY_SAVING_KEY, Value::from(draft.monthly_saving.as_str())),
            ],
        )?;
        guard.goal = draft.clone();
        drop(guard);
        log::info!("savings goal saved period={}", draft.period);
        self.bus.publish(AppEvent::GoalSaved);
        Ok(draft)
    }

    /// Recomputed from the stored goal on every call.
    pub fn required_savings(&self) -> (String, String) {
        required_savings(&self.goal_draft().goal())
    }

    pub fn goal_progress(&self) -> GoalProgress {
        let guard = self.lock();
        let goal = guard.goal.goal();
        let (weekly_saving, monthly_saving) = required_savings(&goal);
        GoalProgress {
            amount: goal.amount,
            period_months: goal.period_months,
            weekly_saving,
            monthly_saving,
            total_saved: guard.saved_amounts.iter().sum(),
            percentage: goal.progress_percentage(&guard.saved_amounts),
        }
    }

    /// Appends a saved amount. Returns `false` when the text is not a non-negative number.
    pub fn add_saved_amount(&self, text: &str) -> Result<bool, CoreError> {
        let Some(value) = parse_non_negative(text) else {
            log::debug!("saved amount ignored, not a non-negative number");
            return Ok(false);
        };
        let mut guard = self.lock();
        let mut amounts = guard.saved_amounts.clone();
        amounts.push(value);
        let generation = self.issue_savings_generation();
        persist_saved_amounts(&self.store, &self.savings_written, generation, &amounts)?;
        guard.saved_amounts = amounts.clone();
        drop(guard);
        self.bus.publish(AppEvent::SavingsChanged { amounts });
        Ok(true)
    }

    /// Out-of-range index or negative value is a no-op returning `false`.
    pub async fn update_saved_amount(&self, index: usize, value: f64) -> Result<bool, CoreError> {
        if !value.is_finite() || value < 0.0 {
            return Ok(false);
        }
        let (generation, amounts) = {
            let mut guard = self.lock();
            match guard.saved_amounts.get_mut(index) {
                Some(slot) => *slot = value,
                None => return Ok(false),
            }
            (self.issue_savings_generation(), guard.saved_amounts.clone())
        };
        self.write_saved_amounts(generation, amounts).await?;
        Ok(true)
    }

    pub async fn delete_saved_amount(&self, index: usize) -> Result<bool, CoreError> {
        let (generation, amounts) = {
            let mut guard = self.lock();
            if index >= guard.saved_amounts.len() {
                return Ok(false);
            }
            guard.saved_amounts.remove(index);
            (self.issue_savings_generation(), guard.saved_amounts.clone())
        };
        self.write_saved_amounts(generation, amounts).await?;
        Ok(true)
    }

    pub fn summary(&self) -> BudgetSummary {
        let guard = self.lock();
        let total_expenses: f64 = guard.expenses.values().sum();
        let total_incomes: f64 = guard.incomes.values().sum();
        BudgetSummary {
            total_expenses,
            total_incomes,
            balance: total_incomes - total_expenses,
        }
    }

    /// Ledger side of the expenses contract: writes the totals and announces them.
    pub fn record_ledger_expenses(&self, expenses: &AmountMap) -> Result<(), CoreError> {
        self.store.save(EXPENSE_STORE, EXPENSES_KEY, expenses)?;
        self.bus.publish(AppEvent::ExpensesUpdated);
        Ok(())
    }

    pub fn record_ledger_incomes(&self, incomes: &AmountMap) -> Result<(), CoreError> {
        self.store.save(INCOME_STORE, INCOMES_KEY, incomes)?;
        self.load_incomes();
        Ok(())
    }

    /// The in-memory list is already updated; this persists it off the caller's context.
    async fn write_saved_amounts(
        &self,
        generation: u64,
        amounts: Vec<f64>,
    ) -> Result<(), CoreError> {
        self.bus.publish(AppEvent::SavingsChanged {
            amounts: amounts.clone(),
        });
        let store = self.store.clone();
        let written = self.savings_written.clone();
        tokio::task::spawn_blocking(move || {
            persist_saved_amounts(&store, &written, generation, &amounts)
        })
        .await??;
        Ok(())
    }

    /// Call with the snapshot lock held so generations follow in-memory order.
    fn issue_savings_generation(&self) -> u64 {
        self.savings_issued.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BudgetSnapshot> {
        self.inner.lock().expect("state poisoned")
    }
}

/// Writes the saved-amount list unless a newer generation already landed.
fn persist_saved_amounts(
    store: &PreferenceStore,
    written: &Mutex<u64>,
    generation: u64,
    amounts: &[f64],
) -> Result<bool, StorageError> {
    let mut last = written.lock().expect("state poisoned");
    if generation < *last {
        log::debug!(
            "stale saved amounts write skipped generation={generation} last={}",
            *last
        );
        return Ok(false);
    }
    store.save(GOAL_STORE, SAVED_AMOUNTS_KEY, &amounts)?;
    *last = generation;
    Ok(true)
}

/// Free-text amount that must be a finite, non-negative number.
pub fn parse_non_negative(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

/// Reloads expenses whenever the ledger announces new totals. Ends when the bus closes.
pub async fn watch_expenses(mut events: broadcast::Receiver<AppEvent>, planner: BudgetPlanner) {
    loop {
        match events.recv().await {
            Ok(AppEvent::ExpensesUpdated) => planner.load_expenses(),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("expense watcher lagged skipped={skipped}");
                planner.load_expenses();
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
