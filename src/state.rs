use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::budget::BudgetPlanner;
use crate::config::Settings;
use crate::events::EventBus;
use crate::reminder::{AlarmPort, ReminderScheduler};
use crate::storage::{PreferenceStore, StorageError};
use crate::tasks::TaskBoard;

/// Owns every model the presentation layer talks to.
#[derive(Clone)]
pub struct AppState {
    store: PreferenceStore,
    bus: EventBus,
    budget: BudgetPlanner,
    tasks: TaskBoard,
    settings: Arc<Mutex<Settings>>,
}

impl AppState {
    pub fn open(root: PathBuf, port: Arc<dyn AlarmPort>) -> Result<Self, StorageError> {
        let store = PreferenceStore::new(root);
        store.ensure_dirs()?;
        Ok(Self::with_store(store, port, EventBus::new()))
    }

    /// Builds the models over `store` and loads everything it holds.
    pub fn with_store(store: PreferenceStore, port: Arc<dyn AlarmPort>, bus: EventBus) -> Self {
        let settings = Settings::load(&store).normalized();
        let budget = BudgetPlanner::new(store.clone(), bus.clone());
        let tasks = TaskBoard::new(store.clone(), ReminderScheduler::new(port), bus.clone());
        budget.load_all();
        tasks.load();
        log::info!("app state opened root={}", store.root().display());
        Self {
            store,
            bus,
            budget,
            tasks,
            settings: Arc::new(Mutex::new(settings)),
        }
    }

    pub fn store(&self) -> &PreferenceStore {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn budget(&self) -> &BudgetPlanner {
        &self.budget
    }

    pub fn tasks(&self) -> &TaskBoard {
        &self.tasks
    }

    pub fn settings(&self) -> Settings {
        self.settings.lock().expect("state poisoned").clone()
    }

    /// Persists first; the in-memory copy only changes when the write succeeded.
    pub fn update_settings(&self, settings: Settings) -> Result<Settings, StorageError> {
        let settings = settings.normalized();
        settings.save(&self.store)?;
        *self.settings.lock().expect("state poisoned") = settings.clone();
        Ok(settings)
    }
}
