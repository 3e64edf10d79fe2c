use std::sync::Arc;

use tauri::plugin::{Builder, TauriPlugin};
use tauri::{AppHandle, Emitter, Manager, Runtime};
use tauri_plugin_notification::{NotificationExt, PermissionState};

use crate::budget::watch_expenses;
use crate::commands::*;
use crate::events::EventBus;
use crate::logging::init_logging;
use crate::reminder::NotificationSink;
use crate::scheduler::{run_alarm_loop, LocalAlarmClock};
use crate::state::AppState;
use crate::storage::PreferenceStore;

pub const PLUGIN_NAME: &str = "home-budget";

/// Shows reminders through the notification plugin.
pub struct TauriNotifier<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriNotifier<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

impl<R: Runtime> NotificationSink for TauriNotifier<R> {
    fn permission_granted(&self) -> bool {
        matches!(
            self.app.notification().permission_state(),
            Ok(PermissionState::Granted)
        )
    }

    fn request_permission(&self) {
        match self.app.notification().request_permission() {
            Ok(state) => log::info!("notification permission state={state:?}"),
            Err(error) => log::warn!("notification permission request failed error={error}"),
        }
    }

    fn show(&self, title: &str, body: &str) -> Result<(), String> {
        self.app
            .notification()
            .builder()
            .title(title)
            .body(body)
            .show()
            .map_err(|error| error.to_string())
    }

    fn vibrate(&self, duration_ms: u64) {
        // Desktop webviews have no haptics.
        log::debug!("vibrate requested duration_ms={duration_ms}");
    }
}

/// Registers the commands and starts the alarm, expense and event-forwarding loops.
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new(PLUGIN_NAME)
        .invoke_handler(tauri::generate_handler![
            load_budget,
            set_category_limit,
            set_goal,
            add_saved_amount,
            update_saved_amount,
            delete_saved_amount,
            load_tasks,
            create_task,
            update_task,
            delete_task,
            toggle_task,
            has_overdue,
            load_settings,
            update_settings,
        ])
        .setup(|app, _api| {
            let data_dir = app.path().app_data_dir()?;
            if let Err(error) = init_logging(&data_dir) {
                log::warn!("file logging unavailable error={error}");
            }

            let store = PreferenceStore::new(data_dir);
            store.ensure_dirs()?;
            let clock = LocalAlarmClock::persistent(store.clone());
            let bus = EventBus::new();
            let state = AppState::with_store(store, Arc::new(clock.clone()), bus.clone());

            let sink: Arc<dyn NotificationSink> = Arc::new(TauriNotifier::new(app.clone()));
            tauri::async_runtime::spawn(run_alarm_loop(
                clock,
                sink,
                state.settings(),
                bus.clone(),
            ));
            tauri::async_runtime::spawn(watch_expenses(bus.subscribe(), state.budget().clone()));

            let handle = app.clone();
            let mut events = bus.subscribe();
            tauri::async_runtime::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            if let Err(error) = handle.emit(event.name(), &event) {
                                log::warn!("event emit failed name={} error={error}", event.name());
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            log::warn!("event forwarder lagged skipped={skipped}");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            });

            app.manage(state);
            Ok(())
        })
        .build()
}
