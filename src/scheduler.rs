use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::events::{AppEvent, EventBus};
use crate::models::Timestamp;
use crate::reminder::{
    deliver, AlarmKey, AlarmPort, DeliveryOutcome, NotificationSink, ReminderPayload,
};
use crate::storage::{PreferenceStore, ALARM_STORE};

const PENDING_KEY: &str = "pending";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct PendingAlarm {
    pub key: AlarmKey,
    pub fire_at: Timestamp,
    pub payload: ReminderPayload,
}

/// In-process wake scheduler keyed by task and trigger kind. With a store, pending alarms survive restarts.
#[derive(Clone)]
pub struct LocalAlarmClock {
    alarms: Arc<Mutex<BTreeMap<AlarmKey, PendingAlarm>>>,
    store: Option<PreferenceStore>,
}

impl LocalAlarmClock {
    pub fn in_memory() -> Self {
        Self {
            alarms: Arc::new(Mutex::new(BTreeMap::new())),
            store: None,
        }
    }

    pub fn persistent(store: PreferenceStore) -> Self {
        let pending: Vec<PendingAlarm> = store.load(ALARM_STORE, PENDING_KEY, Vec::new());
        log::info!("alarm clock restored pending={}", pending.len());
        let alarms: BTreeMap<AlarmKey, PendingAlarm> = pending
            .into_iter()
            .map(|alarm| (alarm.key.clone(), alarm))
            .collect();
        Self {
            alarms: Arc::new(Mutex::new(alarms)),
            store: Some(store),
        }
    }

    /// Pending alarms ordered by fire time.
    pub fn pending(&self) -> Vec<PendingAlarm> {
        let mut pending: Vec<PendingAlarm> = self.lock().values().cloned().collect();
        pending.sort_by_key(|alarm| alarm.fire_at);
        pending
    }

    /// Removes and returns every alarm due at `now`, earliest first.
    pub fn take_due(&self, now: Timestamp) -> Vec<PendingAlarm> {
        let mut guard = self.lock();
        let due_keys: Vec<AlarmKey> = guard
            .values()
            .filter(|alarm| alarm.fire_at <= now)
            .map(|alarm| alarm.key.clone())
            .collect();
        if due_keys.is_empty() {
            return Vec::new();
        }
        let mut due: Vec<PendingAlarm> = due_keys
            .iter()
            .filter_map(|key| guard.remove(key))
            .collect();
        if let Err(error) = self.persist(&guard) {
            log::error!("failed to persist fired alarms error={error}");
        }
        drop(guard);
        due.sort_by_key(|alarm| alarm.fire_at);
        due
    }

    pub fn fire_due(
        &self,
        now: Timestamp,
        sink: &dyn NotificationSink,
        settings: &Settings,
    ) -> Vec<(ReminderPayload, DeliveryOutcome)> {
        self.take_due(now)
            .into_iter()
            .map(|alarm| {
                let outcome = deliver(&alarm.payload, sink, settings);
                log::info!(
                    "alarm fired task_id={} kind={:?} outcome={outcome:?}",
                    alarm.payload.task_id,
                    alarm.payload.kind
                );
                (alarm.payload, outcome)
            })
            .collect()
    }

    fn persist(&self, alarms: &BTreeMap<AlarmKey, PendingAlarm>) -> Result<(), String> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let pending: Vec<&PendingAlarm> = alarms.values().collect();
        store
            .save(ALARM_STORE, PENDING_KEY, &pending)
            .map(|_| ())
            .map_err(|error| error.to_string())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<AlarmKey, PendingAlarm>> {
        self.alarms.lock().expect("state poisoned")
    }
}

impl AlarmPort for LocalAlarmClock {
    fn register(
        &self,
        key: &AlarmKey,
        fire_at: Timestamp,
        payload: ReminderPayload,
    ) -> Result<(), String> {
        log::debug!(
            "alarm registered task_id={} kind={} code={} fire_at={fire_at}",
            key.task_id,
            key.kind.as_str(),
            key.request_code()
        );
        let mut guard = self.lock();
        guard.insert(
            key.clone(),
            PendingAlarm {
                key: key.clone(),
                fire_at,
                payload,
            },
        );
        self.persist(&guard)
    }

    fn cancel(&self, key: &AlarmKey) -> Result<(), String> {
        let mut guard = self.lock();
        if guard.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&guard)
    }
}

/// Polls the clock and delivers due alarms until the future is dropped.
pub async fn run_alarm_loop(
    clock: LocalAlarmClock,
    sink: Arc<dyn NotificationSink>,
    settings: Settings,
    bus: EventBus,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(settings.alarm_poll_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let now = Utc::now().timestamp();
        for (payload, outcome) in clock.fire_due(now, sink.as_ref(), &settings) {
            if outcome == DeliveryOutcome::Delivered {
                bus.publish(AppEvent::ReminderFired { payload });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminder::testing::RecordingSink;
    use crate::reminder::ReminderKind;

    fn payload(task_id: &str, kind: ReminderKind) -> ReminderPayload {
        ReminderPayload {
            task_id: task_id.to_string(),
            title: format!("task-{task_id}"),
            description: None,
            kind,
            remaining: if kind == ReminderKind::Reminder {
                "a day".to_string()
            } else {
                String::new()
            },
        }
    }

    fn register(clock: &LocalAlarmClock, key: AlarmKey, fire_at: Timestamp) {
        let payload = payload(&key.task_id, key.kind);
        clock.register(&key, fire_at, payload).unwrap();
    }

    #[test]
    fn register_replaces_same_key() {
        let clock = LocalAlarmClock::in_memory();
        register(&clock, AlarmKey::start("a"), 100);
        register(&clock, AlarmKey::start("a"), 200);
        register(&clock, AlarmKey::reminder("a"), 50);

        let pending = clock.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].key, AlarmKey::reminder("a"));
        assert_eq!(pending[1].fire_at, 200);
    }

    #[test]
    fn neighbouring_task_ids_keep_separate_alarms() {
        let clock = LocalAlarmClock::in_memory();
        register(&clock, AlarmKey::start("a"), 100);
        register(&clock, AlarmKey::reminder("a"), 50);
        register(&clock, AlarmKey::start("b"), 300);

        clock.cancel(&AlarmKey::reminder("a")).unwrap();
        clock.cancel(&AlarmKey::start("a")).unwrap();
        let pending = clock.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key, AlarmKey::start("b"));
    }

    #[test]
    fn cancel_unknown_key_is_a_no_op() {
        let clock = LocalAlarmClock::in_memory();
        register(&clock, AlarmKey::start("a"), 100);
        clock.cancel(&AlarmKey::start("z")).unwrap();
        clock.cancel(&AlarmKey::start("a")).unwrap();
        assert!(clock.pending().is_empty());
    }

    #[test]
    fn take_due_removes_only_due_alarms_once() {
        let clock = LocalAlarmClock::in_memory();
        register(&clock, AlarmKey::start("a"), 300);
        register(&clock, AlarmKey::reminder("a"), 100);
        register(&clock, AlarmKey::start("b"), 200);

        let due = clock.take_due(200);
        assert_eq!(
            due.iter().map(|alarm| alarm.key.clone()).collect::<Vec<_>>(),
            vec![AlarmKey::reminder("a"), AlarmKey::start("b")]
        );
        assert!(clock.take_due(200).is_empty());
        assert_eq!(clock.pending().len(), 1);
    }

    #[test]
    fn fire_due_delivers_messages() {
        let clock = LocalAlarmClock::in_memory();
        register(&clock, AlarmKey::reminder("a"), 100);
        let sink = RecordingSink::new(true);

        let fired = clock.fire_due(100, &sink, &Settings::default());
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].1, DeliveryOutcome::Delivered);
        assert_eq!(
            sink.shown.lock().unwrap()[0].1,
            "Task \"task-a\" starts in a day"
        );
    }

    #[test]
    fn fire_without_permission_requests_it_and_consumes_alarm() {
        let clock = LocalAlarmClock::in_memory();
        register(&clock, AlarmKey::start("a"), 100);
        let sink = RecordingSink::new(false);

        let fired = clock.fire_due(150, &sink, &Settings::default());
        assert_eq!(fired[0].1, DeliveryOutcome::PermissionRequested);
        assert!(sink.shown.lock().unwrap().is_empty());
        assert!(clock.pending().is_empty());
    }

    #[test]
    fn persistent_clock_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::new(dir.path().to_path_buf());
        let clock = LocalAlarmClock::persistent(store.clone());
        register(&clock, AlarmKey::start("a"), 100);
        register(&clock, AlarmKey::reminder("a"), 50);
        clock.cancel(&AlarmKey::reminder("a")).unwrap();

        let restored = LocalAlarmClock::persistent(store.clone());
        assert_eq!(restored.pending(), clock.pending());
        assert_eq!(restored.take_due(100).len(), 1);

        let after_fire = LocalAlarmClock::persistent(store);
        assert!(after_fire.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn alarm_loop_announces_delivered_reminders() {
        let clock = LocalAlarmClock::in_memory();
        let due_at = Utc::now().timestamp() - 1;
        register(&clock, AlarmKey::reminder("a"), due_at);
        let sink = Arc::new(RecordingSink::new(true));
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let handle = tokio::spawn(run_alarm_loop(
            clock.clone(),
            sink.clone(),
            Settings::default(),
            bus.clone(),
        ));
        tokio::time::sleep(Duration::from_secs(3)).await;
        handle.abort();

        match rx.try_recv().unwrap() {
            AppEvent::ReminderFired { payload } => {
                assert_eq!(payload.task_id, "a");
                assert_eq!(payload.kind, ReminderKind::Reminder);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(sink.shown.lock().unwrap().len(), 1);
        assert!(clock.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn alarm_loop_stays_quiet_without_permission() {
        let clock = LocalAlarmClock::in_memory();
        register(&clock, AlarmKey::start("a"), Utc::now().timestamp() - 1);
        let sink = Arc::new(RecordingSink::new(false));
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let handle = tokio::spawn(run_alarm_loop(
            clock.clone(),
            sink.clone(),
            Settings::default(),
            bus.clone(),
        ));
        tokio::time::sleep(Duration::from_secs(3)).await;
        handle.abort();

        assert!(rx.try_recv().is_err());
        assert_eq!(*sink.permission_requests.lock().unwrap(), 1);
        assert!(clock.pending().is_empty());
    }
}
