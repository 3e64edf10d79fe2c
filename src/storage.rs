use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EXPENSE_STORE: &str = "ExpensePrefs";
pub const INCOME_STORE: &str = "IncomePrefs";
pub const GOAL_STORE: &str = "GoalPrefs";
pub const TASK_STORE: &str = "tasks_prefs";
pub const ALARM_STORE: &str = "AlarmPrefs";
pub const SETTINGS_STORE: &str = "AppSettings";

const STORE_EXTENSION: &str = "json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("version conflict in store `{store}`: expected {expected}, found {found}")]
    VersionConflict {
        store: String,
        expected: u64,
        found: u64,
    },
}

/// On-disk layout of one named store.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
struct StoreDocument {
    #[serde(default)]
    version: u64,
    #[serde(default)]
    entries: BTreeMap<String, Value>,
}

/// Named key-value documents persisted as whole JSON files, one per store.
///
/// Every write bumps the store's version. Plain `save` is last-write-wins;
/// `save_if_version` only writes when the caller saw the current version.
#[derive(Clone)]
pub struct PreferenceStore {
    root: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl PreferenceStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root: Arc::new(root),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.root.as_path())?;
        Ok(())
    }

    /// Strict read: absent store or key is `Ok(None)`, undecodable JSON is an error.
    pub fn try_load<T: DeserializeOwned>(
        &self,
        store: &str,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        let Some(document) = self.read_document(store)? else {
            return Ok(None);
        };
        match document.entries.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Lenient read: anything missing or malformed yields `default`.
    pub fn load<T: DeserializeOwned>(&self, store: &str, key: &str, default: T) -> T {
        match self.try_load(store, key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(error) => {
                log::warn!("preference load failed store={store} key={key} error={error}");
                default
            }
        }
    }

    /// Current version of a store; 0 when it was never written or cannot be read.
    pub fn version(&self, store: &str) -> u64 {
        match self.read_document(store) {
            Ok(document) => document.map(|doc| doc.version).unwrap_or(0),
            Err(_) => 0,
        }
    }

    pub fn save<T: Serialize>(&self, store: &str, key: &str, value: &T) -> Result<u64, StorageError> {
        let value = serde_json::to_value(value)?;
        self.write_entries(store, vec![(key.to_string(), Some(value))], None)
    }

    /// Writes several keys of one store in a single document replace.
    pub fn save_many(&self, store: &str, entries: &[(&str, Value)]) -> Result<u64, StorageError> {
        let changes = entries
            .iter()
            .map(|(key, value)| (key.to_string(), Some(value.clone())))
            .collect();
        self.write_entries(store, changes, None)
    }

    pub fn save_if_version<T: Serialize>(
        &self,
        store: &str,
        key: &str,
        value: &T,
        expected: u64,
    ) -> Result<u64, StorageError> {
        let value = serde_json::to_value(value)?;
        self.write_entries(store, vec![(key.to_string(), Some(value))], Some(expected))
    }

    pub fn remove(&self, store: &str, key: &str) -> Result<u64, StorageError> {
        self.write_entries(store, vec![(key.to_string(), None)], None)
    }

    fn store_path(&self, store: &str) -> PathBuf {
        self.root.join(format!("{store}.{STORE_EXTENSION}"))
    }

    fn read_document(&self, store: &str) -> Result<Option<StoreDocument>, StorageError> {
        let path = self.store_path(store);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Ok(Some(serde_json::from_str(&buf)?))
    }

    /// `None` values delete their key.
    fn write_entries(
        &self,
        store: &str,
        changes: Vec<(String, Option<Value>)>,
        expected: Option<u64>,
    ) -> Result<u64, StorageError> {
        let _guard = self.write_lock.lock().expect("store lock poisoned");
        let path = self.store_path(store);
        let mut document = match self.read_document(store) {
            Ok(document) => document.unwrap_or_default(),
            Err(StorageError::Json(error)) => {
                log::warn!("store is corrupt, starting fresh store={store} error={error}");
                self.quarantine(&path)?;
                StoreDocument::default()
            }
            Err(error) => return Err(error),
        };

        if let Some(expected) = expected {
            if document.version != expected {
                return Err(StorageError::VersionConflict {
                    store: store.to_string(),
                    expected,
                    found: document.version,
                });
            }
        }

        let keys = changes.len();
        for (key, value) in changes {
            match value {
                Some(value) => {
                    document.entries.insert(key, value);
                }
                None => {
                    document.entries.remove(&key);
                }
            }
        }
        document.version += 1;

        self.ensure_dirs()?;
        write_atomic(&path, &document)?;
        log::debug!(
            "preference saved store={store} keys={keys} version={}",
            document.version
        );
        Ok(document.version)
    }

    /// Keeps an unreadable store file next to the fresh one for manual recovery.
    fn quarantine(&self, path: &Path) -> Result<(), StorageError> {
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("store");
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let target = path.with_file_name(format!("{stem}.corrupt-{timestamp}.{STORE_EXTENSION}"));
        fs::copy(path, &target)?;
        log::info!("corrupt store copied aside path={}", target.display());
        Ok(())
    }
}

fn write_atomic<T: Serialize>(path: &Path, data: &T) -> Result<(), StorageError> {
    let temp_path = path.with_extension("tmp");
    let json = serde_json::to_vec_pretty(data)?;
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(temp_path, path)?;
    Ok(())
}
