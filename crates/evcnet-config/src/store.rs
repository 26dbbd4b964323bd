// ── JSON file store ──
//
// `KeyValueStore` backed by one small JSON object on disk. Every write
// rewrites the whole file through a temporary sibling and a rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use evcnet_core::{CoreError, KeyValueStore};
use tracing::debug;

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| storage(&path, &e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(storage(&path, &e)),
        };
        debug!(path = %path.display(), keys = entries.len(), "state store opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| storage(&self.path, &e))?;
        }
        let raw = serde_json::to_string_pretty(entries).map_err(|e| storage(&self.path, &e))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).map_err(|e| storage(&tmp, &e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| storage(&self.path, &e))
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> bool) -> Result<(), CoreError> {
        let mut entries = self.entries.lock().map_err(|_| poisoned(&self.path))?;
        if f(&mut entries) {
            self.write(&entries)?;
        }
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let entries = self.entries.lock().map_err(|_| poisoned(&self.path))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.update(|entries| {
            if entries.get(key).is_some_and(|v| v == value) {
                return false;
            }
            entries.insert(key.to_owned(), value.to_owned());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.update(|entries| entries.remove(key).is_some())
    }
}

fn storage(path: &Path, err: &dyn std::fmt::Display) -> CoreError {
    CoreError::Storage {
        message: format!("{}: {err}", path.display()),
    }
}

fn poisoned(path: &Path) -> CoreError {
    CoreError::Storage {
        message: format!("{}: store lock poisoned", path.display()),
    }
}
