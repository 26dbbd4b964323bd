// ── Persisted key-value state ──
//
// The bridge keeps a handful of small strings across restarts (session
// cookie, auto-detected ids, the account they belong to). The host
// supplies the storage; `MemoryStore` is the in-process implementation.

use dashmap::DashMap;

use crate::error::CoreError;

/// Keys written by the bridge.
pub mod keys {
    pub const SESSION_COOKIE: &str = "session_cookie";
    pub const CARD_ID: &str = "card_id";
    pub const CUSTOMER_ID: &str = "customer_id";
    pub const BASE_URL: &str = "base_url";
    pub const EMAIL: &str = "email";
}

/// Small synchronous key-value storage provided by the host.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CoreError>;
    fn remove(&self, key: &str) -> Result<(), CoreError>;
}

/// Non-persistent store, for tests and hosts that do not need restarts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let store = Self::new();
        for (key, value) in entries {
            store.entries.insert(key.to_owned(), value.to_owned());
        }
        store
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
