//! Preference storage
//!
//! A small injected key-value interface over string-encoded values. The
//! engine reads preferences once at construction and writes them back on
//! change; write failures are logged, never surfaced as a user-facing
//! error.

use crate::db::Database;
#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::Mutex;

/// Whether the completion collaborator should consult conversation history
pub const HISTORY_ENABLED: &str = "history_enabled";
/// API key for the streaming collaborator
pub const API_KEY: &str = "api_key";
/// Model version selector ("3.5" or "4")
pub const MODEL_VERSION: &str = "model_version";

pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);

    /// String-encoded boolean; an absent value is `false`
    fn get_bool(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v == "true")
    }

    fn set_bool(&self, key: &str, value: bool) {
        self.set(key, if value { "true" } else { "false" });
    }
}

impl<T: PreferenceStore + ?Sized> PreferenceStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) {
        (**self).set(key, value);
    }
}

/// Preferences backed by the local database
#[derive(Clone)]
pub struct SqlitePreferences {
    db: Database,
}

impl SqlitePreferences {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl PreferenceStore for SqlitePreferences {
    fn get(&self, key: &str) -> Option<String> {
        match self.db.get_preference(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key, error = %e, "failed to load preference");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.db.set_preference(key, value) {
            tracing::error!(key, error = %e, "failed to save preference");
        }
    }
}

/// In-memory preferences (for testing)
#[cfg(test)]
#[derive(Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}
