//! Durable key/value storage shared by the cache, the offline queue and the
//! sync log.
//!
//! Every component talks to storage only through [`KeyValueStore`]. Storage
//! failures are never fatal to callers: they go through [`best_effort`],
//! which traces the error and turns it into an absent value.

mod memory;
mod sqlite;

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Key holding the serialized offline mutation queue.
pub const QUEUE_KEY: &str = "offline_queue";

/// Key holding the serialized sync activity log.
pub const SYNC_LOG_KEY: &str = "sync_log";

/// Prefix applied to every caller-supplied cache key.
pub const CACHE_PREFIX: &str = "cache:";

/// Storage key for a cache entry.
pub fn cache_key(key: &str) -> String {
  format!("{}{}", CACHE_PREFIX, key)
}

/// Raw string storage keyed by string.
pub trait KeyValueStore: Send + Sync {
  /// Read the value stored under `key`, if any.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Delete the value stored under `key`. Missing keys are not an error.
  fn remove(&self, key: &str) -> Result<()>;
}

/// Run a fallible side operation whose failure must not affect the caller.
///
/// Errors are traced at `warn` and collapsed to `None`.
pub fn best_effort<T>(what: &str, result: Result<T>) -> Option<T> {
  match result {
    Ok(value) => Some(value),
    Err(e) => {
      warn!(operation = what, error = %e, "soft failure ignored");
      None
    }
  }
}

/// Load and deserialize a JSON value. Missing keys, storage errors and
/// malformed JSON all read as `None`.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
  let raw = best_effort("store.get", store.get(key))??;
  let decoded =
    serde_json::from_str(&raw).map_err(|e| eyre!("Malformed JSON under {}: {}", key, e));
  best_effort("store.decode", decoded)
}

/// Serialize and persist a JSON value. Returns whether the write landed.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> bool {
  let encoded =
    serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize {}: {}", key, e));
  let Some(encoded) = best_effort("store.encode", encoded) else {
    return false;
  };
  best_effort("store.set", store.set(key, &encoded)).is_some()
}
