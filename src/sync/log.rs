//! Capped, newest-first history of queue and replay transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::store::{self, KeyValueStore, SYNC_LOG_KEY};

/// Entries kept after each append.
pub const LOG_CAPACITY: usize = 50;

/// Which kind of mutation an entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
  Category,
  Profile,
  Subscription,
  Report,
}

/// Transition being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
  Queued,
  Synced,
  Failed,
}

impl fmt::Display for SyncAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      SyncAction::Category => "category",
      SyncAction::Profile => "profile",
      SyncAction::Subscription => "subscription",
      SyncAction::Report => "report",
    })
  }
}

impl fmt::Display for SyncStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      SyncStatus::Queued => "queued",
      SyncStatus::Synced => "synced",
      SyncStatus::Failed => "failed",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
  pub id: String,
  pub action: SyncAction,
  pub status: SyncStatus,
  #[serde(rename = "createdAt")]
  pub created_at: DateTime<Utc>,
}

/// Append-only activity log persisted as a JSON array, newest first.
///
/// Observability only: nothing here ever fails the caller.
pub struct SyncLog {
  store: Arc<dyn KeyValueStore>,
  sequence: AtomicU64,
}

impl SyncLog {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self {
      store,
      sequence: AtomicU64::new(0),
    }
  }

  /// Record a transition, evicting the oldest entries past capacity.
  pub fn append(&self, action: SyncAction, status: SyncStatus) {
    let created_at = Utc::now();
    let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
    let entry = SyncLogEntry {
      id: format!("{}-{}", created_at.timestamp_millis(), seq),
      action,
      status,
      created_at,
    };
    debug!(%action, %status, "sync log entry");

    let mut entries = self.entries();
    entries.insert(0, entry);
    entries.truncate(LOG_CAPACITY);
    store::save_json(self.store.as_ref(), SYNC_LOG_KEY, &entries);
  }

  /// Up to `limit` most recent entries, newest first.
  pub fn recent(&self, limit: usize) -> Vec<SyncLogEntry> {
    let mut entries = self.entries();
    entries.truncate(limit);
    entries
  }

  fn entries(&self) -> Vec<SyncLogEntry> {
    store::load_json(self.store.as_ref(), SYNC_LOG_KEY).unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  fn log() -> (SyncLog, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (SyncLog::new(store.clone()), store)
  }

  #[test]
  fn test_append_is_newest_first() {
    let (log, _store) = log();
    log.append(SyncAction::Profile, SyncStatus::Queued);
    log.append(SyncAction::Profile, SyncStatus::Synced);

    let entries = log.recent(10);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].status, SyncStatus::Synced);
    assert_eq!(entries[1].status, SyncStatus::Queued);
    assert_ne!(entries[0].id, entries[1].id);
  }

  #[test]
  fn test_log_is_capped() {
    let (log, _store) = log();
    for _ in 0..60 {
      log.append(SyncAction::Category, SyncStatus::Queued);
    }

    let entries = log.recent(100);
    assert_eq!(entries.len(), LOG_CAPACITY);
    assert!(entries[0].id.ends_with("-60"));
    assert!(entries[LOG_CAPACITY - 1].id.ends_with("-11"));
  }

  #[test]
  fn test_recent_respects_limit() {
    let (log, _store) = log();
    for _ in 0..5 {
      log.append(SyncAction::Report, SyncStatus::Failed);
    }
    assert_eq!(log.recent(3).len(), 3);
    assert!(log.recent(0).is_empty());
  }

  #[test]
  fn test_wire_format() {
    let (log, store) = log();
    log.append(SyncAction::Subscription, SyncStatus::Failed);

    let raw = store.get(SYNC_LOG_KEY).unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value[0]["action"], "subscription");
    assert_eq!(value[0]["status"], "failed");
    assert!(value[0]["createdAt"].is_string());
  }

  #[test]
  fn test_storage_errors_are_swallowed() {
    let (log, store) = log();
    store.fail_writes(true);
    log.append(SyncAction::Profile, SyncStatus::Queued);
    store.fail_writes(false);
    assert!(log.recent(10).is_empty());

    store.fail_reads(true);
    assert!(log.recent(10).is_empty());
  }

  #[test]
  fn test_corrupted_log_reads_as_empty() {
    let (log, store) = log();
    store.set(SYNC_LOG_KEY, "not json").unwrap();
    assert!(log.recent(10).is_empty());

    log.append(SyncAction::Category, SyncStatus::Synced);
    assert_eq!(log.recent(10).len(), 1);
  }
}
