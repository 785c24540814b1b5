//! Durable FIFO of write intents, replayed against the backend on demand.

use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::actions::{log_action_for, Action, QueuedAction};
use super::log::{SyncLog, SyncStatus};
use crate::cache::{CacheEntry, CachedClient, RequestOptions};
use crate::store::{self, best_effort, KeyValueStore, QUEUE_KEY};

/// Cache slot holding the body of the most recently replayed report.
pub const LATEST_REPORT_KEY: &str = "latest_report";

/// Where a queue that is not a JSON array is moved before it gets replaced.
pub const QUEUE_BACKUP_KEY: &str = "offline_queue.unreadable";

/// One persisted queue entry.
///
/// Entries that no longer decode are carried verbatim, so a save never
/// drops them. An unreadable entry at the head blocks replay.
#[derive(Debug, Clone)]
enum Slot {
  Ready(QueuedAction),
  Unreadable(Value),
}

impl Slot {
  fn decode(raw: Value) -> Self {
    match serde_json::from_value::<QueuedAction>(raw.clone()) {
      Ok(queued) => Slot::Ready(queued),
      Err(e) => {
        warn!(error = %e, "keeping undecodable queue entry");
        Slot::Unreadable(raw)
      }
    }
  }

  fn encode(&self) -> Result<Value> {
    match self {
      Slot::Ready(queued) => serde_json::to_value(queued)
        .map_err(|e| eyre!("Failed to serialize queue entry {}: {}", queued.id, e)),
      Slot::Unreadable(raw) => Ok(raw.clone()),
    }
  }

  fn replaced_by(&self, action: &Action) -> bool {
    matches!(self, Slot::Ready(queued) if queued.action.replaces(action))
  }
}

/// Result of a replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
  /// Entries applied and removed during this pass
  pub flushed: usize,
  /// Entries still queued afterwards
  pub remaining: usize,
}

/// What happened to a submitted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
  /// The backend accepted the write
  Applied,
  /// The write was queued for a later replay
  Queued { pending: usize },
}

/// User-facing pending-writes status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSummary {
  AllSynced,
  Pending(usize),
}

impl fmt::Display for SyncSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SyncSummary::AllSynced => write!(f, "all synced"),
      SyncSummary::Pending(1) => write!(f, "1 item still pending"),
      SyncSummary::Pending(n) => write!(f, "{} items still pending", n),
    }
  }
}

/// Offline mutation queue.
///
/// The whole queue is loaded, mutated and persisted as one JSON array on
/// every change. Enqueue and replay take the same lock, so within a process
/// no two of those cycles interleave.
pub struct OfflineQueue {
  client: Arc<CachedClient>,
  log: Arc<SyncLog>,
  lock: Mutex<()>,
}

impl OfflineQueue {
  pub fn new(client: Arc<CachedClient>, log: Arc<SyncLog>) -> Self {
    Self {
      client,
      log,
      lock: Mutex::new(()),
    }
  }

  /// Queue `action`, replacing any queued action of the same kind and
  /// target. Returns the new queue length.
  pub async fn enqueue(&self, action: Action) -> usize {
    let _guard = self.lock.lock().await;

    let mut queue = self.load();
    let before = queue.len();
    queue.retain(|slot| !slot.replaced_by(&action));
    if queue.len() < before {
      debug!(kind = action.kind(), "replacing queued action");
    }

    let log_action = action.log_action();
    let queued = QueuedAction::new(action);
    info!(id = %queued.id, "queued action");
    queue.push(Slot::Ready(queued));
    self.save(&queue);
    self.log.append(log_action, SyncStatus::Queued);

    queue.len()
  }

  /// Number of queued entries, including ones that no longer decode.
  pub fn count(&self) -> usize {
    self.load().len()
  }

  /// Snapshot of the readable queued actions in replay order.
  pub fn pending(&self) -> Vec<QueuedAction> {
    self
      .load()
      .into_iter()
      .filter_map(|slot| match slot {
        Slot::Ready(queued) => Some(queued),
        Slot::Unreadable(_) => None,
      })
      .collect()
  }

  pub fn summary(&self) -> SyncSummary {
    match self.count() {
      0 => SyncSummary::AllSynced,
      n => SyncSummary::Pending(n),
    }
  }

  /// Body of the last report fetched by a replay or a direct submit.
  pub fn latest_report(&self) -> Option<CacheEntry> {
    self.client.cached(LATEST_REPORT_KEY)
  }

  /// Try a write right away, queueing it when offline, unauthenticated, or
  /// when the backend does not accept it.
  pub async fn submit(
    &self,
    action: Action,
    token: Option<&str>,
    offline: bool,
  ) -> SubmitOutcome {
    let token = token.filter(|t| !t.is_empty());
    if !offline {
      if let Some(token) = token {
        match self.apply(&action, token).await {
          Ok(()) => return SubmitOutcome::Applied,
          Err(e) => info!(kind = action.kind(), error = %e, "write failed, queueing"),
        }
      }
    }

    let pending = self.enqueue(action).await;
    SubmitOutcome::Queued { pending }
  }

  /// Drain the queue in FIFO order, stopping at the first failure.
  ///
  /// Every applied entry is removed from the persisted queue before the next
  /// one is attempted. Without a credential nothing is sent.
  pub async fn replay(&self, token: Option<&str>) -> ReplayReport {
    let _guard = self.lock.lock().await;

    let mut queue = self.load();
    let Some(token) = token.filter(|t| !t.is_empty()) else {
      debug!("no credential, skipping replay");
      return ReplayReport {
        flushed: 0,
        remaining: queue.len(),
      };
    };

    let mut flushed = 0;
    while let Some(slot) = queue.first().cloned() {
      let next = match slot {
        Slot::Ready(queued) => queued,
        Slot::Unreadable(raw) => {
          let kind = raw.get("type").and_then(Value::as_str).unwrap_or("unknown");
          warn!(kind, "undecodable queue entry, replay halted");
          if let Some(log_action) = log_action_for(kind) {
            self.log.append(log_action, SyncStatus::Failed);
          }
          break;
        }
      };
      let log_action = next.action.log_action();
      match self.apply(&next.action, token).await {
        Ok(()) => {
          debug!(id = %next.id, "replayed action");
          flushed += 1;
          self.log.append(log_action, SyncStatus::Synced);
          queue.remove(0);
          self.save(&queue);
        }
        Err(e) => {
          warn!(id = %next.id, error = %e, "replay halted");
          self.log.append(log_action, SyncStatus::Failed);
          break;
        }
      }
    }

    let report = ReplayReport {
      flushed,
      remaining: queue.len(),
    };
    info!(flushed = report.flushed, remaining = report.remaining, "replay finished");
    report
  }

  /// Send the network call for one action.
  async fn apply(&self, action: &Action, token: &str) -> Result<()> {
    let endpoint = action.endpoint();
    let mut options = RequestOptions::new(endpoint.method).token(Some(token));
    if let Some(body) = endpoint.body {
      options = options.json(body);
    }

    let response = self.client.request(&endpoint.path, options).await;
    if !response.ok() {
      return Err(eyre!("{} rejected with status {}", action.kind(), response.status));
    }

    if let Action::ReportRequest(_) = action {
      let body = response
        .json::<Value>()
        .ok_or_else(|| eyre!("Report response is not JSON"))?;
      self.client.put_cached(LATEST_REPORT_KEY, body);
    }

    Ok(())
  }

  fn load(&self) -> Vec<Slot> {
    let store = self.client.store();
    let Some(raw) = best_effort("store.get", store.get(QUEUE_KEY)).flatten() else {
      return Vec::new();
    };

    match serde_json::from_str::<Vec<Value>>(&raw) {
      Ok(entries) => entries.into_iter().map(Slot::decode).collect(),
      Err(e) => {
        warn!(error = %e, "offline queue unreadable, moving it aside");
        best_effort("store.set", store.set(QUEUE_BACKUP_KEY, &raw));
        Vec::new()
      }
    }
  }

  fn save(&self, queue: &[Slot]) {
    let encoded: Result<Vec<Value>> = queue.iter().map(Slot::encode).collect();
    let saved = best_effort("queue.encode", encoded).is_some_and(|entries| {
      store::save_json(self.client.store().as_ref(), QUEUE_KEY, &entries)
    });
    if !saved {
      warn!(len = queue.len(), "failed to persist offline queue");
    }
  }
}
