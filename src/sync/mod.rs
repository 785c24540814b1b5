//! Offline mutation queue and sync activity log.
//!
//! Writes that cannot reach the backend are captured as typed
//! [`Action`]s, persisted, and replayed later in insertion order. Each
//! transition is recorded in the [`SyncLog`] for status display.

mod actions;
mod log;
mod queue;

pub use actions::{Action, CategoryUpdate, ProfileUpdate, ReportRequest, SubscriptionUpdate};
pub use log::SyncLog;
pub use queue::{OfflineQueue, SubmitOutcome};
