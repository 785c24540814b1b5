//! Typed write intents held by the offline queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

use super::log::SyncAction;
use crate::http::Method;

/// Per-process counter appended to queue ids.
static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Activity log category for a serialized `type` discriminator.
pub fn log_action_for(kind: &str) -> Option<SyncAction> {
  match kind {
    "update_category" => Some(SyncAction::Category),
    "update_profile" => Some(SyncAction::Profile),
    "update_subscription" => Some(SyncAction::Subscription),
    "report_request" => Some(SyncAction::Report),
    _ => None,
  }
}

/// Reassign a transaction to a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUpdate {
  #[serde(rename = "transactionId")]
  pub transaction_id: String,
  pub category: String,
}

/// Edit the current user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
  pub first_name: String,
  #[serde(default)]
  pub last_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date_of_birth: Option<String>,
}

/// Change the current user's plan and billing close day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionUpdate {
  pub subscription_plan: String,
  pub monthly_close_day: u8,
}

/// Generate a report and keep the result as the latest report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
  #[serde(rename = "reportType")]
  pub report_type: String,
  pub path: String,
}

/// A write intent, one variant per kind. Each kind owns its payload shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Action {
  UpdateCategory(CategoryUpdate),
  UpdateProfile(ProfileUpdate),
  UpdateSubscription(SubscriptionUpdate),
  ReportRequest(ReportRequest),
}

/// The resource an action applies to. At most one action per kind and
/// target is queued at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target<'a> {
  Transaction(&'a str),
  CurrentUser,
  Report(&'a str),
}

/// Network call that applies an action.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
  pub method: Method,
  pub path: String,
  pub body: Option<Value>,
}

impl Action {
  /// Kind discriminator, matching the serialized `type` field.
  pub fn kind(&self) -> &'static str {
    match self {
      Action::UpdateCategory(_) => "update_category",
      Action::UpdateProfile(_) => "update_profile",
      Action::UpdateSubscription(_) => "update_subscription",
      Action::ReportRequest(_) => "report_request",
    }
  }

  pub fn target(&self) -> Target<'_> {
    match self {
      Action::UpdateCategory(update) => Target::Transaction(&update.transaction_id),
      Action::UpdateProfile(_) | Action::UpdateSubscription(_) => Target::CurrentUser,
      Action::ReportRequest(request) => Target::Report(&request.report_type),
    }
  }

  /// Whether both actions are of the same kind and aim at the same target.
  pub fn replaces(&self, other: &Action) -> bool {
    self.kind() == other.kind() && self.target() == other.target()
  }

  /// Activity log category for this action.
  pub fn log_action(&self) -> SyncAction {
    match self {
      Action::UpdateCategory(_) => SyncAction::Category,
      Action::UpdateProfile(_) => SyncAction::Profile,
      Action::UpdateSubscription(_) => SyncAction::Subscription,
      Action::ReportRequest(_) => SyncAction::Report,
    }
  }

  pub fn endpoint(&self) -> Endpoint {
    match self {
      Action::UpdateCategory(update) => Endpoint {
        method: Method::Patch,
        path: format!("transactions/{}", update.transaction_id),
        body: Some(json!({ "category": update.category })),
      },
      Action::UpdateProfile(update) => Endpoint {
        method: Method::Put,
        path: "users/me".to_string(),
        body: Some(json!(update)),
      },
      Action::UpdateSubscription(update) => Endpoint {
        method: Method::Put,
        path: "users/me/subscription".to_string(),
        body: Some(json!(update)),
      },
      Action::ReportRequest(request) => Endpoint {
        method: Method::Get,
        path: request.path.clone(),
        body: None,
      },
    }
  }

  /// Short human-readable description.
  pub fn describe(&self) -> String {
    match self {
      Action::UpdateCategory(u) => {
        format!("categorize {} as {}", u.transaction_id, u.category)
      }
      Action::UpdateProfile(u) => format!("update profile for {}", u.first_name),
      Action::UpdateSubscription(u) => format!(
        "switch to {} closing on day {}",
        u.subscription_plan, u.monthly_close_day
      ),
      Action::ReportRequest(r) => format!("{} report", r.report_type),
    }
  }
}

/// Queue envelope around an [`Action`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
  pub id: String,
  #[serde(flatten)]
  pub action: Action,
  #[serde(rename = "createdAt")]
  pub created_at: DateTime<Utc>,
}

impl QueuedAction {
  pub fn new(action: Action) -> Self {
    let created_at = Utc::now();
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1;
    Self {
      id: format!(
        "{}-{}-{}",
        action.kind(),
        created_at.timestamp_millis(),
        seq
      ),
      action,
      created_at,
    }
  }
}
