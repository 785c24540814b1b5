//! Network-aware request layer with offline fallback.

use chrono::{Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use super::types::{ApiResponse, CacheEntry, RequestBody, RequestOptions};
use crate::http::{header, HttpRequest, HttpResponse, Method, Transport};
use crate::store::{self, best_effort, KeyValueStore};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Request client that snapshots successful reads and serves them back
/// while the network is unavailable.
///
/// `request` never fails: every outcome is a response, either live, cached,
/// or a synthetic 503.
pub struct CachedClient {
  transport: Arc<dyn Transport>,
  store: Arc<dyn KeyValueStore>,
  base_url: Url,
  /// TTL applied when the caller does not pass one
  default_ttl: Duration,
}

impl CachedClient {
  /// Create a client resolving relative paths against `base_url`.
  pub fn new(
    transport: Arc<dyn Transport>,
    store: Arc<dyn KeyValueStore>,
    base_url: Url,
  ) -> Self {
    Self {
      transport,
      store,
      base_url,
      default_ttl: Duration::minutes(5),
    }
  }

  /// Set the TTL used when a request does not carry one.
  pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
    self.default_ttl = ttl;
    self
  }

  /// The store this client persists snapshots into.
  pub fn store(&self) -> &Arc<dyn KeyValueStore> {
    &self.store
  }

  /// Issue a request.
  ///
  /// 1. Send it over the transport
  /// 2. On a 2xx GET with a cache key, snapshot the JSON body
  /// 3. On transport failure, serve a snapshot younger than the TTL
  /// 4. Otherwise answer with a synthetic 503
  pub async fn request(&self, path: &str, options: RequestOptions) -> ApiResponse {
    let cache_key = options
      .cache_key
      .clone()
      .filter(|_| options.method == Method::Get);
    let ttl = options.ttl.unwrap_or(self.default_ttl);
    let method = options.method;

    let outcome = match self.build_request(path, options) {
      Ok(request) => self.transport.send(request).await,
      Err(e) => Err(e),
    };

    match outcome {
      Ok(response) => {
        if let Some(key) = cache_key.as_deref() {
          self.snapshot(key, &response);
        }
        debug!(%method, path, status = response.status, "request completed");
        ApiResponse {
          status: response.status,
          headers: response.headers,
          body: response.body,
          cached: false,
          cached_at: None,
        }
      }
      Err(e) => {
        info!(%method, path, error = %e, "request failed");
        match cache_key.as_deref() {
          Some(key) => self.fallback(key, ttl),
          None => ApiResponse::unavailable(),
        }
      }
    }
  }

  /// Read a snapshot regardless of its age.
  pub fn cached(&self, key: &str) -> Option<CacheEntry> {
    store::load_json(self.store.as_ref(), &store::cache_key(key))
  }

  /// Persist `data` into a cache slot. Returns whether the write landed.
  pub fn put_cached(&self, key: &str, data: Value) -> bool {
    store::save_json(
      self.store.as_ref(),
      &store::cache_key(key),
      &CacheEntry::new(data),
    )
  }

  fn snapshot(&self, key: &str, response: &HttpResponse) {
    if !(200..300).contains(&response.status) {
      return;
    }
    let parsed = serde_json::from_slice::<Value>(&response.body)
      .map_err(|e| eyre!("Response for {} is not JSON: {}", key, e));
    if let Some(data) = best_effort("cache.parse", parsed) {
      self.put_cached(key, data);
    }
  }

  fn fallback(&self, key: &str, ttl: Duration) -> ApiResponse {
    match self.cached(key) {
      Some(entry) if entry.is_valid_at(Utc::now(), ttl) => {
        info!(key, "serving cached response");
        ApiResponse::from_cache(&entry)
      }
      Some(_) => {
        debug!(key, "cached response expired");
        ApiResponse::unavailable()
      }
      None => ApiResponse::unavailable(),
    }
  }

  fn resolve(&self, path: &str) -> Result<Url> {
    if let Ok(absolute) = Url::parse(path) {
      return Ok(absolute);
    }
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| eyre!("Invalid request path {}: {}", path, e))
  }

  fn build_request(&self, path: &str, options: RequestOptions) -> Result<HttpRequest> {
    let url = self.resolve(path)?;
    let mut headers = options.headers;

    if let Some(token) = options.token.as_deref() {
      headers.insert("Authorization".to_string(), format!("Bearer {}", token));
    }

    let caller_set_type = header(&headers, "content-type").is_some();
    let body = match options.body {
      Some(RequestBody::Json(value)) => {
        let encoded =
          serde_json::to_vec(&value).map_err(|e| eyre!("Failed to encode body: {}", e))?;
        Some((encoded, Some(JSON_CONTENT_TYPE.to_string())))
      }
      Some(RequestBody::Text(text)) => {
        Some((text.into_bytes(), Some(JSON_CONTENT_TYPE.to_string())))
      }
      Some(RequestBody::Binary(bytes)) => Some((bytes, None)),
      None => None,
    };

    let (body, default_type) = match body {
      Some((bytes, content_type)) => (Some(bytes), content_type),
      None => (None, Some(JSON_CONTENT_TYPE.to_string())),
    };

    if !caller_set_type {
      if let Some(content_type) = default_type {
        headers.insert("Content-Type".to_string(), content_type);
      }
    }

    Ok(HttpRequest {
      method: options.method,
      url,
      headers,
      body,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::MockTransport;
  use crate::store::MemoryStore;
  use serde_json::json;

  fn client() -> (CachedClient, MockTransport, Arc<MemoryStore>) {
    let transport = MockTransport::new();
    let store = Arc::new(MemoryStore::new());
    let client = CachedClient::new(
      Arc::new(transport.clone()),
      store.clone(),
      Url::parse("https://api.example.com/api/").unwrap(),
    );
    (client, transport, store)
  }

  fn seed(store: &MemoryStore, key: &str, age: Duration, data: Value) {
    let entry = CacheEntry {
      timestamp: (Utc::now() - age).timestamp_millis(),
      data,
    };
    store
      .set(&store::cache_key(key), &serde_json::to_string(&entry).unwrap())
      .unwrap();
  }

  #[tokio::test]
  async fn test_successful_get_is_cached() {
    let (client, transport, _store) = client();
    transport.respond_json(200, json!({"balance": 10}));

    let response = client
      .request("accounts", RequestOptions::get().cache("accounts", None))
      .await;

    assert_eq!(response.status, 200);
    assert!(!response.cached);
    let entry = client.cached("accounts").unwrap();
    assert_eq!(entry.data, json!({"balance": 10}));
  }

  #[tokio::test]
  async fn test_network_failure_serves_fresh_cache() {
    let (client, transport, store) = client();
    seed(&store, "accounts", Duration::minutes(4), json!({"balance": 5}));
    transport.fail("connection reset");

    let response = client
      .request("accounts", RequestOptions::get().cache("accounts", None))
      .await;

    assert_eq!(response.status, 200);
    assert!(response.cached);
    assert!(response.cached_at.is_some());
    assert_eq!(response.json::<Value>(), Some(json!({"balance": 5})));
  }

  #[tokio::test]
  async fn test_expired_cache_is_unavailable() {
    let (client, transport, store) = client();
    seed(&store, "accounts", Duration::minutes(6), json!({"balance": 5}));
    transport.fail("timeout");

    let response = client
      .request(
        "accounts",
        RequestOptions::get().cache("accounts", Some(Duration::minutes(5))),
      )
      .await;

    assert_eq!(response.status, 503);
    assert!(!response.cached);
  }

  #[tokio::test]
  async fn test_custom_ttl_extends_validity() {
    let (client, transport, store) = client();
    seed(&store, "report", Duration::minutes(30), json!([1]));
    transport.fail("offline");

    let response = client
      .request(
        "reports/monthly",
        RequestOptions::get().cache("report", Some(Duration::hours(1))),
      )
      .await;

    assert!(response.cached);
  }

  #[tokio::test]
  async fn test_snapshot_with_extreme_timestamp_is_unavailable() {
    let (client, transport, store) = client();
    store
      .set(
        &store::cache_key("accounts"),
        r#"{"timestamp":-9223372036854775808,"data":{"balance":5}}"#,
      )
      .unwrap();
    transport.fail("offline");

    let response = client
      .request("accounts", RequestOptions::get().cache("accounts", None))
      .await;
    assert_eq!(response.status, 503);
    assert!(!response.cached);
  }

  #[tokio::test]
  async fn test_failure_without_cache_key_is_unavailable() {
    let (client, transport, store) = client();
    seed(&store, "accounts", Duration::minutes(1), json!({}));
    transport.fail("offline");

    let response = client.request("accounts", RequestOptions::get()).await;
    assert_eq!(response.status, 503);
    assert!(!response.cached);
  }

  #[tokio::test]
  async fn test_cache_key_ignored_for_writes() {
    let (client, transport, store) = client();
    seed(&store, "profile", Duration::minutes(1), json!({"first_name": "Ann"}));
    transport.respond_json(200, json!({"first_name": "Bea"}));
    transport.fail("offline");

    let options = RequestOptions::new(Method::Put)
      .json(json!({"first_name": "Bea"}))
      .cache("profile", None);
    let first = client.request("users/me", options.clone()).await;
    assert!(first.ok());
    assert_eq!(
      client.cached("profile").unwrap().data,
      json!({"first_name": "Ann"})
    );

    let second = client.request("users/me", options).await;
    assert_eq!(second.status, 503);
  }

  #[tokio::test]
  async fn test_error_status_is_returned_and_not_cached() {
    let (client, transport, _store) = client();
    transport.respond_json(404, json!({"detail": "missing"}));

    let response = client
      .request("accounts/9", RequestOptions::get().cache("account-9", None))
      .await;

    assert_eq!(response.status, 404);
    assert!(!response.cached);
    assert!(client.cached("account-9").is_none());
  }

  #[tokio::test]
  async fn test_storage_failure_does_not_fail_request() {
    let (client, transport, store) = client();
    store.fail_writes(true);
    transport.respond_json(200, json!({"ok": true}));

    let response = client
      .request("accounts", RequestOptions::get().cache("accounts", None))
      .await;

    assert_eq!(response.status, 200);
    store.fail_writes(false);
    assert!(client.cached("accounts").is_none());
  }

  #[tokio::test]
  async fn test_malformed_snapshot_reads_as_miss() {
    let (client, transport, store) = client();
    store.set(&store::cache_key("accounts"), "{broken").unwrap();
    transport.fail("offline");

    let response = client
      .request("accounts", RequestOptions::get().cache("accounts", None))
      .await;
    assert_eq!(response.status, 503);
  }

  #[tokio::test]
  async fn test_headers() {
    let (client, transport, _store) = client();
    transport.respond_json(200, json!({}));
    transport.respond_json(200, json!({}));
    transport.respond_json(200, json!({}));

    client
      .request("accounts", RequestOptions::get().token(Some("secret")))
      .await;
    client
      .request(
        "uploads",
        RequestOptions::new(Method::Post).body(RequestBody::Binary(vec![1, 2, 3])),
      )
      .await;
    client
      .request(
        "notes",
        RequestOptions::new(Method::Post)
          .header("content-type", "text/plain")
          .body(RequestBody::Text("hi".to_string())),
      )
      .await;

    let requests = transport.requests();
    assert_eq!(
      header(&requests[0].headers, "authorization"),
      Some("Bearer secret")
    );
    assert_eq!(
      header(&requests[0].headers, "content-type"),
      Some("application/json")
    );
    assert_eq!(header(&requests[1].headers, "content-type"), None);
    assert_eq!(
      header(&requests[2].headers, "content-type"),
      Some("text/plain")
    );
    assert_eq!(requests[2].body.as_deref(), Some(&b"hi"[..]));
  }

  #[tokio::test]
  async fn test_paths_resolve_against_base_url() {
    let (client, transport, _store) = client();
    transport.respond_json(200, json!({}));
    transport.respond_json(200, json!({}));

    client.request("/transactions/7", RequestOptions::get()).await;
    client
      .request("https://other.example.com/health", RequestOptions::get())
      .await;

    let requests = transport.requests();
    assert_eq!(
      requests[0].url.as_str(),
      "https://api.example.com/api/transactions/7"
    );
    assert_eq!(requests[1].url.as_str(), "https://other.example.com/health");
  }
}
