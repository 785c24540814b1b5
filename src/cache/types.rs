//! Request options, response values and the persisted cache entry.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::http::{Headers, Method};

/// Snapshot of a successful read, persisted under `cache:<key>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  /// Milliseconds since the Unix epoch at which the body was fetched
  pub timestamp: i64,
  /// Parsed response body
  pub data: Value,
}

impl CacheEntry {
  pub fn new(data: Value) -> Self {
    Self {
      timestamp: Utc::now().timestamp_millis(),
      data,
    }
  }

  /// Whether the entry may still be served at `now` given `ttl`.
  /// An entry exactly `ttl` old is still valid. An age that does not fit
  /// in an `i64` is never valid.
  pub fn is_valid_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
    now
      .timestamp_millis()
      .checked_sub(self.timestamp)
      .is_some_and(|age| age <= ttl.num_milliseconds())
  }

  /// When the entry was written.
  pub fn cached_at(&self) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(self.timestamp).single()
  }
}

/// Outbound request body.
///
/// Multipart uploads are sent as `Binary` with the caller setting the
/// `multipart/form-data; boundary=...` content type.
#[derive(Debug, Clone)]
pub enum RequestBody {
  /// Serialized as JSON; gets the JSON content type by default
  Json(Value),
  /// Sent verbatim; gets the JSON content type by default
  Text(String),
  /// Opaque bytes; no default content type
  Binary(Vec<u8>),
}

/// Options for [`CachedClient::request`](super::CachedClient::request).
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
  pub method: Method,
  pub headers: Headers,
  pub body: Option<RequestBody>,
  /// Bearer credential, attached as `Authorization` when present
  pub token: Option<String>,
  /// Cache slot for the response; only honored for GET
  pub cache_key: Option<String>,
  /// Maximum age of a cached response; defaults to the client TTL
  pub ttl: Option<Duration>,
}

impl RequestOptions {
  pub fn new(method: Method) -> Self {
    Self {
      method,
      ..Self::default()
    }
  }

  pub fn get() -> Self {
    Self::new(Method::Get)
  }

  pub fn token(mut self, token: Option<&str>) -> Self {
    self.token = token.filter(|t| !t.is_empty()).map(String::from);
    self
  }

  pub fn json(mut self, body: Value) -> Self {
    self.body = Some(RequestBody::Json(body));
    self
  }

  pub fn body(mut self, body: RequestBody) -> Self {
    self.body = Some(body);
    self
  }

  pub fn header(mut self, name: &str, value: &str) -> Self {
    self.headers.insert(name.to_string(), value.to_string());
    self
  }

  pub fn cache(mut self, key: &str, ttl: Option<Duration>) -> Self {
    self.cache_key = Some(key.to_string());
    self.ttl = ttl;
    self
  }
}

/// Response handed back to callers: live, served from cache, or synthetic.
#[derive(Debug, Clone)]
pub struct ApiResponse {
  pub status: u16,
  pub headers: Headers,
  pub body: Vec<u8>,
  /// True when the body came from a stored snapshot
  pub cached: bool,
  /// When the snapshot was taken (cached responses only)
  pub cached_at: Option<DateTime<Utc>>,
}

impl ApiResponse {
  pub const UNAVAILABLE: u16 = 503;

  /// Synthetic response used when the network failed and no cache applies.
  pub fn unavailable() -> Self {
    Self {
      status: Self::UNAVAILABLE,
      headers: json_headers(),
      body: b"{}".to_vec(),
      cached: false,
      cached_at: None,
    }
  }

  /// Synthetic 200 response wrapping a cache entry.
  pub fn from_cache(entry: &CacheEntry) -> Self {
    Self {
      status: 200,
      headers: json_headers(),
      body: entry.data.to_string().into_bytes(),
      cached: true,
      cached_at: entry.cached_at(),
    }
  }

  /// Whether the status is in the 2xx range.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Decode the body as JSON. Unparsable bodies read as `None`.
  pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
    serde_json::from_slice(&self.body).ok()
  }

  /// Body as (lossy) UTF-8 text.
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

fn json_headers() -> Headers {
  let mut headers = Headers::new();
  headers.insert("content-type".to_string(), "application/json".to_string());
  headers
}
