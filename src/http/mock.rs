//! Scripted transport for tests.
//!
//! Replies are consumed in order; every request is recorded for inspection.

use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{Headers, HttpRequest, HttpResponse, Transport};

#[derive(Debug)]
enum Reply {
  Response(HttpResponse),
  Failure(String),
}

#[derive(Debug, Default)]
struct MockTransportInner {
  replies: VecDeque<Reply>,
  requests: Vec<HttpRequest>,
}

/// Transport that answers from a queue of scripted replies.
///
/// A request arriving with nothing scripted fails like an unreachable host.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
  inner: Arc<Mutex<MockTransportInner>>,
}

impl MockTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Queue a JSON response with the given status.
  pub fn respond_json(&self, status: u16, body: Value) {
    let mut headers = Headers::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    self.respond_raw(status, headers, body.to_string().into_bytes());
  }

  /// Queue a response with an arbitrary body.
  pub fn respond_raw(&self, status: u16, headers: Headers, body: Vec<u8>) {
    let mut inner = self.inner.lock().unwrap();
    inner.replies.push_back(Reply::Response(HttpResponse {
      status,
      headers,
      body,
    }));
  }

  /// Queue a transport failure.
  pub fn fail(&self, error: &str) {
    let mut inner = self.inner.lock().unwrap();
    inner.replies.push_back(Reply::Failure(error.to_string()));
  }

  /// All requests sent so far.
  pub fn requests(&self) -> Vec<HttpRequest> {
    self.inner.lock().unwrap().requests.clone()
  }

  /// Number of requests sent so far.
  pub fn request_count(&self) -> usize {
    self.inner.lock().unwrap().requests.len()
  }
}

impl Transport for MockTransport {
  fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
    let reply = {
      let mut inner = self.inner.lock().unwrap();
      inner.requests.push(request.clone());
      inner.replies.pop_front()
    };

    async move {
      match reply {
        Some(Reply::Response(response)) => Ok(response),
        Some(Reply::Failure(error)) => Err(eyre!("{}", error)),
        None => Err(eyre!("connection refused: {}", request.url)),
      }
    }
    .boxed()
  }
}
