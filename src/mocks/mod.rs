//! Mock transport for testing.
//!
//! Responses are served in queue order; every request is recorded together
//! with the (tokio) instant it was sent, so tests running on paused time can
//! assert how long the client waited between attempts.

use crate::errors::TransportError;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// Mock HTTP response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl MockResponse {
    /// Creates a response with a status and body.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Creates a 200 response with a JSON body.
    pub fn json(value: Value) -> Self {
        Self::new(200, value.to_string()).with_header("content-type", "application/json")
    }

    /// Creates a JSON response with an explicit status.
    pub fn json_status(status: u16, value: Value) -> Self {
        Self::new(status, value.to_string()).with_header("content-type", "application/json")
    }

    /// Creates a 204 No Content response.
    pub fn no_content() -> Self {
        Self::new(204, Bytes::new())
    }

    /// Creates a 429 response carrying `Retry-After`.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::json_status(
            429,
            serde_json::json!({"title": "Too Many Requests", "detail": "Too Many Requests", "type": "about:blank", "status": 429}),
        )
        .with_header("retry-after", retry_after_secs.to_string())
    }

    /// Adds a header to the response.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    fn into_http(self) -> Result<HttpResponse, TransportError> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| TransportError::Http(format!("Invalid mock status: {}", e)))?;

        let mut headers = HeaderMap::new();
        for (key, value) in self.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| TransportError::Http(format!("Invalid mock header: {}", e)))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| TransportError::Http(format!("Invalid mock header: {}", e)))?;
            headers.append(name, value);
        }

        Ok(HttpResponse::new(status, headers, self.body))
    }
}

/// A queued outcome.
#[derive(Debug, Clone)]
enum MockReply {
    Response(MockResponse),
    Error(TransportError),
}

/// A request seen by the mock, with the instant it arrived.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// The request.
    pub request: HttpRequest,
    /// When it was sent.
    pub at: Instant,
}

/// Mock HTTP transport for testing.
pub struct MockTransport {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    /// Creates a mock transport with no responses.
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates a mock transport with queued responses.
    pub fn with_responses(responses: Vec<MockResponse>) -> Self {
        let transport = Self::new();
        for response in responses {
            transport.push(response);
        }
        transport
    }

    /// Queues a response.
    pub fn push(&self, response: MockResponse) -> &Self {
        lock(&self.replies).push_back(MockReply::Response(response));
        self
    }

    /// Queues a transport failure.
    pub fn push_error(&self, error: TransportError) -> &Self {
        lock(&self.replies).push_back(MockReply::Error(error));
        self
    }

    /// Returns all recorded requests.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests)
            .iter()
            .map(|r| r.request.clone())
            .collect()
    }

    /// Returns all recorded requests with their timestamps.
    pub fn recorded(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Returns the number of requests made.
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Returns the last request made.
    pub fn last_request(&self) -> Option<HttpRequest> {
        lock(&self.requests).last().map(|r| r.request.clone())
    }

    /// Returns the number of replies still queued.
    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        lock(&self.requests).push(RecordedRequest {
            request,
            at: Instant::now(),
        });

        let reply = lock(&self.replies).pop_front();
        match reply {
            Some(MockReply::Response(mock)) => mock.into_http(),
            Some(MockReply::Error(error)) => Err(error),
            None => Err(TransportError::Network(
                "No mock response available".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("queued_replies", &lock(&self.replies).len())
            .field("recorded_requests", &lock(&self.requests).len())
            .finish()
    }
}
