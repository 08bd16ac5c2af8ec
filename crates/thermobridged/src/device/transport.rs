//! HTTP transport for device requests.
//!
//! The transport executes one [`DeviceRequest`] and resolves the response
//! body. HTTP status codes are not consulted; device failures are signaled
//! in-band through the response body and handled by the caller.

use std::time::Duration;

use async_trait::async_trait;

use super::error::{Error, Result};
use super::request::DeviceRequest;

/// A response body, parsed as far as the call tolerates.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    /// Raw body text, returned when the caller tolerates non-JSON responses.
    Text(String),
}

/// What the caller requires of the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// The body must parse as JSON; anything else is a parse failure.
    Json,
    /// A non-JSON body is returned verbatim instead of failing.
    JsonOrText,
}

/// Trait for executing device requests.
///
/// This is the seam that lets engine tests substitute a scripted transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: DeviceRequest, expect: Expect) -> Result<Payload>;
}

/// Production transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport, optionally bounding each request's total time.
    ///
    /// Without a timeout a non-responding remote blocks the issuing
    /// operation indefinitely; callers that need responsiveness must bound
    /// the wait themselves.
    pub fn new(timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: DeviceRequest, expect: Expect) -> Result<Payload> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        match serde_json::from_str(&text) {
            Ok(value) => Ok(Payload::Json(value)),
            Err(e) => match expect {
                Expect::Json => Err(Error::Parse(e.to_string())),
                Expect::JsonOrText => Ok(Payload::Text(text)),
            },
        }
    }
}

/// Scripted transport for engine tests: records every request and answers
/// from a queue, succeeding with an empty object once the queue runs dry.
#[cfg(test)]
pub(crate) struct MockTransport {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<Payload>>>,
    requests: std::sync::Mutex<Vec<DeviceRequest>>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(std::collections::VecDeque::new()),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.push(Ok(Payload::Json(value)));
    }

    pub fn push(&self, response: Result<Payload>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<DeviceRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: DeviceRequest, _expect: Expect) -> Result<Payload> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Payload::Json(serde_json::json!({}))))
    }
}
