//! Request construction, dispatch and response interpretation.
//!
//! # Design
//! `Transport` owns the immutable `ClientConfig` and an `HttpExecutor`.
//! `build_request` and `parse_response` are pure and tested without I/O;
//! `request` wires them together through the executor.
//!
//! GET requests that fail with a transport error or a 5xx status are retried
//! up to `max_retries` times with exponential backoff. Other methods and
//! every 4xx response are returned to the caller on the first attempt.

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{error_for_status, ToonDbError};
use crate::http::{HttpExecutor, HttpMethod, HttpRequest, HttpResponse};

pub struct Transport {
    config: ClientConfig,
    executor: Box<dyn HttpExecutor>,
}

impl Transport {
    pub fn new(config: ClientConfig, executor: Box<dyn HttpExecutor>) -> Self {
        Self { config, executor }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build the request for `path` (which must start with `/`).
    ///
    /// Authorization and content-type headers are attached to every request.
    pub fn build_request<B>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        query: &[(&str, &str)],
    ) -> Result<HttpRequest, ToonDbError>
    where
        B: Serialize + ?Sized,
    {
        let body = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ToonDbError::Serialization(e.to_string()))?;

        Ok(HttpRequest {
            method,
            url: format!("{}{path}", self.config.url()),
            headers: vec![
                (
                    "authorization".to_string(),
                    format!("Bearer {}", self.config.api_key()),
                ),
                ("content-type".to_string(), "application/json".to_string()),
            ],
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
        })
    }

    /// Map a response to its JSON body or an error.
    ///
    /// An empty 2xx body yields `Value::Null`.
    pub fn parse_response(response: &HttpResponse) -> Result<Value, ToonDbError> {
        if !response.is_success() {
            return Err(error_for_status(response.status, &response.body));
        }
        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response.body)
            .map_err(|e| ToonDbError::MalformedResponse(format!("response body is not JSON: {e}")))
    }

    pub fn request<B>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        query: &[(&str, &str)],
    ) -> Result<Value, ToonDbError>
    where
        B: Serialize + ?Sized,
    {
        let request = self.build_request(method, path, body, query)?;
        let attempts = if method.is_safe() {
            self.config.max_retries().saturating_add(1)
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            match self.dispatch(&request, attempt) {
                Err(err) if attempt + 1 < attempts && err.is_retryable() => {
                    let delay = backoff(self.config.retry_backoff(), attempt);
                    warn!(
                        method = %request.method,
                        url = %request.url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying request"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    pub(crate) fn get(&self, path: &str) -> Result<Value, ToonDbError> {
        self.request::<Value>(HttpMethod::Get, path, None, &[])
    }

    pub(crate) fn delete(&self, path: &str) -> Result<Value, ToonDbError> {
        self.request::<Value>(HttpMethod::Delete, path, None, &[])
    }

    pub(crate) fn send<B>(&self, method: HttpMethod, path: &str, body: &B) -> Result<Value, ToonDbError>
    where
        B: Serialize + ?Sized,
    {
        self.request(method, path, Some(body), &[])
    }

    fn dispatch(&self, request: &HttpRequest, attempt: u32) -> Result<Value, ToonDbError> {
        debug!(method = %request.method, url = %request.url, attempt, "sending request");
        let started = Instant::now();
        let response = self.executor.execute(request)?;
        debug!(
            method = %request.method,
            url = %request.url,
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "received response"
        );
        Self::parse_response(&response)
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16))
}

/// Pull `field` out of a response envelope and decode it.
pub(crate) fn envelope<T: DeserializeOwned>(mut body: Value, field: &str) -> Result<T, ToonDbError> {
    let value = body
        .get_mut(field)
        .map(Value::take)
        .ok_or_else(|| ToonDbError::MalformedResponse(format!("response is missing `{field}`")))?;
    serde_json::from_value(value)
        .map_err(|e| ToonDbError::MalformedResponse(format!("invalid `{field}` in response: {e}")))
}

/// Like `envelope`, but a missing or null field decodes to `T::default()`.
pub(crate) fn envelope_or_default<T>(mut body: Value, field: &str) -> Result<T, ToonDbError>
where
    T: DeserializeOwned + Default,
{
    match body.get_mut(field).map(Value::take) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| {
            ToonDbError::MalformedResponse(format!("invalid `{field}` in response: {e}"))
        }),
    }
}

/// Decode a whole response body.
pub(crate) fn decode<T: DeserializeOwned>(body: Value) -> Result<T, ToonDbError> {
    serde_json::from_value(body)
        .map_err(|e| ToonDbError::MalformedResponse(format!("unexpected response shape: {e}")))
}
