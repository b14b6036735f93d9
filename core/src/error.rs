//! Error types for the ToonDB client.
//!
//! # Design
//! Every failure a caller can see is one variant of `ToonDbError`, so callers
//! branch with `match` instead of inspecting a type hierarchy. Status-derived
//! variants are produced by `error_for_status`, a pure function of the status
//! code and raw body. `NotFound` and `RateLimited` still render the status
//! and body in their messages, like the generic `Api` variant.

use serde_json::Value;
use thiserror::Error;

/// Message used when a 400 body carries no `error` field.
pub const VALIDATION_FALLBACK: &str = "Validation error";

/// Errors returned by `ToonDbClient` operations.
#[derive(Debug, Error)]
pub enum ToonDbError {
    /// HTTP 401. The body is never consulted.
    #[error("Invalid API key or unauthorized")]
    Authentication,

    /// HTTP 400. `errors` holds per-field details when the server sent them.
    #[error("{message}")]
    Validation { message: String, errors: Vec<String> },

    /// HTTP 404.
    #[error("not found: 404 - {body}")]
    NotFound { body: String },

    /// HTTP 429.
    #[error("rate limit exceeded: 429 - {body}")]
    RateLimited { body: String },

    /// Any other non-2xx status.
    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    /// No response was obtained: refused connection, timeout, DNS or TLS failure.
    #[error("request failed: {0}")]
    Transport(String),

    /// A 2xx response whose body is not the expected JSON shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The request payload could not be encoded as JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ToonDbError {
    /// The HTTP status behind this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ToonDbError::Authentication => Some(401),
            ToonDbError::Validation { .. } => Some(400),
            ToonDbError::NotFound { .. } => Some(404),
            ToonDbError::RateLimited { .. } => Some(429),
            ToonDbError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Transport failures and 5xx responses; never 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            ToonDbError::Transport(_) => true,
            ToonDbError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Map a non-2xx status and its raw body to an error.
pub fn error_for_status(status: u16, body: &str) -> ToonDbError {
    match status {
        401 => ToonDbError::Authentication,
        400 => validation_error(body),
        404 => ToonDbError::NotFound {
            body: body.to_string(),
        },
        429 => ToonDbError::RateLimited {
            body: body.to_string(),
        },
        _ => ToonDbError::Api {
            status,
            body: body.to_string(),
        },
    }
}

fn validation_error(body: &str) -> ToonDbError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    let message = match parsed.as_ref().and_then(|v| v.get("error")) {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Null) | None => VALIDATION_FALLBACK.to_string(),
        Some(other) => other.to_string(),
    };
    let errors = parsed
        .as_ref()
        .and_then(|v| v.get("errors"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    ToonDbError::Validation { message, errors }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_ignores_body() {
        for body in ["", "not json", r#"{"error":"token expired"}"#] {
            let err = error_for_status(401, body);
            assert!(matches!(err, ToonDbError::Authentication));
            assert_eq!(err.to_string(), "Invalid API key or unauthorized");
        }
    }

    #[test]
    fn bad_request_uses_error_field() {
        let err = error_for_status(400, r#"{"error":"name is required"}"#);
        assert!(matches!(&err, ToonDbError::Validation { message, .. } if message == "name is required"));
        assert_eq!(err.to_string(), "name is required");
    }

    #[test]
    fn bad_request_without_error_field_falls_back() {
        let err = error_for_status(400, r#"{"detail":"x"}"#);
        assert_eq!(err.to_string(), VALIDATION_FALLBACK);
    }

    #[test]
    fn bad_request_with_non_json_body_falls_back() {
        let err = error_for_status(400, "Invalid URL: Cannot parse `id`");
        assert_eq!(err.to_string(), VALIDATION_FALLBACK);
    }

    #[test]
    fn bad_request_collects_validation_details() {
        let body = r#"{"error":"Validation failed","errors":["Required field 'id' is missing"],"warnings":[]}"#;
        match error_for_status(400, body) {
            ToonDbError::Validation { message, errors } => {
                assert_eq!(message, "Validation failed");
                assert_eq!(errors, vec!["Required field 'id' is missing".to_string()]);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn other_statuses_embed_status_and_body() {
        for (status, body) in [(500, "boom"), (409, r#"{"error":"dup"}"#), (404, "missing"), (429, "slow down"), (302, "")] {
            let message = error_for_status(status, body).to_string();
            assert!(message.contains(&status.to_string()), "{message}");
            assert!(message.contains(body), "{message}");
        }
    }

    #[test]
    fn not_found_and_rate_limit_have_dedicated_variants() {
        assert!(matches!(error_for_status(404, ""), ToonDbError::NotFound { .. }));
        assert!(matches!(error_for_status(429, ""), ToonDbError::RateLimited { .. }));
        assert!(matches!(error_for_status(503, ""), ToonDbError::Api { status: 503, .. }));
    }

    #[test]
    fn status_round_trips_through_the_mapper() {
        for status in [400, 401, 404, 418, 429, 500] {
            assert_eq!(error_for_status(status, "").status(), Some(status));
        }
        assert_eq!(ToonDbError::Transport("x".into()).status(), None);
    }

    #[test]
    fn only_transport_and_server_errors_are_retryable() {
        assert!(ToonDbError::Transport("refused".into()).is_retryable());
        assert!(error_for_status(502, "").is_retryable());
        assert!(!error_for_status(400, "").is_retryable());
        assert!(!error_for_status(401, "").is_retryable());
        assert!(!error_for_status(404, "").is_retryable());
        assert!(!error_for_status(429, "").is_retryable());
        assert!(!ToonDbError::MalformedResponse("x".into()).is_retryable());
    }
}
