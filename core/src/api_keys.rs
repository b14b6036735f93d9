//! API key management under `/api/api-keys`.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ToonDbError;
use crate::http::HttpMethod;
use crate::transport::{decode, envelope_or_default, Transport};
use crate::types::{ApiKey, CreatedApiKey};

#[derive(Serialize)]
struct CreateApiKeyRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in_days: Option<u32>,
}

#[derive(Clone, Copy)]
pub struct ApiKeys<'a> {
    transport: &'a Transport,
}

impl<'a> ApiKeys<'a> {
    pub(crate) fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    /// Keys of the calling user, newest first. Only prefixes are returned.
    pub fn list(&self) -> Result<Vec<ApiKey>, ToonDbError> {
        let body = self.transport.get("/api/api-keys")?;
        envelope_or_default(body, "api_keys")
    }

    /// Issue a new key. `CreatedApiKey::key` is the only time the full key
    /// is visible.
    pub fn create(&self, name: &str, expires_in_days: Option<u32>) -> Result<CreatedApiKey, ToonDbError> {
        let request = CreateApiKeyRequest {
            name,
            expires_in_days,
        };
        let body = self.transport.send(HttpMethod::Post, "/api/api-keys", &request)?;
        decode(body)
    }

    /// Revoke a key and return the server's confirmation message.
    pub fn revoke(&self, id: Uuid) -> Result<String, ToonDbError> {
        let body = self.transport.delete(&format!("/api/api-keys/{id}"))?;
        Ok(body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}
