//! Records returned by the ToonDB API and payloads sent to it.
//!
//! # Design
//! Records are immutable snapshots of server state; nothing here is cached
//! or shared between calls. Payload types encode "absent" with `Option` and
//! `skip_serializing_if`, so an omitted field never reaches the wire.
//! Mutation outcomes default every missing field, mirroring how loosely the
//! service shapes those bodies.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ToonDbError;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A named server-side dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Table {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Field name to type name, as inferred by the server.
    #[serde(default)]
    pub schema_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub row_count: u64,
    /// Decoded table contents. Opaque to the client.
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub toon_content: Option<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default)]
    pub is_public: bool,
    pub created_at: String,
    pub updated_at: String,
}

fn default_delimiter() -> String {
    ",".to_string()
}

impl Table {
    pub fn created_datetime(&self) -> Result<DateTime<FixedOffset>, ToonDbError> {
        parse_timestamp("created_at", &self.created_at)
    }

    pub fn updated_datetime(&self) -> Result<DateTime<FixedOffset>, ToonDbError> {
        parse_timestamp("updated_at", &self.updated_at)
    }
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<FixedOffset>, ToonDbError> {
    DateTime::parse_from_rfc3339(raw)
        .map_err(|e| ToonDbError::MalformedResponse(format!("{field} {raw:?} is not ISO-8601: {e}")))
}

/// Rows produced by `Queries::execute`.
///
/// `row_count` is reported by the server and is not checked against
/// `results.len()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub results: Vec<Value>,
    pub execution_time_ms: u64,
    pub row_count: u64,
}

/// Token counts for the same data in TOON and JSON form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TokenComparison {
    pub toon: u64,
    pub json: u64,
    /// `json - toon`; negative when TOON is larger.
    pub savings: i64,
    /// `savings / json * 100`, two decimals with ties rounded up, `0.0`
    /// when `json` is zero.
    #[serde(alias = "savingsPercentage")]
    pub savings_percentage: f64,
}

impl TokenComparison {
    pub fn from_counts(toon: u64, json: u64) -> Self {
        let savings = json as i64 - toon as i64;
        let savings_percentage = if json == 0 {
            0.0
        } else {
            (savings as f64 / json as f64 * 100.0 * 100.0 + 0.5).floor() / 100.0
        };
        Self {
            toon,
            json,
            savings,
            savings_percentage,
        }
    }
}

impl fmt::Display for TokenComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TOON: {} tokens", self.toon)?;
        writeln!(f, "JSON: {} tokens", self.json)?;
        write!(
            f,
            "Savings: {} tokens ({}%)",
            self.savings, self.savings_percentage
        )
    }
}

/// API key metadata. The full key is only ever returned once, by
/// `ApiKeys::create`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey {
    pub id: Uuid,
    pub name: String,
    pub key_prefix: String,
    #[serde(default)]
    pub last_used_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedApiKey {
    pub api_key: ApiKey,
    pub key: String,
    #[serde(default)]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub api_quota: u64,
    #[serde(default)]
    pub storage_quota_gb: u64,
    #[serde(default)]
    pub created_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Table payloads
// ---------------------------------------------------------------------------

/// Field separator used inside TOON rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delimiter {
    #[default]
    #[serde(rename = ",")]
    Comma,
    #[serde(rename = "\t")]
    Tab,
    #[serde(rename = "|")]
    Pipe,
}

/// Request payload for `Tables::create`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateTable {
    pub name: String,
    pub toon_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub delimiter: Delimiter,
}

impl CreateTable {
    pub fn new(name: impl Into<String>, toon_content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            toon_content: toon_content.into(),
            description: None,
            delimiter: Delimiter::default(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// Request payload for `Tables::update`. Only fields that were set are sent.
///
/// `description` is doubly optional: `Some(None)` sends `null` to clear the
/// description, `None` leaves it untouched.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct UpdateTable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toon_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

impl UpdateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(Some(description.into()));
        self
    }

    pub fn clear_description(mut self) -> Self {
        self.description = Some(None);
        self
    }

    pub fn toon_content(mut self, toon_content: impl Into<String>) -> Self {
        self.toon_content = Some(toon_content.into());
        self
    }

    pub fn is_public(mut self, is_public: bool) -> Self {
        self.is_public = Some(is_public);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// One step of `Tables::bulk_operation`, tagged on the wire by `op`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BulkOperation {
    Update { path: String, value: Value },
    Insert { path: String, item: Map<String, Value> },
    Delete { path: String, selector: Map<String, Value> },
}

// ---------------------------------------------------------------------------
// Mutation outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateOutcome {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "modifiedCount")]
    pub modified_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InsertOutcome {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "insertedCount")]
    pub inserted_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteOutcome {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "deletedCount")]
    pub deleted_count: u64,
}

/// Result of a bulk request. `results` has one entry per submitted
/// operation, in submission order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkOutcome {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub results: Vec<BulkStepOutcome>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkStepOutcome {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub count: u64,
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Toon,
}

/// Encoder/decoder options forwarded to `/api/convert`. Unset fields are
/// omitted, so the default value serializes as `{}`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ConvertOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indent: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<Delimiter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Raw `/api/convert` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversion {
    pub output: String,
    #[serde(default)]
    pub token_comparison: Option<TokenComparison>,
}
