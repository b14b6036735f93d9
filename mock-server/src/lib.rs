//! In-memory stand-in for the ToonDB HTTP API.
//!
//! Serves the same routes, envelopes and error bodies as the hosted service,
//! backed by a `RwLock`ed store. Table contents use the small tabular TOON
//! subset in `tabular`; queries support `SELECT * FROM <table> [LIMIT n]`.
//! Every route requires `Authorization: Bearer <key>`, where the key is the
//! one the app was built with or one issued through `/api/api-keys`.

pub mod tabular;

use std::{collections::HashMap, sync::Arc, time::Instant};

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{Duration, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_API_KEY: &str = "test-key";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Table {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub schema_fields: Map<String, Value>,
    pub row_count: usize,
    pub data: Value,
    pub toon_content: Option<String>,
    pub delimiter: String,
    pub is_public: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Table {
    /// Recompute everything derived from `data` after a mutation.
    fn refresh(&mut self) {
        let delimiter = self.delimiter.chars().next().unwrap_or(',');
        self.row_count = tabular::row_count(&self.data);
        self.toon_content = tabular::encode(&self.data, delimiter).ok();
        self.updated_at = now();
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub name: String,
    pub key_prefix: String,
    pub last_used_at: Option<String>,
    pub expires_at: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

struct IssuedKey {
    record: ApiKey,
    secret: String,
}

pub struct Store {
    master_key: String,
    user_id: Uuid,
    created_at: String,
    tables: HashMap<Uuid, Table>,
    api_keys: Vec<IssuedKey>,
}

impl Store {
    fn new(master_key: &str) -> Self {
        Self {
            master_key: master_key.to_string(),
            user_id: Uuid::new_v4(),
            created_at: now(),
            tables: HashMap::new(),
            api_keys: Vec::new(),
        }
    }

    fn accepts(&mut self, presented: &str) -> bool {
        if presented == self.master_key {
            return true;
        }
        match self
            .api_keys
            .iter_mut()
            .find(|k| k.secret == presented && k.record.is_active)
        {
            Some(issued) => {
                issued.record.last_used_at = Some(now());
                true
            }
            None => false,
        }
    }

    fn table_mut(&mut self, id: Uuid) -> Result<&mut Table, ApiError> {
        self.tables.get_mut(&id).ok_or_else(table_not_found)
    }
}

pub type Db = Arc<RwLock<Store>>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error response carrying the service's `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, message)
}

fn table_not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Table not found")
}

type ApiResult<T = Json<Value>> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Marks a field as present even when its JSON value is `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn yes() -> bool {
    true
}

fn comma() -> String {
    ",".to_string()
}

#[derive(Deserialize)]
pub struct CreateTable {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub toon_content: String,
    pub description: Option<String>,
    #[serde(default = "comma")]
    pub delimiter: String,
}

#[derive(Deserialize)]
pub struct UpdateTable {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub toon_content: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Deserialize)]
pub struct UpdateValue {
    pub path: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
}

#[derive(Deserialize)]
pub struct InsertItem {
    pub path: Option<String>,
    pub item: Option<Value>,
    #[serde(default = "yes")]
    pub validate: bool,
}

#[derive(Deserialize)]
pub struct DeleteItem {
    pub path: Option<String>,
    pub selector: Option<Value>,
}

#[derive(Deserialize)]
pub struct Bulk {
    pub operations: Option<Value>,
}

#[derive(Deserialize)]
pub struct Query {
    pub table_id: Option<Uuid>,
    pub sql: Option<String>,
}

#[derive(Deserialize)]
pub struct Convert {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub from_format: String,
    #[serde(default)]
    pub to_format: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

#[derive(Deserialize)]
pub struct CreateApiKey {
    #[serde(default)]
    pub name: String,
    pub expires_in_days: Option<i64>,
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub fn app() -> Router {
    app_with_key(DEFAULT_API_KEY)
}

pub fn app_with_key(api_key: &str) -> Router {
    let db: Db = Arc::new(RwLock::new(Store::new(api_key)));
    Router::new()
        .route("/api/tables", get(list_tables).post(create_table))
        .route(
            "/api/tables/{id}",
            get(get_table).put(update_table).delete(delete_table),
        )
        .route("/api/tables/{id}/update", post(update_value))
        .route("/api/tables/{id}/insert", post(insert_item))
        .route("/api/tables/{id}/delete", post(delete_item))
        .route("/api/tables/{id}/bulk", post(bulk_operation))
        .route("/api/query", post(execute_query))
        .route("/api/convert", post(convert))
        .route("/api/api-keys", get(list_api_keys).post(create_api_key))
        .route("/api/api-keys/{id}", delete(revoke_api_key))
        .route("/api/user", get(current_user))
        .layer(middleware::from_fn_with_state(db.clone(), require_api_key))
        .layer(TraceLayer::new_for_http())
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_key(listener, DEFAULT_API_KEY).await
}

pub async fn run_with_key(listener: TcpListener, api_key: &str) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock ToonDB API listening");
    }
    axum::serve(listener, app_with_key(api_key)).await
}

async fn require_api_key(State(db): State<Db>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    let authorized = match presented {
        Some(key) => db.write().await.accepts(&key),
        None => false,
    };
    if !authorized {
        debug!(uri = %request.uri(), "rejecting request without a valid API key");
        return ApiError::new(StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    next.run(request).await
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_delimiter(raw: &str) -> Result<char, ApiError> {
    match raw {
        "," => Ok(','),
        "\t" => Ok('\t'),
        "|" => Ok('|'),
        other => Err(bad_request(format!(
            "Unsupported delimiter {other:?}; use ',', '\\t' or '|'"
        ))),
    }
}

fn required_path(path: Option<String>) -> Result<String, ApiError> {
    path.filter(|p| !p.trim().is_empty())
        .ok_or_else(|| bad_request("path is required"))
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

async fn list_tables(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    let mut tables: Vec<&Table> = store.tables.values().collect();
    tables.sort_by(|a, b| a.name.cmp(&b.name));
    Json(json!({ "tables": tables }))
}

async fn create_table(
    State(db): State<Db>,
    Json(input): Json<CreateTable>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if input.name.trim().is_empty() || input.toon_content.trim().is_empty() {
        return Err(bad_request("name and toon_content are required"));
    }
    let delimiter = parse_delimiter(&input.delimiter)?;
    let data = tabular::decode(&input.toon_content, delimiter)
        .map_err(|e| bad_request(format!("Failed to parse TOON: {e}")))?;

    let mut store = db.write().await;
    if store.tables.values().any(|t| t.name == input.name) {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "A table with this name already exists",
        ));
    }
    let created_at = now();
    let table = Table {
        id: Uuid::new_v4(),
        user_id: store.user_id,
        name: input.name,
        description: input.description,
        schema_fields: tabular::infer_schema(&data),
        row_count: tabular::row_count(&data),
        data,
        toon_content: Some(input.toon_content),
        delimiter: input.delimiter,
        is_public: false,
        created_at: created_at.clone(),
        updated_at: created_at,
    };
    store.tables.insert(table.id, table.clone());
    Ok((StatusCode::CREATED, Json(json!({ "table": table }))))
}

async fn get_table(State(db): State<Db>, Path(id): Path<Uuid>) -> ApiResult {
    let store = db.read().await;
    let table = store.tables.get(&id).ok_or_else(table_not_found)?;
    Ok(Json(json!({ "table": table })))
}

async fn update_table(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTable>,
) -> ApiResult {
    if input.name.is_none()
        && input.description.is_none()
        && input.toon_content.is_none()
        && input.is_public.is_none()
    {
        return Err(bad_request("No fields to update"));
    }

    let mut store = db.write().await;
    if let Some(name) = &input.name {
        if store.tables.values().any(|t| t.id != id && &t.name == name) {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "A table with this name already exists",
            ));
        }
    }
    let table = store.table_mut(id)?;
    if let Some(toon_content) = &input.toon_content {
        let delimiter = parse_delimiter(&table.delimiter)?;
        let data = tabular::decode(toon_content, delimiter)
            .map_err(|e| bad_request(format!("Failed to parse TOON: {e}")))?;
        table.schema_fields = tabular::infer_schema(&data);
        table.row_count = tabular::row_count(&data);
        table.data = data;
        table.toon_content = Some(toon_content.clone());
    }
    if let Some(name) = input.name {
        table.name = name;
    }
    if let Some(description) = input.description {
        table.description = description;
    }
    if let Some(is_public) = input.is_public {
        table.is_public = is_public;
    }
    table.updated_at = now();
    Ok(Json(json!({ "table": table })))
}

async fn delete_table(State(db): State<Db>, Path(id): Path<Uuid>) -> ApiResult {
    let mut store = db.write().await;
    store.tables.remove(&id).ok_or_else(table_not_found)?;
    Ok(Json(json!({ "success": true })))
}

async fn update_value(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateValue>,
) -> ApiResult {
    let path = required_path(input.path)?;
    let value = input.value.ok_or_else(|| bad_request("value is required"))?;

    let mut store = db.write().await;
    let table = store.table_mut(id)?;
    let modified = tabular::update_value(&mut table.data, &path, &value).map_err(bad_request)?;
    table.refresh();
    Ok(Json(json!({
        "success": true,
        "message": format!("Updated {modified} item(s)"),
        "modifiedCount": modified,
    })))
}

async fn insert_item(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(input): Json<InsertItem>,
) -> ApiResult {
    let path = required_path(input.path)?;
    let item = match input.item {
        Some(Value::Object(item)) => item,
        _ => return Err(bad_request("item must be an object")),
    };

    let mut store = db.write().await;
    let table = store.table_mut(id)?;
    if input.validate && !table.schema_fields.is_empty() {
        let errors = tabular::validate_item(&table.schema_fields, &item);
        if !errors.is_empty() {
            return Err(ApiError {
                status: StatusCode::BAD_REQUEST,
                body: json!({ "error": "Validation failed", "errors": errors, "warnings": [] }),
            });
        }
    }
    let inserted = tabular::insert_item(&mut table.data, &path, &item).map_err(bad_request)?;
    table.refresh();
    Ok(Json(json!({
        "success": true,
        "message": format!("Inserted {inserted} item(s)"),
        "insertedCount": inserted,
    })))
}

async fn delete_item(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(input): Json<DeleteItem>,
) -> ApiResult {
    let path = required_path(input.path)?;
    let selector = match input.selector {
        Some(Value::Object(selector)) => selector,
        _ => return Err(bad_request("selector must be an object")),
    };

    let mut store = db.write().await;
    let table = store.table_mut(id)?;
    let deleted = tabular::delete_items(&mut table.data, &path, &selector).map_err(bad_request)?;
    table.refresh();
    Ok(Json(json!({
        "success": true,
        "message": format!("Deleted {deleted} item(s)"),
        "deletedCount": deleted,
    })))
}

async fn bulk_operation(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(input): Json<Bulk>,
) -> ApiResult {
    let operations = match input.operations {
        Some(Value::Array(operations)) => operations,
        _ => return Err(bad_request("operations must be an array")),
    };
    if operations.is_empty() {
        return Err(bad_request("operations array cannot be empty"));
    }
    for op in &operations {
        let kind = op.get("op").and_then(Value::as_str).unwrap_or_default();
        if !matches!(kind, "update" | "insert" | "delete") {
            return Err(bad_request(format!("Invalid operation type: {kind}")));
        }
        if op.get("path").and_then(Value::as_str).is_none() {
            return Err(bad_request("Each operation must have a path"));
        }
    }

    let mut store = db.write().await;
    let table = store.table_mut(id)?;
    let mut results = Vec::with_capacity(operations.len());
    for op in &operations {
        let path = op["path"].as_str().unwrap_or_default();
        let outcome = match op["op"].as_str() {
            Some("update") => {
                tabular::update_value(&mut table.data, path, op.get("value").unwrap_or(&Value::Null))
            }
            Some("insert") => match op.get("item").and_then(Value::as_object) {
                Some(item) => tabular::insert_item(&mut table.data, path, item),
                None => Err("item must be an object".to_string()),
            },
            _ => match op.get("selector").and_then(Value::as_object) {
                Some(selector) => tabular::delete_items(&mut table.data, path, selector),
                None => Err("selector must be an object".to_string()),
            },
        };
        results.push(match outcome {
            Ok(count) => json!({ "success": true, "message": format!("{} ok", op["op"].as_str().unwrap_or_default()), "count": count }),
            Err(message) => json!({ "success": false, "message": message, "count": 0 }),
        });
    }
    table.refresh();

    let success = results.iter().all(|r| r["success"] == true);
    Ok(Json(json!({
        "success": success,
        "message": format!("Executed {} operation(s)", results.len()),
        "results": results,
    })))
}

// ---------------------------------------------------------------------------
// Query and conversion
// ---------------------------------------------------------------------------

async fn execute_query(State(db): State<Db>, Json(input): Json<Query>) -> ApiResult {
    let sql = input
        .sql
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| bad_request("sql is required"))?;
    let table_id = input
        .table_id
        .ok_or_else(|| bad_request("table_id is required"))?;

    let started = Instant::now();
    let store = db.read().await;
    let table = store.tables.get(&table_id).ok_or_else(table_not_found)?;

    let tokens: Vec<&str> = sql.trim_end_matches(';').split_whitespace().collect();
    let upper: Vec<String> = tokens.iter().map(|t| t.to_ascii_uppercase()).collect();
    let (source, limit) = match upper.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["SELECT", "*", "FROM", _] => (tokens[3], None),
        ["SELECT", "*", "FROM", _, "LIMIT", n] => (
            tokens[3],
            Some(n.parse::<usize>().map_err(|_| bad_request(format!("Invalid LIMIT {n}")))?),
        ),
        _ => {
            return Err(bad_request(
                "Unsupported query: only SELECT * FROM <table> [LIMIT n] is supported",
            ))
        }
    };

    // The table's own name addresses its first collection.
    let collection = match table.data.get(source) {
        Some(rows) => Some(rows),
        None if source == table.name => table.data.as_object().and_then(|m| m.values().next()),
        None => None,
    };
    let rows = collection
        .and_then(Value::as_array)
        .ok_or_else(|| bad_request(format!("Unknown table '{source}'")))?;
    let results: Vec<Value> = rows.iter().take(limit.unwrap_or(usize::MAX)).cloned().collect();

    Ok(Json(json!({
        "row_count": results.len(),
        "results": results,
        "execution_time_ms": started.elapsed().as_millis() as u64,
    })))
}

async fn convert(Json(input): Json<Convert>) -> ApiResult {
    if input.content.is_empty() || input.from_format.is_empty() || input.to_format.is_empty() {
        return Err(bad_request("content, from_format, and to_format are required"));
    }
    let delimiter = match input.options.get("delimiter").and_then(Value::as_str) {
        Some(raw) => parse_delimiter(raw)?,
        None => ',',
    };
    let conversion_failed = |e: String| bad_request(format!("Conversion failed: {e}"));

    let (output, toon, json_text) = match (input.from_format.as_str(), input.to_format.as_str()) {
        ("json", "toon") => {
            let value: Value = serde_json::from_str(&input.content)
                .map_err(|e| conversion_failed(e.to_string()))?;
            let output = tabular::encode(&value, delimiter).map_err(conversion_failed)?;
            (output.clone(), output, input.content.clone())
        }
        ("toon", "json") => {
            let value = tabular::decode(&input.content, delimiter).map_err(conversion_failed)?;
            let output = serde_json::to_string_pretty(&value)
                .map_err(|e| conversion_failed(e.to_string()))?;
            (output.clone(), input.content.clone(), output)
        }
        _ => {
            return Err(bad_request(
                "Invalid conversion format. Supported: json->toon, toon->json",
            ))
        }
    };

    let toon_tokens = tabular::estimate_tokens(&toon);
    let json_tokens = tabular::estimate_tokens(&json_text);
    let savings = json_tokens as i64 - toon_tokens as i64;
    let percentage = if json_tokens > 0 {
        (savings as f64 / json_tokens as f64 * 100.0 * 100.0 + 0.5).floor() / 100.0
    } else {
        0.0
    };
    Ok(Json(json!({
        "output": output,
        "token_comparison": {
            "toon": toon_tokens,
            "json": json_tokens,
            "savings": savings,
            "savingsPercentage": percentage,
        },
    })))
}

// ---------------------------------------------------------------------------
// API keys and user
// ---------------------------------------------------------------------------

async fn list_api_keys(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    let keys: Vec<&ApiKey> = store.api_keys.iter().rev().map(|k| &k.record).collect();
    Json(json!({ "api_keys": keys }))
}

async fn create_api_key(
    State(db): State<Db>,
    Json(input): Json<CreateApiKey>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if input.name.trim().is_empty() {
        return Err(bad_request("Name is required"));
    }
    let secret = format!(
        "toon_{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    );
    let expires_at = input
        .expires_in_days
        .filter(|days| *days > 0)
        .and_then(Duration::try_days)
        .map(|ttl| (Utc::now() + ttl).to_rfc3339_opts(SecondsFormat::Millis, true));
    let record = ApiKey {
        id: Uuid::new_v4(),
        name: input.name,
        key_prefix: secret[..12].to_string(),
        last_used_at: None,
        expires_at,
        is_active: true,
        created_at: now(),
    };

    db.write().await.api_keys.push(IssuedKey {
        record: record.clone(),
        secret: secret.clone(),
    });
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "api_key": record,
            "key": secret,
            "warning": "Save this key now. You won't be able to see it again.",
        })),
    ))
}

async fn revoke_api_key(State(db): State<Db>, Path(id): Path<Uuid>) -> Json<Value> {
    db.write().await.api_keys.retain(|k| k.record.id != id);
    Json(json!({ "message": "API key deleted successfully" }))
}

async fn current_user(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    Json(json!({
        "user": {
            "id": store.user_id,
            "email": "developer@example.com",
            "full_name": null,
            "avatar_url": null,
            "organization": null,
            "api_quota": 10000,
            "storage_quota_gb": 1,
            "created_at": store.created_at,
        }
    }))
}
