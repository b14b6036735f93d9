use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, app_with_key, DEFAULT_API_KEY};
use serde_json::{json, Value};
use tower::ServiceExt;

const USERS: &str = "users[2]{id,name,active}:\n  1,Alice,true\n  2,Bob,false";

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, format!("Bearer {DEFAULT_API_KEY}"))
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.map(|b| b.to_string()).unwrap_or_default())
        .unwrap()
}

/// Clones share the store, so state carries over between calls.
async fn call(app: &Router, req: Request<String>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    (status, body_json(resp).await)
}

async fn create_users(app: &Router) -> String {
    let (status, body) = call(
        app,
        request(
            "POST",
            "/api/tables",
            Some(json!({"name": "users", "toon_content": USERS})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["table"]["id"].as_str().unwrap().to_string()
}

// --- auth ---

#[tokio::test]
async fn missing_key_is_unauthorized() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/api/tables")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await, json!({"error": "Unauthorized"}));
}

#[tokio::test]
async fn wrong_key_is_unauthorized() {
    let resp = app_with_key("other-key")
        .oneshot(request("GET", "/api/tables", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// --- tables ---

#[tokio::test]
async fn list_tables_empty() {
    let resp = app()
        .oneshot(request("GET", "/api/tables", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"tables": []}));
}

#[tokio::test]
async fn create_table_returns_201_with_derived_fields() {
    let resp = app()
        .oneshot(request(
            "POST",
            "/api/tables",
            Some(json!({"name": "users", "toon_content": USERS, "description": "people"})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let table = body_json(resp).await["table"].clone();
    assert_eq!(table["name"], "users");
    assert_eq!(table["description"], "people");
    assert_eq!(table["row_count"], 2);
    assert_eq!(table["delimiter"], ",");
    assert_eq!(table["is_public"], false);
    assert_eq!(
        table["schema_fields"],
        json!({"id": "number", "name": "string", "active": "boolean"})
    );
    assert_eq!(table["data"]["users"][0]["name"], "Alice");
}

#[tokio::test]
async fn create_table_requires_name_and_content() {
    let resp = app()
        .oneshot(request("POST", "/api/tables", Some(json!({"name": "users"}))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(resp).await["error"],
        "name and toon_content are required"
    );
}

#[tokio::test]
async fn create_table_rejects_duplicate_name() {
    let app = app();
    create_users(&app).await;
    let (status, body) = call(
        &app,
        request(
            "POST",
            "/api/tables",
            Some(json!({"name": "users", "toon_content": USERS})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn unknown_table_is_not_found() {
    let resp = app()
        .oneshot(request(
            "GET",
            "/api/tables/00000000-0000-0000-0000-000000000000",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await, json!({"error": "Table not found"}));
}

#[tokio::test]
async fn update_table_applies_partial_changes() {
    let app = app();
    let id = create_users(&app).await;

    let (status, body) = call(
        &app,
        request(
            "PUT",
            &format!("/api/tables/{id}"),
            Some(json!({"description": "team", "is_public": true})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["table"]["name"], "users");
    assert_eq!(body["table"]["description"], "team");
    assert_eq!(body["table"]["is_public"], true);

    let (_, body) = call(
        &app,
        request(
            "PUT",
            &format!("/api/tables/{id}"),
            Some(json!({"description": null})),
        ),
    )
    .await;
    assert_eq!(body["table"]["description"], Value::Null);
    assert_eq!(body["table"]["is_public"], true);
}

#[tokio::test]
async fn insert_item_validates_against_schema() {
    let app = app();
    let id = create_users(&app).await;

    let (status, body) = call(
        &app,
        request(
            "POST",
            &format!("/api/tables/{id}/insert"),
            Some(json!({"path": "users", "item": {"id": "3", "name": "Cara"}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation failed");
    assert_eq!(
        body["errors"],
        json!([
            "Required field 'active' is missing",
            "Field 'id' has wrong type: expected number, got string"
        ])
    );

    let (status, body) = call(
        &app,
        request(
            "POST",
            &format!("/api/tables/{id}/insert"),
            Some(json!({"path": "users", "item": {"id": "3"}, "validate": false})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["insertedCount"], 1);
}

#[tokio::test]
async fn mutations_update_insert_delete_and_bulk() {
    let app = app();
    let id = create_users(&app).await;

    let (status, body) = call(
        &app,
        request(
            "POST",
            &format!("/api/tables/{id}/update"),
            Some(json!({"path": "users[id==1].name", "value": "Alicia"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["modifiedCount"], 1);

    let (status, body) = call(
        &app,
        request(
            "POST",
            &format!("/api/tables/{id}/delete"),
            Some(json!({"path": "users", "selector": {"id": 2}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deletedCount"], 1);

    let (status, body) = call(
        &app,
        request(
            "POST",
            &format!("/api/tables/{id}/bulk"),
            Some(json!({"operations": [
                {"op": "insert", "path": "users", "item": {"id": 3, "name": "Cara", "active": true}},
                {"op": "update", "path": "users[id==99].name", "value": "Nobody"},
            ]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["results"][0]["success"], true);
    assert_eq!(body["results"][0]["count"], 1);
    assert_eq!(body["results"][1]["success"], false);

    let (_, body) = call(&app, request("GET", &format!("/api/tables/{id}"), None)).await;
    let table = &body["table"];
    assert_eq!(table["row_count"], 2);
    assert_eq!(table["data"]["users"][0]["name"], "Alicia");
    assert_eq!(table["data"]["users"][1]["name"], "Cara");
}

#[tokio::test]
async fn bulk_rejects_unknown_operation() {
    let app = app();
    let id = create_users(&app).await;
    let (status, body) = call(
        &app,
        request(
            "POST",
            &format!("/api/tables/{id}/bulk"),
            Some(json!({"operations": [{"op": "upsert", "path": "users"}]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid operation type: upsert");
}

// --- query ---

#[tokio::test]
async fn query_selects_rows_with_limit() {
    let app = app();
    let id = create_users(&app).await;
    let (status, body) = call(
        &app,
        request(
            "POST",
            "/api/query",
            Some(json!({"table_id": id, "sql": "select * from users limit 1"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["row_count"], 1);
    assert_eq!(body["results"], json!([{"id": 1, "name": "Alice", "active": true}]));
    assert!(body["execution_time_ms"].is_u64());
}

#[tokio::test]
async fn query_rejects_unsupported_sql() {
    let app = app();
    let id = create_users(&app).await;
    let (status, body) = call(
        &app,
        request(
            "POST",
            "/api/query",
            Some(json!({"table_id": id, "sql": "DELETE FROM users"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Unsupported query"));
}

// --- convert ---

#[tokio::test]
async fn convert_json_to_toon_reports_token_comparison() {
    let content = json!({"users": [{"id": 1, "name": "Alice"}, {"id": 2, "name": "Bob"}]});
    let resp = app()
        .oneshot(request(
            "POST",
            "/api/convert",
            Some(json!({"content": content.to_string(), "from_format": "json", "to_format": "toon"})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(body["output"].as_str().unwrap().starts_with("users[2]{id,name}:"));
    let comparison = &body["token_comparison"];
    assert!(comparison["toon"].as_u64().unwrap() < comparison["json"].as_u64().unwrap());
    assert!(comparison["savingsPercentage"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn convert_requires_all_fields() {
    let resp = app()
        .oneshot(request("POST", "/api/convert", Some(json!({"content": "x"}))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(resp).await["error"],
        "content, from_format, and to_format are required"
    );
}

// --- api keys and user ---

#[tokio::test]
async fn issued_key_authenticates_until_revoked() {
    let app = app();
    let (status, body) = call(
        &app,
        request("POST", "/api/api-keys", Some(json!({"name": "ci", "expires_in_days": 30}))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let key = body["key"].as_str().unwrap().to_string();
    let key_id = body["api_key"]["id"].as_str().unwrap().to_string();
    assert!(key.starts_with("toon_"));
    assert_eq!(body["api_key"]["key_prefix"], &key[..12]);
    assert!(body["api_key"]["expires_at"].is_string());

    let with_issued_key = |uri: &str| {
        Request::builder()
            .uri(uri)
            .header(http::header::AUTHORIZATION, format!("Bearer {key}"))
            .body(String::new())
            .unwrap()
    };
    let (status, _) = call(&app, with_issued_key("/api/user")).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&app, request("GET", "/api/api-keys", None)).await;
    assert_eq!(body["api_keys"][0]["name"], "ci");
    assert!(body["api_keys"][0]["last_used_at"].is_string());
    assert!(body["api_keys"][0].get("key").is_none());

    let (status, body) = call(
        &app,
        request("DELETE", &format!("/api/api-keys/{key_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "API key deleted successfully");

    let (status, _) = call(&app, with_issued_key("/api/user")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_api_key_requires_name() {
    let resp = app()
        .oneshot(request("POST", "/api/api-keys", Some(json!({}))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "Name is required");
}

#[tokio::test]
async fn user_profile_carries_quotas() {
    let resp = app()
        .oneshot(request("GET", "/api/user", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let user = body_json(resp).await["user"].clone();
    assert_eq!(user["api_quota"], 10000);
    assert_eq!(user["storage_quota_gb"], 1);
}

#[tokio::test]
async fn delete_table_then_not_found() {
    let app = app();
    let id = create_users(&app).await;
    let (status, body) = call(&app, request("DELETE", &format!("/api/tables/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
    let (status, _) = call(&app, request("DELETE", &format!("/api/tables/{id}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
