//! Table CRUD and path-based document mutation.
//!
//! Paths such as `products[id==8].price` are interpreted by the server; the
//! client forwards them verbatim.

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ToonDbError;
use crate::http::HttpMethod;
use crate::transport::{decode, envelope, envelope_or_default, Transport};
use crate::types::{
    BulkOperation, BulkOutcome, CreateTable, DeleteOutcome, InsertOutcome, Table, UpdateOutcome,
    UpdateTable,
};

#[derive(Serialize)]
struct UpdateValueRequest<'a> {
    path: &'a str,
    value: Value,
}

#[derive(Serialize)]
struct InsertItemRequest<'a> {
    path: &'a str,
    item: &'a Map<String, Value>,
    validate: bool,
}

#[derive(Serialize)]
struct DeleteItemRequest<'a> {
    path: &'a str,
    selector: &'a Map<String, Value>,
}

#[derive(Serialize)]
struct BulkRequest<'a> {
    operations: &'a [BulkOperation],
}

/// Operations under `/api/tables`. Obtained from `ToonDbClient::tables`.
#[derive(Clone, Copy)]
pub struct Tables<'a> {
    transport: &'a Transport,
}

impl<'a> Tables<'a> {
    pub(crate) fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    pub fn list(&self) -> Result<Vec<Table>, ToonDbError> {
        let body = self.transport.get("/api/tables")?;
        envelope_or_default(body, "tables")
    }

    pub fn get(&self, id: Uuid) -> Result<Table, ToonDbError> {
        let body = self.transport.get(&format!("/api/tables/{id}"))?;
        envelope(body, "table")
    }

    pub fn create(&self, input: &CreateTable) -> Result<Table, ToonDbError> {
        let body = self.transport.send(HttpMethod::Post, "/api/tables", input)?;
        envelope(body, "table")
    }

    /// Partial update: only the fields set on `input` are sent.
    pub fn update(&self, id: Uuid, input: &UpdateTable) -> Result<Table, ToonDbError> {
        let body = self
            .transport
            .send(HttpMethod::Put, &format!("/api/tables/{id}"), input)?;
        envelope(body, "table")
    }

    /// Returns the server's `success` flag, `false` when it is absent.
    pub fn delete(&self, id: Uuid) -> Result<bool, ToonDbError> {
        let body = self.transport.delete(&format!("/api/tables/{id}"))?;
        Ok(body.get("success").and_then(Value::as_bool).unwrap_or(false))
    }

    pub fn update_value(
        &self,
        id: Uuid,
        path: &str,
        value: impl Into<Value>,
    ) -> Result<UpdateOutcome, ToonDbError> {
        let request = UpdateValueRequest {
            path,
            value: value.into(),
        };
        let body = self
            .transport
            .send(HttpMethod::Post, &format!("/api/tables/{id}/update"), &request)?;
        decode(body)
    }

    /// Insert `item` into the array at `path`, validated against the table
    /// schema.
    pub fn insert_item(
        &self,
        id: Uuid,
        path: &str,
        item: &Map<String, Value>,
    ) -> Result<InsertOutcome, ToonDbError> {
        self.insert_item_with(id, path, item, true)
    }

    pub fn insert_item_with(
        &self,
        id: Uuid,
        path: &str,
        item: &Map<String, Value>,
        validate: bool,
    ) -> Result<InsertOutcome, ToonDbError> {
        let request = InsertItemRequest {
            path,
            item,
            validate,
        };
        let body = self
            .transport
            .send(HttpMethod::Post, &format!("/api/tables/{id}/insert"), &request)?;
        decode(body)
    }

    /// Delete every element of the array at `path` matching all entries of
    /// `selector`.
    pub fn delete_item(
        &self,
        id: Uuid,
        path: &str,
        selector: &Map<String, Value>,
    ) -> Result<DeleteOutcome, ToonDbError> {
        let request = DeleteItemRequest { path, selector };
        let body = self
            .transport
            .send(HttpMethod::Post, &format!("/api/tables/{id}/delete"), &request)?;
        decode(body)
    }

    /// Apply `operations` in order as one server-side batch. The outcome
    /// carries one step result per operation.
    pub fn bulk_operation(
        &self,
        id: Uuid,
        operations: &[BulkOperation],
    ) -> Result<BulkOutcome, ToonDbError> {
        let request = BulkRequest { operations };
        let body = self
            .transport
            .send(HttpMethod::Post, &format!("/api/tables/{id}/bulk"), &request)?;
        decode(body)
    }
}
