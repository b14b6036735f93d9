//! Synchronous client SDK for the ToonDB HTTP API.
//!
//! # Overview
//! ToonDB stores tables authored in TOON, a token-oriented alternative to
//! JSON, and exposes them over HTTP for CRUD, path-based mutation, SQL
//! queries and TOON/JSON conversion. This crate composes request payloads,
//! sends them, maps failures to `ToonDbError`, and decodes responses into
//! typed records. Parsing, storage and query execution all live server-side.
//!
//! # Design
//! - `ToonDbClient` owns an immutable `ClientConfig` and an `HttpExecutor`;
//!   resource clients (`tables()`, `queries()`, `converter()`, `api_keys()`,
//!   `account()`) borrow it.
//! - `Transport` splits each call into a pure `build_request`, the executor
//!   round trip, and a pure `parse_response`, so everything except the
//!   socket is testable without a server.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod account;
pub mod api_keys;
pub mod client;
pub mod config;
pub mod converter;
pub mod error;
pub mod http;
pub mod queries;
pub mod tables;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::ToonDbClient;
pub use config::ClientConfig;
pub use converter::compare_tokens;
pub use error::{error_for_status, ToonDbError};
pub use http::{HttpExecutor, HttpMethod, HttpRequest, HttpResponse, UreqExecutor};
pub use transport::Transport;
pub use types::{
    ApiKey, BulkOperation, BulkOutcome, BulkStepOutcome, Conversion, ConvertOptions, CreateTable,
    CreatedApiKey, DeleteOutcome, Delimiter, Format, InsertOutcome, QueryResult, Table,
    TokenComparison, UpdateOutcome, UpdateTable, UserProfile,
};
