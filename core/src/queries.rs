//! SQL execution against a single table.

use serde::Serialize;
use uuid::Uuid;

use crate::error::ToonDbError;
use crate::http::HttpMethod;
use crate::transport::{decode, Transport};
use crate::types::QueryResult;

#[derive(Serialize)]
struct QueryRequest<'a> {
    table_id: Uuid,
    sql: &'a str,
}

#[derive(Clone, Copy)]
pub struct Queries<'a> {
    transport: &'a Transport,
}

impl<'a> Queries<'a> {
    pub(crate) fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    /// Run `sql` against the table. The statement is not inspected locally;
    /// syntax errors come back from the server as `ToonDbError::Validation`.
    pub fn execute(&self, table_id: Uuid, sql: &str) -> Result<QueryResult, ToonDbError> {
        let request = QueryRequest { table_id, sql };
        let body = self.transport.send(HttpMethod::Post, "/api/query", &request)?;
        decode(body)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::ClientConfig;
    use crate::testing::ScriptedExecutor;

    fn transport(executor: &ScriptedExecutor) -> Transport {
        Transport::new(
            ClientConfig::new("http://localhost:3000", "k"),
            Box::new(executor.clone()),
        )
    }

    #[test]
    fn execute_posts_table_id_and_sql() {
        let executor = ScriptedExecutor::new().respond(
            200,
            r#"{"results":[{"id":1,"name":"Alice"},{"id":2,"name":"Bob"}],"execution_time_ms":4,"row_count":2}"#,
        );
        let result = Queries::new(&transport(&executor))
            .execute(Uuid::nil(), "SELECT * FROM users")
            .unwrap();
        assert_eq!(result.row_count, 2);
        assert_eq!(result.execution_time_ms, 4);
        assert_eq!(result.results[1]["name"], "Bob");

        let req = executor.last_request();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://localhost:3000/api/query");
        assert_eq!(
            executor.last_body(),
            json!({"table_id": "00000000-0000-0000-0000-000000000000", "sql": "SELECT * FROM users"})
        );
    }

    #[test]
    fn row_count_is_not_checked_against_results() {
        let executor = ScriptedExecutor::new()
            .respond(200, r#"{"results":[],"execution_time_ms":0,"row_count":7}"#);
        let result = Queries::new(&transport(&executor))
            .execute(Uuid::nil(), "SELECT 1")
            .unwrap();
        assert!(result.results.is_empty());
        assert_eq!(result.row_count, 7);
    }

    #[test]
    fn missing_result_fields_are_malformed() {
        let executor = ScriptedExecutor::new().respond(200, r#"{"results":[]}"#);
        let err = Queries::new(&transport(&executor))
            .execute(Uuid::nil(), "SELECT 1")
            .unwrap_err();
        assert!(matches!(err, ToonDbError::MalformedResponse(_)));
    }

    #[test]
    fn sql_errors_surface_as_validation() {
        let executor = ScriptedExecutor::new().respond(400, r#"{"error":"Unexpected token FORM"}"#);
        let err = Queries::new(&transport(&executor))
            .execute(Uuid::nil(), "SELECT * FORM t")
            .unwrap_err();
        assert_eq!(err.to_string(), "Unexpected token FORM");
    }
}
