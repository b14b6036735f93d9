//! Entry point of the SDK.
//!
//! # Design
//! `ToonDbClient` owns one `Transport` (immutable config plus executor) and
//! hands out borrowed, zero-cost resource clients. It holds no mutable
//! state, so a single instance can be shared across threads by reference.

use crate::account::Account;
use crate::api_keys::ApiKeys;
use crate::config::ClientConfig;
use crate::converter::Converter;
use crate::error::ToonDbError;
use crate::http::{HttpExecutor, UreqExecutor};
use crate::queries::Queries;
use crate::tables::Tables;
use crate::transport::Transport;

/// Synchronous client for the ToonDB API.
///
/// ```no_run
/// use toondb_core::{ClientConfig, CreateTable, ToonDbClient};
///
/// let db = ToonDbClient::new(ClientConfig::new("https://db.example.com", "toon_..."))?;
/// let table = db.tables().create(&CreateTable::new(
///     "users",
///     "users[2]{id,name}:\n  1,Alice\n  2,Bob",
/// ))?;
/// let rows = db.queries().execute(table.id, "SELECT * FROM users")?;
/// println!("{} rows", rows.row_count);
/// # Ok::<(), toondb_core::ToonDbError>(())
/// ```
pub struct ToonDbClient {
    transport: Transport,
}

impl ToonDbClient {
    /// Client backed by a blocking ureq agent using the configured timeout.
    pub fn new(config: ClientConfig) -> Result<Self, ToonDbError> {
        let executor = UreqExecutor::new(config.timeout());
        Self::with_executor(config, Box::new(executor))
    }

    /// Client configured from `TOONDB_*` environment variables.
    pub fn from_env() -> Result<Self, ToonDbError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn with_executor(
        config: ClientConfig,
        executor: Box<dyn HttpExecutor>,
    ) -> Result<Self, ToonDbError> {
        config.validate()?;
        Ok(Self {
            transport: Transport::new(config, executor),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        self.transport.config()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn tables(&self) -> Tables<'_> {
        Tables::new(&self.transport)
    }

    pub fn queries(&self) -> Queries<'_> {
        Queries::new(&self.transport)
    }

    pub fn converter(&self) -> Converter<'_> {
        Converter::new(&self.transport)
    }

    pub fn api_keys(&self) -> ApiKeys<'_> {
        ApiKeys::new(&self.transport)
    }

    pub fn account(&self) -> Account<'_> {
        Account::new(&self.transport)
    }
}
