//! Relational data store access
//!
//! The query executor only sees the [`DataSource`] trait; [`connect`] picks
//! the implementation from the connection URL scheme.

mod credentials;
mod result;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{Error, Result};

pub use credentials::{WarehouseCredentials, redact_url};
pub use result::QueryResult;
pub use sqlite::SqliteDataSource;

/// Tabular query interface over a relational store
#[async_trait]
pub trait DataSource: Send + Sync {
    /// SQL dialect name shown to the query synthesizer
    fn dialect(&self) -> &str;

    /// Schema description: table definitions plus up to `sample_rows` rows each
    async fn table_info(&self, sample_rows: usize) -> Result<String>;

    /// Run a single read statement, returning at most `max_rows` rows
    ///
    /// # Errors
    /// `Connection` when the store is unreachable or closed, `Database` or
    /// `QueryGeneration` when the statement itself is at fault.
    async fn run_query(&self, sql: &str, max_rows: usize) -> Result<QueryResult>;

    /// Release the connection; later calls fail with `Connection`
    async fn close(&self) -> Result<()>;
}

/// Open a data source for a connection URL.
///
/// Supported: `sqlite::memory:`, `sqlite://<path>`, `sqlite:<path>`.
pub fn connect(url: &str) -> Result<Arc<dyn DataSource>> {
    info!("Connecting to warehouse: {}", redact_url(url));

    let (scheme, _) = url
        .split_once(':')
        .ok_or_else(|| Error::Connection(format!("invalid connection url: {}", redact_url(url))))?;

    match scheme {
        "sqlite" => {
            let target = url["sqlite:".len()..].trim_start_matches("//");
            if target == ":memory:" || target.is_empty() {
                Ok(Arc::new(SqliteDataSource::in_memory()?))
            } else {
                Ok(Arc::new(SqliteDataSource::open(target)?))
            }
        }
        other => Err(Error::Connection(format!(
            "unsupported warehouse scheme '{}'",
            other
        ))),
    }
}
