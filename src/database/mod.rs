pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::filter::{CompiledFilter, CompiledOrder, KeywordClause};

/// A row as the executors see it: column-keyed JSON values.
pub type Row = Map<String, Value>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("record not found")]
    NotFound,

    #[error("{0}")]
    Query(String),

    #[error("connection error: {0}")]
    Connection(String),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DbError::Connection(err.to_string())
            }
            other => DbError::Query(other.to_string()),
        }
    }
}

/// A fully compiled query: table, projection, predicates, ordering, window.
/// Everything is already whitelisted and rewritten to storage columns.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub table: String,
    /// Projection columns; empty selects everything.
    pub columns: Vec<String>,
    pub filters: Vec<CompiledFilter>,
    pub orders: Vec<CompiledOrder>,
    pub keyword: Option<KeywordClause>,
    pub limit: i64,
    pub offset: i64,
    /// Relation field names worth preloading; executors without relation
    /// support ignore these (the enrichment hook covers the gap).
    pub preloads: Vec<String>,
}

/// Storage executor boundary. Handlers speak this trait only; the engine
/// ships a PostgreSQL implementation and an in-memory one.
///
/// Identity tuples (`keys`) are `(column, value)` pairs in identity-key
/// declaration order, ANDed together.
#[async_trait]
pub trait Database: Send + Sync {
    /// `SELECT COUNT(*)` over the spec's predicates (window ignored).
    async fn count(&self, spec: &QuerySpec) -> Result<i64, DbError>;

    /// Windowed select honoring projection, predicates, ordering.
    async fn select(&self, spec: &QuerySpec) -> Result<Vec<Row>, DbError>;

    /// Single-row fetch by identity tuple.
    async fn fetch_one(
        &self,
        table: &str,
        keys: &[(String, Value)],
    ) -> Result<Option<Row>, DbError>;

    /// Insert a column-keyed row; returns the stored row including any
    /// storage-assigned defaults.
    async fn insert(&self, table: &str, row: Row) -> Result<Row, DbError>;

    /// Column-keyed partial update by identity tuple; returns affected rows.
    async fn update(
        &self,
        table: &str,
        keys: &[(String, Value)],
        changes: Row,
    ) -> Result<u64, DbError>;

    /// Delete by identity tuple; returns affected rows.
    async fn delete(&self, table: &str, keys: &[(String, Value)]) -> Result<u64, DbError>;
}
