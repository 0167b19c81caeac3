//! The narrow capability the engine consumes from a database backend.
//!
//! Anything that can run parameterized SQL and report rows plus an affected
//! count can back the engine: a pooled network client, an embedded
//! database, or an in-memory fake for tests.

use crate::Value;
use crate::dialect::DialectFamily;
use crate::error::DbError;
use async_trait::async_trait;
use std::time::Duration;

/// Result of one statement execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// Result column names as reported by the backend.
    pub columns: Vec<String>,
    /// Result rows, cells in column order.
    pub rows: Vec<Vec<Value>>,
    /// Affected-row count for mutations; result cardinality for reads.
    pub row_count: u64,
}

impl QueryOutput {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Connection pool sizing and timeout configuration.
///
/// The pool is the timeout authority; the engine itself never times out.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_connections: usize,
    /// How long a checkout may wait for a free connection.
    pub connection_timeout: Duration,
    /// Idle connections older than this are dropped on check-in.
    pub idle_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// A database backend.
///
/// `execute` is the single data path: SQL text plus bound parameters in,
/// rows plus affected count out. Drivers translate their native errors into
/// the [`DbError`] taxonomy before returning.
#[async_trait]
pub trait Driver: Send + Sync {
    fn family(&self) -> DialectFamily;

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, DbError>;

    /// Open a transaction. All statements on the returned handle share one
    /// connection and commit or roll back atomically.
    async fn begin(&self) -> Result<Box<dyn DriverTransaction>, DbError>;

    /// Release held resources. Subsequent calls fail with a connection
    /// error.
    async fn close(&self) -> Result<(), DbError>;

    /// Cheap round-trip check, typically `SELECT 1`.
    async fn is_healthy(&self) -> bool;
}

/// An open transaction on a single connection.
#[async_trait]
pub trait DriverTransaction: Send + Sync {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, DbError>;

    async fn commit(self: Box<Self>) -> Result<(), DbError>;

    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}

/// Where a statement runs: directly on the driver's pool or inside an open
/// transaction.
#[derive(Clone, Copy)]
pub enum Exec<'a> {
    Driver(&'a dyn Driver),
    Transaction(&'a dyn DriverTransaction),
}

impl Exec<'_> {
    pub async fn run(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, DbError> {
        match self {
            Self::Driver(driver) => driver.execute(sql, params).await,
            Self::Transaction(tx) => tx.execute(sql, params).await,
        }
    }
}
