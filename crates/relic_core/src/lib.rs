#![allow(clippy::result_large_err)]

//! Schema-driven relational data access.
//!
//! A code-defined schema (tables, columns with visibility/default/read-only
//! metadata, relations) drives parameterized SQL generation, execution
//! against PostgreSQL or SQLite through a narrow driver capability, batched
//! relation loading, and a uniform `Result<T, DbError>` contract.

mod client;
mod convert;
mod dialect;
mod driver;
mod engine;
mod error;
pub mod ids;
pub mod schema;
pub mod sql;
mod tenant;
mod value;

pub use client::{Database, DatabaseOptions, Internals, Transaction};
pub use convert::ValueConverter;
pub use dialect::{Dialect, DialectFamily, PostgresDialect, SqliteDialect, dialect_for};
pub use driver::{Driver, DriverTransaction, Exec, PoolOptions, QueryOutput};
pub use engine::{
    AffectedRows, AggregateOptions, Entity, EngineContext, GetOptions, GroupByOptions, Include,
    IncludeArgs, ListAndCount, ListOptions, MAX_INCLUDE_DEPTH, ModelHandle, RelationValue,
};
pub use error::{DbError, ErrorKind};
pub use ids::IdStrategy;
pub use schema::col;
pub use sql::{
    AggregateSpec, Casing, Cond, Filter, Fragment, Record, SortDirection, Statement,
};
pub use tenant::TenantGraph;
pub use value::Value;

pub use chrono;
pub use indexmap;
pub use serde_json;
pub use uuid;
