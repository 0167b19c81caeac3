//! Engine-side primary key generation.

use crate::error::DbError;
use crate::schema::ColumnDef;
use serde::{Deserialize, Serialize};

/// ID generation strategy for primary-key columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdStrategy {
    /// cuid2: 24 lowercase alphanumerics, collision-resistant.
    Cuid,
    /// UUID version 7, time-ordered.
    Uuid,
    /// nanoid: 21 characters from the URL-safe alphabet.
    Nanoid,
}

impl IdStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cuid => "cuid",
            Self::Uuid => "uuid",
            Self::Nanoid => "nanoid",
        }
    }
}

/// Generate one ID. Each call produces a fresh value; a multi-row insert
/// calls this once per row.
pub fn generate(strategy: IdStrategy) -> String {
    match strategy {
        IdStrategy::Cuid => cuid::cuid2(),
        IdStrategy::Uuid => uuid::Uuid::now_v7().to_string(),
        IdStrategy::Nanoid => nanoid::nanoid!(),
    }
}

/// Generated IDs are strings; reject strategies configured on columns that
/// cannot store one. Checked at first use, not at schema construction.
pub fn check_generated_column(column_name: &str, column: &ColumnDef) -> Result<(), DbError> {
    if !column.sql_type.is_string_like() {
        return Err(DbError::unsupported(format!(
            "column {} has an ID strategy but is not a string-like type",
            column_name
        ))
        .with_column(column_name.to_string()));
    }
    Ok(())
}
