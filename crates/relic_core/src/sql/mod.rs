mod builder;
mod ddl;
mod filter;
mod fragment;

pub use builder::{AggregateSpec, Cell, InsertPlan, InsertRow, QueryBuilder, UpdatePlan};
pub use ddl::{create_indexes, create_table};
pub use filter::{Cond, Filter, FilterCompiler};
pub use fragment::Fragment;

use crate::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A row keyed by logical column name, in projection order.
pub type Record = IndexMap<String, Value>;

/// A rendered SQL statement: text with dialect placeholders plus the bound
/// parameters, in placeholder order. User data only ever appears in
/// `params`.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<Value>,
}

/// Sort direction for ORDER BY clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Identifier casing applied when logical column names become stored
/// column names.
///
/// The same value is threaded to filters, projections, and DDL so both
/// sides of the name mapping always agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Casing {
    #[default]
    SnakeCase,
    Preserve,
}

impl Casing {
    /// Stored name for a logical column name.
    pub fn column(&self, name: &str) -> String {
        match self {
            Self::SnakeCase => to_snake_case(name),
            Self::Preserve => name.to_string(),
        }
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            prev_lower = false;
        } else {
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case_mapping() {
        let casing = Casing::SnakeCase;
        assert_eq!(casing.column("createdAt"), "created_at");
        assert_eq!(casing.column("created_at"), "created_at");
        assert_eq!(casing.column("views"), "views");
        assert_eq!(casing.column("orgID2"), "org_id2");
    }

    #[test]
    fn test_preserve_is_identity() {
        assert_eq!(Casing::Preserve.column("createdAt"), "createdAt");
    }
}
