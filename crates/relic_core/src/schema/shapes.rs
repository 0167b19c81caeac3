//! Derived column shapes.
//!
//! Pure functions from table metadata to the attribute lists the engine
//! projects and validates against: which columns a default read returns,
//! which an insert requires, which an update may touch.

use super::column::Visibility;
use super::table::Table;
use crate::error::DbError;

/// Visibility tier a caller can opt out of wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityTier {
    /// Excludes `sensitive` and `hidden` columns.
    Sensitive,
    /// Excludes `hidden` columns only.
    Hidden,
}

/// Column selection for read operations.
///
/// Explicit selection and tier opt-out are mutually exclusive by
/// construction; omitting the spec altogether yields the default read shape
/// (all non-hidden columns).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectSpec {
    /// Exactly these columns, in the given order. Hidden columns may be
    /// requested explicitly here.
    Columns(Vec<String>),
    /// All columns except the given tier.
    Not(VisibilityTier),
}

/// Required/optional split of writable columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertShape {
    pub required: Vec<String>,
    pub optional: Vec<String>,
}

impl Table {
    /// Default read shape: every column except `hidden` ones.
    pub fn read_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, c)| c.visibility != Visibility::Hidden)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Every column, in declaration order.
    pub fn all_columns(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    /// Every column except `sensitive` and `hidden`.
    pub fn not_sensitive_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, c)| c.visibility == Visibility::Normal)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Every column except `hidden`; same set as the default read shape.
    pub fn not_hidden_columns(&self) -> Vec<&str> {
        self.read_columns()
    }

    /// Insert shape over all columns: only defaulted columns (database
    /// default, serial, generated primary key, or literal default) are
    /// optional; everything else is required, including nullable columns,
    /// which take an explicit null. Visibility does not affect
    /// writability.
    pub fn insert_shape(&self) -> InsertShape {
        let mut required = Vec::new();
        let mut optional = Vec::new();
        for (name, column) in &self.columns {
            if column.has_default() {
                optional.push(name.clone());
            } else {
                required.push(name.clone());
            }
        }
        InsertShape { required, optional }
    }

    /// Columns an update may touch: everything except primary-key and
    /// read-only columns. All optional.
    pub fn update_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, c)| !c.primary && !c.read_only)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Caller-facing create input: all columns except primary-key and
    /// read-only ones, with the same defaulted-means-optional split as the
    /// insert shape.
    pub fn create_input_shape(&self) -> InsertShape {
        let mut required = Vec::new();
        let mut optional = Vec::new();
        for (name, column) in &self.columns {
            if column.primary || column.read_only {
                continue;
            }
            if column.has_default() {
                optional.push(name.clone());
            } else {
                required.push(name.clone());
            }
        }
        InsertShape { required, optional }
    }

    /// Resolve a select spec to the concrete projection, validating that
    /// explicitly named columns exist.
    pub fn resolve_projection(&self, select: Option<&SelectSpec>) -> Result<Vec<String>, DbError> {
        match select {
            None => Ok(self.read_columns().iter().map(|s| s.to_string()).collect()),
            Some(SelectSpec::Not(VisibilityTier::Sensitive)) => Ok(self
                .not_sensitive_columns()
                .iter()
                .map(|s| s.to_string())
                .collect()),
            Some(SelectSpec::Not(VisibilityTier::Hidden)) => Ok(self
                .not_hidden_columns()
                .iter()
                .map(|s| s.to_string())
                .collect()),
            Some(SelectSpec::Columns(columns)) => {
                if columns.is_empty() {
                    return Err(DbError::validation(format!(
                        "empty column selection on {}",
                        self.name
                    )));
                }
                for name in columns {
                    if self.get_column(name).is_none() {
                        return Err(DbError::validation(format!(
                            "unknown column {} on {}",
                            name, self.name
                        ))
                        .with_table(self.name.clone())
                        .with_column(name.clone()));
                    }
                }
                Ok(columns.clone())
            }
        }
    }
}
