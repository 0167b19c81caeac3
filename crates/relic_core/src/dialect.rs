use crate::schema::{ColumnDef, SqlType};
use serde::{Deserialize, Serialize};

/// Backend family a statement is destined for.
///
/// Travels with statements so the value converter and drivers can branch
/// without downcasting the dialect trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialectFamily {
    Postgres,
    Sqlite,
}

/// Database-specific SQL syntax and feature surface.
///
/// A dialect is stateless: `param` derives the placeholder purely from the
/// 1-based position, `map_column_type` is a pure logical-to-physical type
/// mapping, and the feature flags tell the builders which operators may be
/// emitted at all.
pub trait Dialect: Send + Sync {
    fn family(&self) -> DialectFamily;

    /// Placeholder token for the parameter at `index` (1-based).
    fn param(&self, index: usize) -> String;

    /// SQL expression for the current timestamp.
    fn now(&self) -> &'static str;

    /// Logical column type to physical DDL type.
    fn map_column_type(&self, column: &ColumnDef) -> String;

    /// Whether `RETURNING *` may be appended to mutations.
    fn supports_returning(&self) -> bool;

    /// Whether array operators (`@>`, `<@`, `&&`) may be emitted.
    fn supports_array_ops(&self) -> bool;

    /// Whether JSONB containment/path operators may be emitted.
    fn supports_jsonb_path(&self) -> bool;

    /// Quote an identifier, doubling embedded quotes.
    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Pseudo-table holding the would-be-inserted row inside an upsert's
    /// update clause.
    fn excluded_table(&self) -> &'static str {
        "excluded"
    }

    /// Render the conflict clause of an upsert. `conflict_targets` are
    /// unquoted stored column names; `update_set` is a pre-rendered
    /// assignment list.
    fn upsert_conflict(&self, conflict_targets: &[String], update_set: &str) -> String {
        let targets: Vec<String> = conflict_targets.iter().map(|c| self.quote_ident(c)).collect();
        format!("ON CONFLICT ({}) DO UPDATE SET {}", targets.join(", "), update_set)
    }

    /// Case-insensitive pattern match over a quoted column.
    fn insensitive_like(&self, quoted_column: &str, placeholder: &str) -> String;

    /// Literal standing in for "no limit" when only OFFSET is requested.
    /// `None` means the LIMIT clause can simply be omitted.
    fn no_limit(&self) -> Option<&'static str> {
        None
    }
}

/// PostgreSQL: `$N` placeholders, native uuid/jsonb/array types, the full
/// operator surface.
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn family(&self) -> DialectFamily {
        DialectFamily::Postgres
    }

    fn param(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn now(&self) -> &'static str {
        "NOW()"
    }

    fn map_column_type(&self, column: &ColumnDef) -> String {
        match &column.sql_type {
            SqlType::Uuid => "UUID".to_string(),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Varchar(length) => format!("VARCHAR({})", length),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Decimal { precision, scale } => format!("NUMERIC({}, {})", precision, scale),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Serial => "SERIAL".to_string(),
            SqlType::TimestampTz => "TIMESTAMPTZ".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Jsonb => "JSONB".to_string(),
            SqlType::TextArray => "TEXT[]".to_string(),
            // Enums map to checked text; managing CREATE TYPE lifecycles is
            // migration territory.
            SqlType::IntegerArray => "INTEGER[]".to_string(),
            SqlType::Enum { .. } => "TEXT".to_string(),
        }
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn supports_array_ops(&self) -> bool {
        true
    }

    fn supports_jsonb_path(&self) -> bool {
        true
    }

    fn insensitive_like(&self, quoted_column: &str, placeholder: &str) -> String {
        format!("{} ILIKE {} ESCAPE '\\'", quoted_column, placeholder)
    }
}

/// SQLite: positional `?` placeholders, RETURNING on modern versions, no
/// array or JSONB operators. Uuids, booleans, and timestamps are stored as
/// TEXT/INTEGER/TEXT; the value converter bridges the difference.
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn family(&self) -> DialectFamily {
        DialectFamily::Sqlite
    }

    fn param(&self, _index: usize) -> String {
        "?".to_string()
    }

    // CURRENT_TIMESTAMP only has second resolution; auto-update columns
    // need better to be observably monotonic.
    fn now(&self) -> &'static str {
        "STRFTIME('%Y-%m-%dT%H:%M:%f+00:00', 'NOW')"
    }

    fn map_column_type(&self, column: &ColumnDef) -> String {
        match &column.sql_type {
            SqlType::Uuid => "TEXT".to_string(),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Varchar(_) => "TEXT".to_string(),
            SqlType::Boolean => "INTEGER".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "INTEGER".to_string(),
            SqlType::Decimal { .. } => "TEXT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "REAL".to_string(),
            SqlType::Serial => "INTEGER".to_string(),
            SqlType::TimestampTz => "TEXT".to_string(),
            SqlType::Date => "TEXT".to_string(),
            SqlType::Time => "TEXT".to_string(),
            SqlType::Jsonb => "TEXT".to_string(),
            // Arrays are stored JSON-encoded; array operators stay guarded
            // off by the feature flag.
            SqlType::TextArray => "TEXT".to_string(),
            SqlType::IntegerArray => "TEXT".to_string(),
            SqlType::Enum { .. } => "TEXT".to_string(),
        }
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn supports_array_ops(&self) -> bool {
        false
    }

    fn supports_jsonb_path(&self) -> bool {
        false
    }

    fn insensitive_like(&self, quoted_column: &str, placeholder: &str) -> String {
        format!(
            "{} COLLATE NOCASE LIKE {} ESCAPE '\\'",
            quoted_column, placeholder
        )
    }

    // SQLite refuses OFFSET without LIMIT.
    fn no_limit(&self) -> Option<&'static str> {
        Some("-1")
    }
}

/// The built-in dialect for a backend family.
pub fn dialect_for(family: DialectFamily) -> Box<dyn Dialect> {
    match family {
        DialectFamily::Postgres => Box::new(PostgresDialect),
        DialectFamily::Sqlite => Box::new(SqliteDialect),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::col;

    #[test]
    fn test_placeholders() {
        assert_eq!(PostgresDialect.param(1), "$1");
        assert_eq!(PostgresDialect.param(12), "$12");
        assert_eq!(SqliteDialect.param(1), "?");
        assert_eq!(SqliteDialect.param(12), "?");
    }

    #[test]
    fn test_quote_doubling() {
        assert_eq!(PostgresDialect.quote_ident("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn test_type_mapping_diverges() {
        let flag = col::boolean();
        assert_eq!(PostgresDialect.map_column_type(&flag), "BOOLEAN");
        assert_eq!(SqliteDialect.map_column_type(&flag), "INTEGER");

        let stamp = col::timestamptz();
        assert_eq!(PostgresDialect.map_column_type(&stamp), "TIMESTAMPTZ");
        assert_eq!(SqliteDialect.map_column_type(&stamp), "TEXT");
    }

    #[test]
    fn test_upsert_conflict_clause() {
        let clause =
            PostgresDialect.upsert_conflict(&["name".to_string()], "\"enabled\" = excluded.\"enabled\"");
        assert_eq!(
            clause,
            "ON CONFLICT (\"name\") DO UPDATE SET \"enabled\" = excluded.\"enabled\""
        );
    }
}
