//! Per-column value conversion between the engine's value model and what a
//! dialect can physically store.
//!
//! SQLite has no boolean, uuid, timestamp, json, or array storage classes;
//! this layer folds those into INTEGER/TEXT on the way in and restores them
//! on the way out using the table's column metadata. Under Postgres the
//! converter is the identity. Raw SQL results bypass it entirely — without
//! column metadata there is nothing to restore.

use crate::Value;
use crate::dialect::DialectFamily;
use crate::schema::{ColumnDef, SqlType};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
pub struct ValueConverter {
    family: DialectFamily,
}

impl ValueConverter {
    pub fn new(family: DialectFamily) -> Self {
        Self { family }
    }

    /// Encode outgoing parameters. Value-driven: the parameter's own type
    /// decides, no column mapping needed.
    pub fn encode_params(&self, params: Vec<Value>) -> Vec<Value> {
        match self.family {
            DialectFamily::Postgres => params,
            DialectFamily::Sqlite => params.into_iter().map(|v| self.encode(v)).collect(),
        }
    }

    pub fn encode(&self, value: Value) -> Value {
        if self.family == DialectFamily::Postgres {
            return value;
        }
        match value {
            Value::Bool(b) => Value::Int(i64::from(b)),
            Value::DateTime(dt) => Value::Text(dt.to_rfc3339()),
            Value::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => Value::Text(t.format("%H:%M:%S%.f").to_string()),
            Value::Uuid(u) => Value::Text(u.to_string()),
            Value::Json(j) => Value::Text(j.to_string()),
            Value::Array(items) => {
                let encoded: Vec<serde_json::Value> = items
                    .iter()
                    .map(|v| match v {
                        Value::Text(s) => serde_json::Value::String(s.clone()),
                        Value::Int(i) => serde_json::Value::from(*i),
                        Value::Float(f) => serde_json::Value::from(*f),
                        Value::Bool(b) => serde_json::Value::from(*b),
                        other => serde_json::Value::String(other.as_display_string()),
                    })
                    .collect();
                Value::Text(serde_json::Value::Array(encoded).to_string())
            }
            other => other,
        }
    }

    /// Decode one result cell using its column's metadata.
    pub fn decode(&self, column: &ColumnDef, value: Value) -> Value {
        if self.family == DialectFamily::Postgres {
            return value;
        }
        match (&column.sql_type, value) {
            (SqlType::Boolean, Value::Int(i)) => Value::Bool(i != 0),
            (SqlType::TimestampTz, Value::Text(s)) => parse_datetime(&s)
                .map(Value::DateTime)
                .unwrap_or(Value::Text(s)),
            (SqlType::Date, Value::Text(s)) => chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(Value::Date)
                .unwrap_or(Value::Text(s)),
            (SqlType::Time, Value::Text(s)) => chrono::NaiveTime::parse_from_str(&s, "%H:%M:%S%.f")
                .or_else(|_| chrono::NaiveTime::parse_from_str(&s, "%H:%M:%S"))
                .map(Value::Time)
                .unwrap_or(Value::Text(s)),
            (SqlType::Uuid, Value::Text(s)) => uuid::Uuid::parse_str(&s)
                .map(Value::Uuid)
                .unwrap_or(Value::Text(s)),
            (SqlType::Jsonb, Value::Text(s)) => serde_json::from_str(&s)
                .map(Value::Json)
                .unwrap_or(Value::Text(s)),
            (SqlType::TextArray | SqlType::IntegerArray, Value::Text(s)) => {
                decode_array(&s).unwrap_or(Value::Text(s))
            }
            (SqlType::Decimal { .. }, Value::Text(s)) => Value::Decimal(s),
            (SqlType::Decimal { .. }, Value::Float(f)) => Value::Decimal(f.to_string()),
            (_, value) => value,
        }
    }
}

/// SQLite timestamps are written as RFC 3339; values produced by SQLite's
/// own datetime functions arrive as naive `YYYY-MM-DD HH:MM:SS[.SSS]` UTC.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn decode_array(s: &str) -> Option<Value> {
    let json: serde_json::Value = serde_json::from_str(s).ok()?;
    let items = json.as_array()?;
    let decoded = items
        .iter()
        .map(|item| match item {
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Number(n) if n.is_i64() => Value::Int(n.as_i64().unwrap_or(0)),
            serde_json::Value::Number(n) => Value::Float(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Null => Value::Null,
            other => Value::Text(other.to_string()),
        })
        .collect();
    Some(Value::Array(decoded))
}
