//! Schema-to-DDL rendering.
//!
//! Renders `CREATE TABLE` and `CREATE INDEX` statements from a [`Table`] so
//! embedded and test databases can be materialized straight from the schema
//! definition. This is not migration tooling; there is no diffing and no
//! statement history.

use super::Casing;
use crate::Value;
use crate::dialect::Dialect;
use crate::schema::{DefaultValue, SqlType, Table};

/// Render the CREATE TABLE statement for a table.
pub fn create_table(dialect: &dyn Dialect, table: &Table, casing: Casing) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(table.columns.len() + 1);

    for (name, column) in &table.columns {
        let stored = casing.column(name);
        let mut line = format!(
            "    {} {}",
            dialect.quote_ident(&stored),
            dialect.map_column_type(column)
        );

        if column.primary && table.primary_key().len() == 1 {
            line.push_str(" PRIMARY KEY");
        }
        if !column.nullable && !column.primary {
            line.push_str(" NOT NULL");
        }
        if column.unique && !column.primary {
            line.push_str(" UNIQUE");
        }
        match &column.default_value {
            Some(DefaultValue::Now) => {
                // Parenthesized so expression defaults parse on SQLite.
                line.push_str(&format!(" DEFAULT ({})", dialect.now()));
            }
            Some(DefaultValue::Literal(value)) => {
                line.push_str(" DEFAULT ");
                // Schema-author literal, not caller data.
                line.push_str(&default_literal(value));
            }
            None => {}
        }
        if let SqlType::Enum { values, .. } = &column.sql_type {
            let quoted: Vec<String> = values.iter().map(|v| quote_string(v)).collect();
            line.push_str(&format!(
                " CHECK ({} IN ({}))",
                dialect.quote_ident(&stored),
                quoted.join(", ")
            ));
        }
        if let Some(check) = &column.check {
            line.push_str(&format!(" CHECK ({})", check));
        }
        if let Some(fk) = &column.references {
            line.push_str(&format!(
                " REFERENCES {} ({})",
                dialect.quote_ident(&fk.table),
                dialect.quote_ident(&casing.column(&fk.column))
            ));
        }

        lines.push(line);
    }

    let primary = table.primary_key();
    if primary.len() > 1 {
        let quoted: Vec<String> = primary
            .iter()
            .map(|c| dialect.quote_ident(&casing.column(c)))
            .collect();
        lines.push(format!("    PRIMARY KEY ({})", quoted.join(", ")));
    }

    format!(
        "CREATE TABLE {} (\n{}\n)",
        dialect.quote_ident(&table.name),
        lines.join(",\n")
    )
}

/// Render CREATE INDEX statements for the table's secondary indexes.
pub fn create_indexes(dialect: &dyn Dialect, table: &Table, casing: Casing) -> Vec<String> {
    table
        .indexes
        .iter()
        .map(|index| {
            let stored: Vec<String> = index.columns.iter().map(|c| casing.column(c)).collect();
            let quoted: Vec<String> = stored.iter().map(|c| dialect.quote_ident(c)).collect();
            let index_name = format!("idx_{}_{}", table.name, stored.join("_"));
            format!(
                "CREATE {}INDEX {} ON {} ({})",
                if index.unique { "UNIQUE " } else { "" },
                dialect.quote_ident(&index_name),
                dialect.quote_ident(&table.name),
                quoted.join(", ")
            )
        })
        .collect()
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn default_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Decimal(s) => s.clone(),
        Value::Text(s) => quote_string(s),
        Value::Uuid(u) => quote_string(&u.to_string()),
        Value::DateTime(dt) => quote_string(&dt.to_rfc3339()),
        Value::Date(d) => quote_string(&d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => quote_string(&t.format("%H:%M:%S").to_string()),
        Value::Json(j) => quote_string(&j.to_string()),
        Value::Bytes(_) | Value::Array(_) => "NULL".to_string(),
    }
}
