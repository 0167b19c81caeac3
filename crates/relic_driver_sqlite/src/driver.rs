use async_trait::async_trait;
use relic_core::{DbError, DialectFamily, Driver, DriverTransaction, QueryOutput, Value};
use rusqlite::Connection as RusqliteConnection;
use rusqlite::types::ValueRef;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Embedded SQLite backend.
///
/// One connection behind a mutex; statements run on the blocking pool so
/// async callers never block a runtime worker. Foreign-key enforcement is
/// switched on at open since SQLite ships with it off.
pub struct SqliteDriver {
    conn: Arc<Mutex<Option<RusqliteConnection>>>,
}

impl SqliteDriver {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        log::info!("opening SQLite database at {}", path.display());
        let conn = RusqliteConnection::open(path)
            .map_err(|e| DbError::connection(format!("failed to open {}: {}", path.display(), e)))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = RusqliteConnection::open_in_memory()
            .map_err(|e| DbError::connection(format!("failed to open in-memory database: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: RusqliteConnection) -> Result<Self, DbError> {
        conn.execute_batch("PRAGMA foreign_keys = ON")
            .map_err(|e| translate_error(&e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    async fn run(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, DbError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let params = params.to_vec();
        tokio::task::spawn_blocking(move || run_statement(&conn, &sql, &params))
            .await
            .map_err(|e| DbError::connection(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn family(&self) -> DialectFamily {
        DialectFamily::Sqlite
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, DbError> {
        self.run(sql, params).await
    }

    async fn begin(&self) -> Result<Box<dyn DriverTransaction>, DbError> {
        self.run("BEGIN IMMEDIATE", &[]).await?;
        Ok(Box::new(SqliteTransaction {
            conn: self.conn.clone(),
        }))
    }

    async fn close(&self) -> Result<(), DbError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            guard.take();
            Ok(())
        })
        .await
        .map_err(|e| DbError::connection(format!("blocking task failed: {}", e)))?
    }

    async fn is_healthy(&self) -> bool {
        self.run("SELECT 1", &[]).await.is_ok()
    }
}

/// A transaction on the driver's single connection. Driver-level statements
/// issued while it is open share the same transaction scope; that is the
/// nature of an embedded single-connection backend.
struct SqliteTransaction {
    conn: Arc<Mutex<Option<RusqliteConnection>>>,
}

impl SqliteTransaction {
    async fn run(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, DbError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let params = params.to_vec();
        tokio::task::spawn_blocking(move || run_statement(&conn, &sql, &params))
            .await
            .map_err(|e| DbError::connection(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl DriverTransaction for SqliteTransaction {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, DbError> {
        self.run(sql, params).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.run("COMMIT", &[]).await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.run("ROLLBACK", &[]).await?;
        Ok(())
    }
}

fn lock<'a>(
    conn: &'a Arc<Mutex<Option<RusqliteConnection>>>,
) -> Result<std::sync::MutexGuard<'a, Option<RusqliteConnection>>, DbError> {
    conn.lock()
        .map_err(|e| DbError::connection(format!("connection lock poisoned: {}", e)))
}

fn run_statement(
    conn: &Arc<Mutex<Option<RusqliteConnection>>>,
    sql: &str,
    params: &[Value],
) -> Result<QueryOutput, DbError> {
    let guard = lock(conn)?;
    let conn = guard
        .as_ref()
        .ok_or_else(|| DbError::connection("driver is closed"))?;

    let mut stmt = conn.prepare(sql).map_err(|e| translate_error(&e))?;
    let bound = rusqlite::params_from_iter(params.iter().map(bind_value));

    if stmt.column_count() == 0 {
        let affected = stmt.execute(bound).map_err(|e| translate_error(&e))?;
        return Ok(QueryOutput {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: affected as u64,
        });
    }

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let column_count = columns.len();

    let mut rows = Vec::new();
    let mut result = stmt.query(bound).map_err(|e| translate_error(&e))?;
    while let Some(row) = result.next().map_err(|e| translate_error(&e))? {
        let cells: Vec<Value> = (0..column_count).map(|i| read_value(row, i)).collect();
        rows.push(cells);
    }

    let row_count = rows.len() as u64;
    Ok(QueryOutput {
        columns,
        rows,
        row_count,
    })
}

fn bind_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Int(i) => Sql::Integer(*i),
        Value::Float(f) => Sql::Real(*f),
        Value::Text(s) => Sql::Text(s.clone()),
        Value::Bytes(b) => Sql::Blob(b.clone()),
        Value::Uuid(u) => Sql::Text(u.to_string()),
        Value::Json(j) => Sql::Text(j.to_string()),
        Value::Decimal(s) => Sql::Text(s.clone()),
        Value::DateTime(dt) => Sql::Text(dt.to_rfc3339()),
        Value::Date(d) => Sql::Text(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => Sql::Text(t.format("%H:%M:%S%.f").to_string()),
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
            Sql::Text(serde_json::Value::Array(encoded).to_string())
        }
    }
}

fn read_value(row: &rusqlite::Row, idx: usize) -> Value {
    match row.get_ref(idx) {
        Ok(ValueRef::Null) => Value::Null,
        Ok(ValueRef::Integer(i)) => Value::Int(i),
        Ok(ValueRef::Real(f)) => Value::Float(f),
        Ok(ValueRef::Text(t)) => Value::Text(String::from_utf8_lossy(t).to_string()),
        Ok(ValueRef::Blob(b)) => Value::Bytes(b.to_vec()),
        Err(_) => Value::Null,
    }
}

/// Map SQLite extended result codes onto the engine's error taxonomy. The
/// constraint message names the offending `table.column`, which is the only
/// structured detail SQLite offers.
fn translate_error(error: &rusqlite::Error) -> DbError {
    match error {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let text = message
                .clone()
                .unwrap_or_else(|| failure.to_string());
            let code = failure.extended_code;
            let translated = match code {
                // SQLITE_CONSTRAINT_UNIQUE / SQLITE_CONSTRAINT_PRIMARYKEY
                2067 | 1555 => {
                    let mut err = DbError::new(relic_core::ErrorKind::UniqueViolation, text.clone());
                    if let Some((table, column)) = parse_constraint_target(&text) {
                        err = err.with_table(table).with_column(column);
                    }
                    err
                }
                // SQLITE_CONSTRAINT_FOREIGNKEY
                787 => DbError::new(relic_core::ErrorKind::ForeignKeyViolation, text.clone()),
                // SQLITE_CONSTRAINT_CHECK
                275 => DbError::check_violation(text.clone()),
                // SQLITE_CONSTRAINT_NOTNULL
                1299 => {
                    let mut err = DbError::not_null_violation(text.clone());
                    if let Some((table, column)) = parse_constraint_target(&text) {
                        err = err.with_table(table).with_column(column);
                    }
                    err
                }
                _ => DbError::unknown(text.clone()),
            };
            translated.with_code(code.to_string())
        }
        other => DbError::unknown(other.to_string()),
    }
}

/// SQLite constraint messages end in `: table.column`.
fn parse_constraint_target(message: &str) -> Option<(String, String)> {
    let (_, target) = message.rsplit_once(": ")?;
    let (table, column) = target.split_once('.')?;
    Some((table.trim().to_string(), column.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_constraint_target() {
        assert_eq!(
            parse_constraint_target("UNIQUE constraint failed: users.email"),
            Some(("users".to_string(), "email".to_string()))
        );
        assert_eq!(parse_constraint_target("no target here"), None);
    }

    #[tokio::test]
    async fn test_execute_round_trip() {
        let driver = SqliteDriver::open_in_memory().unwrap();
        driver
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();

        let inserted = driver
            .execute(
                "INSERT INTO t (id, name) VALUES (?, ?)",
                &[Value::Int(1), Value::Text("a".into())],
            )
            .await
            .unwrap();
        assert_eq!(inserted.row_count, 1);

        let selected = driver.execute("SELECT id, name FROM t", &[]).await.unwrap();
        assert_eq!(selected.columns, vec!["id", "name"]);
        assert_eq!(
            selected.rows,
            vec![vec![Value::Int(1), Value::Text("a".into())]]
        );
    }

    #[tokio::test]
    async fn test_unique_violation_translates() {
        let driver = SqliteDriver::open_in_memory().unwrap();
        driver
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, email TEXT UNIQUE)", &[])
            .await
            .unwrap();
        for _ in 0..2 {
            let result = driver
                .execute(
                    "INSERT INTO t (email) VALUES (?)",
                    &[Value::Text("a@b".into())],
                )
                .await;
            if let Err(err) = result {
                assert_eq!(err.kind, relic_core::ErrorKind::UniqueViolation);
                assert_eq!(err.table.as_deref(), Some("t"));
                assert_eq!(err.column.as_deref(), Some("email"));
                return;
            }
        }
        panic!("second insert should have failed");
    }

    #[tokio::test]
    async fn test_closed_driver_errors() {
        let driver = SqliteDriver::open_in_memory().unwrap();
        driver.close().await.unwrap();
        let err = driver.execute("SELECT 1", &[]).await.unwrap_err();
        assert_eq!(err.kind, relic_core::ErrorKind::Connection);
        assert!(!driver.is_healthy().await);
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let driver = SqliteDriver::open_in_memory().unwrap();
        driver
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();

        let tx = driver.begin().await.unwrap();
        tx.execute("INSERT INTO t (id) VALUES (?)", &[Value::Int(1)])
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let rows = driver.execute("SELECT id FROM t", &[]).await.unwrap();
        assert!(rows.rows.is_empty());
    }
}
