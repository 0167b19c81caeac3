use crate::numeric;
use crate::params::PgParam;
use async_trait::async_trait;
use futures::TryStreamExt;
use futures::pin_mut;
use relic_core::{
    DbError, DialectFamily, Driver, DriverTransaction, ErrorKind, PoolOptions, QueryOutput, Value,
};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, NoTls, Row};

/// Pooled PostgreSQL backend over `tokio-postgres`.
///
/// The pool is a semaphore bounding live connections plus a stack of idle
/// clients; checkout honors `connection_timeout` and idle clients past
/// `idle_timeout` are dropped instead of reused. Each client's connection
/// task runs on the runtime and dies with the client.
pub struct PostgresDriver {
    pool: Arc<PoolState>,
}

struct PoolState {
    url: String,
    options: PoolOptions,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<IdleClient>>,
    closed: AtomicBool,
}

struct IdleClient {
    client: Client,
    since: Instant,
}

impl PostgresDriver {
    /// Create the pool. Connections are opened lazily on first checkout; a
    /// health check (`is_healthy`) verifies reachability.
    pub fn connect(url: impl Into<String>, options: PoolOptions) -> Self {
        let url = url.into();
        log::info!(
            "postgres pool: max {} connections",
            options.max_connections
        );
        Self {
            pool: Arc::new(PoolState {
                url,
                semaphore: Arc::new(Semaphore::new(options.max_connections)),
                options,
                idle: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

struct PooledClient {
    client: Option<Client>,
    pool: Arc<PoolState>,
    _permit: OwnedSemaphorePermit,
}

impl PooledClient {
    fn client(&self) -> &Client {
        self.client.as_ref().expect("client present until drop")
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        if self.pool.closed.load(Ordering::SeqCst) || client.is_closed() {
            return;
        }
        if let Ok(mut idle) = self.pool.idle.lock() {
            idle.push(IdleClient {
                client,
                since: Instant::now(),
            });
        }
    }
}

impl PoolState {
    async fn checkout(self: &Arc<Self>) -> Result<PooledClient, DbError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbError::connection("driver is closed"));
        }

        let permit = tokio::time::timeout(
            self.options.connection_timeout,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        .map_err(|_| DbError::connection("timed out waiting for a pool connection"))?
        .map_err(|_| DbError::connection("pool is shut down"))?;

        let reusable = {
            let mut idle = self
                .idle
                .lock()
                .map_err(|e| DbError::connection(format!("pool lock poisoned: {}", e)))?;
            let mut reusable = None;
            while let Some(candidate) = idle.pop() {
                if candidate.client.is_closed() {
                    continue;
                }
                if candidate.since.elapsed() > self.options.idle_timeout {
                    continue;
                }
                reusable = Some(candidate.client);
                break;
            }
            reusable
        };

        let client = match reusable {
            Some(client) => client,
            None => connect_client(&self.url).await?,
        };

        Ok(PooledClient {
            client: Some(client),
            pool: self.clone(),
            _permit: permit,
        })
    }
}

async fn connect_client(url: &str) -> Result<Client, DbError> {
    let (client, connection) = tokio_postgres::connect(url, NoTls)
        .await
        .map_err(|e| DbError::connection(format!("failed to connect: {}", e)))?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::debug!("connection task ended: {}", e);
        }
    });
    Ok(client)
}

#[async_trait]
impl Driver for PostgresDriver {
    fn family(&self) -> DialectFamily {
        DialectFamily::Postgres
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, DbError> {
        let pooled = self.pool.checkout().await?;
        run_statement(pooled.client(), sql, params).await
    }

    async fn begin(&self) -> Result<Box<dyn DriverTransaction>, DbError> {
        let pooled = self.pool.checkout().await?;
        run_statement(pooled.client(), "BEGIN", &[]).await?;
        Ok(Box::new(PostgresTransaction { client: pooled }))
    }

    async fn close(&self) -> Result<(), DbError> {
        self.pool.closed.store(true, Ordering::SeqCst);
        self.pool.semaphore.close();
        if let Ok(mut idle) = self.pool.idle.lock() {
            idle.clear();
        }
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        self.execute("SELECT 1", &[]).await.is_ok()
    }
}

/// A transaction pinned to one pooled connection. Dropping it without
/// commit returns the connection; the server rolls the open transaction
/// back when the next statement or the connection teardown reaches it.
struct PostgresTransaction {
    client: PooledClient,
}

#[async_trait]
impl DriverTransaction for PostgresTransaction {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, DbError> {
        run_statement(self.client.client(), sql, params).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        run_statement(self.client.client(), "COMMIT", &[]).await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        run_statement(self.client.client(), "ROLLBACK", &[]).await?;
        Ok(())
    }
}

async fn run_statement(client: &Client, sql: &str, params: &[Value]) -> Result<QueryOutput, DbError> {
    let statement = client.prepare(sql).await.map_err(translate_error)?;
    let columns: Vec<String> = statement
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let wrapped: Vec<PgParam<'_>> = params.iter().map(PgParam).collect();
    let stream = client
        .query_raw(&statement, wrapped)
        .await
        .map_err(translate_error)?;
    pin_mut!(stream);

    let mut rows = Vec::new();
    while let Some(row) = stream.try_next().await.map_err(translate_error)? {
        rows.push(decode_row(&row));
    }

    let row_count = stream.rows_affected().unwrap_or(rows.len() as u64);
    Ok(QueryOutput {
        columns,
        rows,
        row_count,
    })
}

fn decode_row(row: &Row) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| decode_column(row, idx, column.type_()))
        .collect()
}

fn get_value<'a, T>(row: &'a Row, idx: usize, wrap: impl Fn(T) -> Value) -> Value
where
    T: FromSql<'a>,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => wrap(v),
        Ok(None) => Value::Null,
        Err(e) => {
            log::debug!("failed to decode column {}: {}", idx, e);
            Value::Null
        }
    }
}

/// Wire-format NUMERIC decoded straight to its exact string form.
struct RawNumeric(String);

impl<'a> FromSql<'a> for RawNumeric {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        numeric::decode(raw).map(RawNumeric).map_err(Into::into)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn decode_column(row: &Row, idx: usize, ty: &Type) -> Value {
    match *ty {
        Type::BOOL => get_value::<bool>(row, idx, Value::Bool),
        Type::INT2 => get_value::<i16>(row, idx, |v| Value::Int(i64::from(v))),
        Type::INT4 => get_value::<i32>(row, idx, |v| Value::Int(i64::from(v))),
        Type::INT8 => get_value::<i64>(row, idx, Value::Int),
        Type::FLOAT4 => get_value::<f32>(row, idx, |v| Value::Float(f64::from(v))),
        Type::FLOAT8 => get_value::<f64>(row, idx, Value::Float),
        Type::NUMERIC => get_value::<RawNumeric>(row, idx, |v| Value::Decimal(v.0)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            get_value::<String>(row, idx, Value::Text)
        }
        Type::UUID => get_value::<uuid::Uuid>(row, idx, Value::Uuid),
        Type::TIMESTAMPTZ => get_value::<chrono::DateTime<chrono::Utc>>(row, idx, Value::DateTime),
        Type::TIMESTAMP => {
            get_value::<chrono::NaiveDateTime>(row, idx, |v| Value::DateTime(v.and_utc()))
        }
        Type::DATE => get_value::<chrono::NaiveDate>(row, idx, Value::Date),
        Type::TIME => get_value::<chrono::NaiveTime>(row, idx, Value::Time),
        Type::JSON | Type::JSONB => get_value::<serde_json::Value>(row, idx, Value::Json),
        Type::BYTEA => get_value::<Vec<u8>>(row, idx, Value::Bytes),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => get_value::<Vec<String>>(row, idx, |items| {
            Value::Array(items.into_iter().map(Value::Text).collect())
        }),
        Type::INT4_ARRAY => get_value::<Vec<i32>>(row, idx, |items| {
            Value::Array(items.into_iter().map(|i| Value::Int(i64::from(i))).collect())
        }),
        Type::INT8_ARRAY => get_value::<Vec<i64>>(row, idx, |items| {
            Value::Array(items.into_iter().map(Value::Int).collect())
        }),
        Type::UUID_ARRAY => get_value::<Vec<uuid::Uuid>>(row, idx, |items| {
            Value::Array(items.into_iter().map(Value::Uuid).collect())
        }),
        _ => get_value::<String>(row, idx, Value::Text),
    }
}

/// SQLSTATE-based translation into the engine taxonomy. Structured fields
/// (table, column, constraint detail) are preserved when the server sends
/// them.
fn translate_error(error: tokio_postgres::Error) -> DbError {
    if let Some(db) = error.as_db_error() {
        let code = db.code().code();
        let message = db.message().to_string();
        let mut translated = match code {
            "23505" => DbError::new(ErrorKind::UniqueViolation, message),
            "23503" => DbError::new(ErrorKind::ForeignKeyViolation, message),
            "23514" => DbError::new(ErrorKind::CheckViolation, message),
            "23502" => DbError::new(ErrorKind::NotNullViolation, message),
            c if c.starts_with("08") || c.starts_with("53") => DbError::connection(message),
            _ => DbError::unknown(message),
        };
        if let Some(table) = db.table() {
            translated = translated.with_table(table);
        }
        if let Some(column) = db.column() {
            translated = translated.with_column(column);
        } else if let Some(columns) = db.detail().and_then(parse_key_columns) {
            translated = translated.with_column(columns);
        }
        translated.with_code(code)
    } else if error.is_closed() {
        DbError::connection(error.to_string())
    } else {
        DbError::unknown(error.to_string())
    }
}

/// Constraint details read `Key (col[, col..])=(..) ...`.
fn parse_key_columns(detail: &str) -> Option<String> {
    let rest = detail.strip_prefix("Key (")?;
    let (columns, _) = rest.split_once(')')?;
    Some(columns.to_string())
}
