//! MySQL connectors.
//!
//! Two ways to obtain a session:
//! - [`MySqlConnector`]: a dedicated connection opened for one statement and
//!   closed right after it.
//! - [`MySqlPoolConnector`]: a connection borrowed from a bounded pool and
//!   handed back after the statement.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{
    MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions, MySqlRow,
};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{Column, Connection, MySql, Row, TypeInfo};

use common::config::DbConfig;
use common::errors::{AppError, AppResult};
use common::models::{QueryInvocation, QueryOutcome, Row as JsonRow, StatementKind, WriteAck};

use crate::connector::{Connector, Session};

/// Opens a dedicated connection per call.
pub struct MySqlConnector {
    options: MySqlConnectOptions,
    connect_timeout: Duration,
}

impl MySqlConnector {
    /// Builds the connector; no connection is opened here.
    ///
    /// # Errors
    /// `AppError::DatabaseNotConfigured` when host, user or database is missing.
    pub fn new(config: &DbConfig) -> AppResult<Self> {
        Ok(Self {
            options: connect_options(config)?,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        })
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn open(&self) -> AppResult<Box<dyn Session>> {
        let conn = tokio::time::timeout(
            self.connect_timeout,
            MySqlConnection::connect_with(&self.options),
        )
        .await
        .map_err(|_| {
            AppError::DatabaseConnection(format!(
                "connect timed out after {}s",
                self.connect_timeout.as_secs()
            ))
        })?
        .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;

        Ok(Box::new(DedicatedSession { conn }))
    }

    fn mode(&self) -> &'static str {
        "per-call"
    }
}

struct DedicatedSession {
    conn: MySqlConnection,
}

#[async_trait]
impl Session for DedicatedSession {
    async fn run(&mut self, invocation: &QueryInvocation) -> AppResult<QueryOutcome> {
        run_statement(&mut self.conn, invocation).await
    }

    async fn close(self: Box<Self>) -> AppResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| AppError::DatabaseConnection(format!("close failed: {e}")))
    }
}

/// Borrows connections from a bounded pool.
pub struct MySqlPoolConnector {
    pool: MySqlPool,
    max_connections: u32,
    wait_for_connections: bool,
}

impl MySqlPoolConnector {
    /// Builds a lazily connecting pool sized by `pool_size`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: &DbConfig) -> AppResult<Self> {
        let max_connections = config.pool_size.max(1);
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_lazy_with(connect_options(config)?);

        Ok(Self {
            pool,
            max_connections,
            wait_for_connections: config.wait_for_connections,
        })
    }

    async fn acquire(&self) -> AppResult<PoolConnection<MySql>> {
        self.pool.acquire().await.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => {
                AppError::DatabaseConnection("timed out waiting for a pooled connection".into())
            }
            other => AppError::DatabaseConnection(other.to_string()),
        })
    }
}

#[async_trait]
impl Connector for MySqlPoolConnector {
    async fn open(&self) -> AppResult<Box<dyn Session>> {
        let conn = if self.wait_for_connections {
            self.acquire().await?
        } else {
            match self.pool.try_acquire() {
                Some(conn) => conn,
                // No idle connection, but room to open one. If other callers
                // take the free slots first this waits like the blocking
                // branch, bounded by the acquire timeout.
                None if self.pool.size() < self.max_connections => self.acquire().await?,
                None => return Err(AppError::PoolExhausted),
            }
        };
        Ok(Box::new(PooledSession { conn }))
    }

    fn mode(&self) -> &'static str {
        "pooled"
    }
}

struct PooledSession {
    conn: PoolConnection<MySql>,
}

#[async_trait]
impl Session for PooledSession {
    async fn run(&mut self, invocation: &QueryInvocation) -> AppResult<QueryOutcome> {
        run_statement(&mut self.conn, invocation).await
    }

    async fn close(self: Box<Self>) -> AppResult<()> {
        // Dropping the PoolConnection returns it to the pool.
        drop(self.conn);
        Ok(())
    }
}

fn connect_options(config: &DbConfig) -> AppResult<MySqlConnectOptions> {
    let (Some(host), Some(user), Some(database)) = (
        config.host.as_deref(),
        config.user.as_deref(),
        config.database.as_deref(),
    ) else {
        return Err(AppError::DatabaseNotConfigured);
    };

    let mut options = MySqlConnectOptions::new()
        .host(host)
        .port(config.port)
        .username(user)
        .database(database);
    if let Some(password) = config.password.as_deref() {
        options = options.password(password);
    }
    Ok(options)
}

async fn run_statement(
    conn: &mut MySqlConnection,
    invocation: &QueryInvocation,
) -> AppResult<QueryOutcome> {
    let query = bind_params(sqlx::query(&invocation.sql), &invocation.params);

    match invocation.kind {
        StatementKind::Read => {
            let rows = query
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| AppError::DatabaseQuery(e.to_string()))?;
            tracing::debug!(rows = rows.len(), "查询完成");
            Ok(QueryOutcome::Rows(rows.iter().map(row_to_json).collect()))
        }
        StatementKind::Write => {
            let result = query
                .execute(&mut *conn)
                .await
                .map_err(|e| AppError::DatabaseQuery(e.to_string()))?;
            tracing::debug!(affected = result.rows_affected(), "写入完成");
            Ok(QueryOutcome::Written(WriteAck {
                affected_rows: result.rows_affected(),
                last_insert_id: Some(result.last_insert_id()).filter(|id| *id != 0),
            }))
        }
    }
}

/// Binds JSON values positionally. Arrays and objects are sent as JSON text.
fn bind_params<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[Value],
) -> Query<'q, MySql, MySqlArguments> {
    for value in params {
        query = match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else if let Some(u) = n.as_u64() {
                    query.bind(u)
                } else if let Some(f) = n.as_f64() {
                    query.bind(f)
                } else {
                    query.bind(n.to_string())
                }
            }
            Value::String(s) => query.bind(s.clone()),
            Value::Array(_) | Value::Object(_) => query.bind(value.to_string()),
        };
    }
    query
}

fn row_to_json(row: &MySqlRow) -> JsonRow {
    row.columns()
        .iter()
        .map(|column| {
            let idx = column.ordinal();
            let value = decode_column(row, idx, column.type_info().name());
            (column.name().to_string(), value)
        })
        .collect()
}

fn get<T>(row: &MySqlRow, idx: usize) -> Option<Option<T>>
where
    T: for<'r> sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get::<Option<T>, _>(idx).ok()
}

fn decode_column(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
    if type_name.ends_with("UNSIGNED") {
        if let Some(v) = get::<u64>(row, idx) {
            return v.map(Value::from).unwrap_or(Value::Null);
        }
    }

    let decoded = match type_name {
        "BOOLEAN" => get::<bool>(row, idx).map(|v| v.map(Value::Bool)),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            get::<i64>(row, idx).map(|v| v.map(Value::from))
        }
        "FLOAT" | "DOUBLE" => get::<f64>(row, idx).map(|v| v.map(float_value)),
        "DECIMAL" => row
            .try_get_unchecked::<Option<String>, _>(idx)
            .ok()
            .map(|v| v.map(|s| s.parse::<f64>().map(float_value).unwrap_or(Value::String(s)))),
        "DATETIME" | "TIMESTAMP" => get::<chrono::NaiveDateTime>(row, idx)
            .map(|v| v.map(|d| Value::String(d.format("%Y-%m-%d %H:%M:%S").to_string()))),
        "DATE" => get::<chrono::NaiveDate>(row, idx).map(|v| v.map(|d| Value::String(d.to_string()))),
        "TIME" => get::<chrono::NaiveTime>(row, idx).map(|v| v.map(|t| Value::String(t.to_string()))),
        "JSON" => row
            .try_get_unchecked::<Option<String>, _>(idx)
            .ok()
            .map(|v| v.map(|s| serde_json::from_str(&s).unwrap_or(Value::String(s)))),
        _ => None,
    };

    decoded
        .or_else(|| get::<String>(row, idx).map(|v| v.map(Value::String)))
        .or_else(|| {
            row.try_get_unchecked::<Option<String>, _>(idx)
                .ok()
                .map(|v| v.map(Value::String))
        })
        .flatten()
        .unwrap_or(Value::Null)
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
