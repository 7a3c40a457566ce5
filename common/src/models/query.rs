//! SQL query models.
//!
//! Contains the invocation handed to the gateway, the typed outcome it
//! returns, and the request/response bodies of the query endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

/// One result row, keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// Whether a statement reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Read,
    Write,
}

/// A single statement with its positional bind values.
#[derive(Debug, Clone)]
pub struct QueryInvocation {
    pub sql: String,
    pub params: Vec<Value>,
    pub kind: StatementKind,
}

/// Acknowledgement of a write statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WriteAck {
    pub affected_rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<u64>,
}

/// Why the gateway answered from the fallback dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum DegradeReason {
    /// Connection configuration is incomplete.
    NotConfigured,
    /// Opening the connection or executing the statement failed. Carries
    /// the error code, never the driver message.
    QueryFailed(String),
}

/// Fallback answer produced instead of a database result.
#[derive(Debug, Clone, PartialEq)]
pub struct Degraded {
    /// Table extracted from the statement, if any.
    pub table: Option<String>,
    pub value: Value,
    pub reason: DegradeReason,
}

/// Result of one gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Rows returned by a read.
    Rows(Vec<Row>),
    /// Acknowledgement of a write.
    Written(WriteAck),
    /// Fallback data served in place of the database.
    Degraded(Degraded),
}

impl QueryOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, QueryOutcome::Degraded(_))
    }

    /// Flattens the outcome into the JSON shape callers deserialize from.
    pub fn into_value(self) -> Value {
        match self {
            QueryOutcome::Rows(rows) => Value::Array(rows.into_iter().map(Value::Object).collect()),
            QueryOutcome::Written(ack) => serde_json::json!({
                "affected_rows": ack.affected_rows,
                "last_insert_id": ack.last_insert_id,
            }),
            QueryOutcome::Degraded(d) => d.value,
        }
    }
}

/// Request body for executing a SQL statement.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct QueryRequest {
    /// SQL statement with `?` placeholders.
    #[validate(length(min = 1, message = "SQL statement is required"))]
    pub sql: String,

    /// Positional bind values.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub params: Vec<Value>,
}

/// Result of a SQL statement as returned over HTTP.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueryResult {
    /// Rows for reads, or the fallback value when degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,

    /// Number of rows returned (reads only).
    #[serde(default)]
    pub row_count: usize,

    /// Number of rows affected (writes only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<u64>,

    /// True when the answer came from the fallback dataset.
    #[serde(default)]
    pub degraded: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub degrade_reason: Option<DegradeReason>,

    /// Execution time in milliseconds.
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn from_outcome(outcome: QueryOutcome, execution_time_ms: u64) -> Self {
        match outcome {
            QueryOutcome::Rows(rows) => Self {
                row_count: rows.len(),
                data: Some(Value::Array(rows.into_iter().map(Value::Object).collect())),
                affected_rows: None,
                last_insert_id: None,
                degraded: false,
                degrade_reason: None,
                execution_time_ms,
            },
            QueryOutcome::Written(ack) => Self {
                data: None,
                row_count: 0,
                affected_rows: Some(ack.affected_rows),
                last_insert_id: ack.last_insert_id,
                degraded: false,
                degrade_reason: None,
                execution_time_ms,
            },
            QueryOutcome::Degraded(d) => Self {
                row_count: d.value.as_array().map_or(0, Vec::len),
                data: Some(d.value),
                affected_rows: None,
                last_insert_id: None,
                degraded: true,
                degrade_reason: Some(d.reason),
                execution_time_ms,
            },
        }
    }
}
