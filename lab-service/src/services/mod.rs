//! Lab service modules.
//!
//! Each service builds SQL text with `?` placeholders and hands it to the
//! query gateway together with the bind values in placeholder order.

pub mod branches;
pub mod doctors;
pub mod patients;

use serde::de::DeserializeOwned;
use serde_json::Value;

use common::errors::{AppError, AppResult};
use common::models::{QueryOutcome, WriteAck};
use query_gateway::QueryGateway;

pub use branches::BranchService;
pub use doctors::DoctorService;
pub use patients::PatientService;

/// Data plus whether it came from the fallback dataset.
#[derive(Debug)]
pub struct Fetched<T> {
    pub data: T,
    pub degraded: bool,
}

/// Runs a read and deserializes the rows.
///
/// Fallback rows that do not fit `T` are skipped, so a degraded read never
/// fails on the shape of the canned data.
async fn read_rows<T: DeserializeOwned>(
    gateway: &QueryGateway,
    sql: &str,
    params: &[Value],
) -> AppResult<Fetched<Vec<T>>> {
    match gateway.execute(sql, params).await? {
        QueryOutcome::Degraded(d) => Ok(Fetched {
            data: fallback_rows(d.table.as_deref(), d.value),
            degraded: true,
        }),
        outcome => Ok(Fetched {
            data: serde_json::from_value(outcome.into_value())?,
            degraded: false,
        }),
    }
}

fn fallback_rows<T: DeserializeOwned>(table: Option<&str>, value: Value) -> Vec<T> {
    let table = table.unwrap_or("-");
    let Value::Array(items) = value else {
        tracing::warn!(table, "回退数据不是数组，按空结果处理");
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(row) => Some(row),
            Err(e) => {
                tracing::warn!(table, error = %e, "跳过无效的回退数据行");
                None
            }
        })
        .collect()
}

/// Runs a write.
///
/// A degraded write (lenient policy only) reports zero affected rows.
async fn write(gateway: &QueryGateway, sql: &str, params: &[Value]) -> AppResult<Fetched<WriteAck>> {
    match gateway.execute(sql, params).await? {
        QueryOutcome::Written(ack) => Ok(Fetched {
            data: ack,
            degraded: false,
        }),
        QueryOutcome::Degraded(d) => {
            tracing::warn!(table = d.table.as_deref().unwrap_or("-"), "写入未执行，已降级");
            Ok(Fetched {
                data: WriteAck::default(),
                degraded: true,
            })
        }
        QueryOutcome::Rows(_) => Err(AppError::Internal(
            "write statement returned rows".into(),
        )),
    }
}

/// Maps a zero-row update or delete to `NotFound`, unless degraded.
fn require_affected(ack: Fetched<WriteAck>, what: impl FnOnce() -> String) -> AppResult<Fetched<WriteAck>> {
    if !ack.degraded && ack.data.affected_rows == 0 {
        return Err(AppError::NotFound(what()));
    }
    Ok(ack)
}
