//! 医生服务模块

use std::sync::Arc;

use serde_json::{json, Value};

use common::errors::{AppError, AppResult};
use common::models::{Doctor, DoctorInput, WriteAck};
use query_gateway::QueryGateway;

use super::{read_rows, require_affected, write, Fetched};

const SELECT_COLUMNS: &str =
    "SELECT `id`, `name`, `specialty`, `phone`, `email`, `commission` FROM `doctors`";

/// 医生增删改查
pub struct DoctorService {
    gateway: Arc<QueryGateway>,
}

impl DoctorService {
    pub fn new(gateway: Arc<QueryGateway>) -> Self {
        Self { gateway }
    }

    pub async fn list(&self) -> AppResult<Fetched<Vec<Doctor>>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY `name`");
        read_rows(&self.gateway, &sql, &[]).await
    }

    pub async fn get(&self, id: i64) -> AppResult<Fetched<Doctor>> {
        let sql = format!("{SELECT_COLUMNS} WHERE `id` = ?");
        let rows: Fetched<Vec<Doctor>> = read_rows(&self.gateway, &sql, &[json!(id)]).await?;
        let degraded = rows.degraded;
        rows.data
            .into_iter()
            .find(|d| d.id == id)
            .map(|data| Fetched { data, degraded })
            .ok_or_else(|| AppError::NotFound(format!("doctor {id}")))
    }

    pub async fn create(&self, input: &DoctorInput) -> AppResult<Fetched<WriteAck>> {
        let sql = "INSERT INTO `doctors` (`name`, `specialty`, `phone`, `email`, `commission`) VALUES (?, ?, ?, ?, ?)";
        let ack = write(&self.gateway, sql, &input_params(input)).await?;
        tracing::info!(id = ?ack.data.last_insert_id, degraded = ack.degraded, "医生已创建");
        Ok(ack)
    }

    pub async fn update(&self, id: i64, input: &DoctorInput) -> AppResult<Fetched<WriteAck>> {
        let sql = "UPDATE `doctors` SET `name` = ?, `specialty` = ?, `phone` = ?, `email` = ?, `commission` = ? WHERE `id` = ?";
        let mut params = input_params(input);
        params.push(json!(id));
        let ack = write(&self.gateway, sql, &params).await?;
        require_affected(ack, || format!("doctor {id}"))
    }

    pub async fn delete(&self, id: i64) -> AppResult<Fetched<WriteAck>> {
        let ack = write(&self.gateway, "DELETE FROM `doctors` WHERE `id` = ?", &[json!(id)]).await?;
        tracing::info!(id, degraded = ack.degraded, "医生已删除");
        require_affected(ack, || format!("doctor {id}"))
    }
}

fn input_params(input: &DoctorInput) -> Vec<Value> {
    vec![
        json!(input.name),
        json!(input.specialty),
        json!(input.phone),
        json!(input.email),
        json!(input.commission),
    ]
}
