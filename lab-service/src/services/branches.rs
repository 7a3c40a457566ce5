//! 分院服务模块

use std::sync::Arc;

use serde_json::json;

use common::errors::{AppError, AppResult};
use common::models::{Branch, BranchInput, WriteAck};
use query_gateway::QueryGateway;

use super::{read_rows, require_affected, write, Fetched};

/// 分院增删改查
pub struct BranchService {
    gateway: Arc<QueryGateway>,
}

impl BranchService {
    pub fn new(gateway: Arc<QueryGateway>) -> Self {
        Self { gateway }
    }

    pub async fn list(&self) -> AppResult<Fetched<Vec<Branch>>> {
        read_rows(
            &self.gateway,
            "SELECT `id`, `name`, `address`, `phone` FROM `branches` ORDER BY `name`",
            &[],
        )
        .await
    }

    pub async fn get(&self, id: i64) -> AppResult<Fetched<Branch>> {
        let rows: Fetched<Vec<Branch>> = read_rows(
            &self.gateway,
            "SELECT `id`, `name`, `address`, `phone` FROM `branches` WHERE `id` = ?",
            &[json!(id)],
        )
        .await?;
        let degraded = rows.degraded;
        rows.data
            .into_iter()
            .find(|b| b.id == id)
            .map(|data| Fetched { data, degraded })
            .ok_or_else(|| AppError::NotFound(format!("branch {id}")))
    }

    pub async fn create(&self, input: &BranchInput) -> AppResult<Fetched<WriteAck>> {
        let ack = write(
            &self.gateway,
            "INSERT INTO `branches` (`name`, `address`, `phone`) VALUES (?, ?, ?)",
            &[json!(input.name), json!(input.address), json!(input.phone)],
        )
        .await?;
        tracing::info!(id = ?ack.data.last_insert_id, degraded = ack.degraded, "分院已创建");
        Ok(ack)
    }

    pub async fn update(&self, id: i64, input: &BranchInput) -> AppResult<Fetched<WriteAck>> {
        let ack = write(
            &self.gateway,
            "UPDATE `branches` SET `name` = ?, `address` = ?, `phone` = ? WHERE `id` = ?",
            &[json!(input.name), json!(input.address), json!(input.phone), json!(id)],
        )
        .await?;
        require_affected(ack, || format!("branch {id}"))
    }

    pub async fn delete(&self, id: i64) -> AppResult<Fetched<WriteAck>> {
        let ack = write(&self.gateway, "DELETE FROM `branches` WHERE `id` = ?", &[json!(id)]).await?;
        tracing::info!(id, degraded = ack.degraded, "分院已删除");
        require_affected(ack, || format!("branch {id}"))
    }
}
