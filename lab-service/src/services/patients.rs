//! 患者服务模块

use std::sync::Arc;

use serde_json::{json, Value};

use common::errors::{AppError, AppResult};
use common::models::{Patient, PatientInput, WriteAck};
use query_gateway::QueryGateway;

use super::{read_rows, require_affected, write, Fetched};

const SELECT_COLUMNS: &str = "SELECT `id`, `name`, `last_name`, `birth_date`, `gender`, `phone`, `email`, `address`, `created_at` FROM `patients`";

/// 患者增删改查
pub struct PatientService {
    gateway: Arc<QueryGateway>,
}

impl PatientService {
    pub fn new(gateway: Arc<QueryGateway>) -> Self {
        Self { gateway }
    }

    /// 列出全部患者，按创建时间倒序
    pub async fn list(&self) -> AppResult<Fetched<Vec<Patient>>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY `created_at` DESC");
        read_rows(&self.gateway, &sql, &[]).await
    }

    /// 按姓名模糊查询
    pub async fn search(&self, name: &str) -> AppResult<Fetched<Vec<Patient>>> {
        let pattern = format!("%{}%", name.trim());
        let sql = format!("{SELECT_COLUMNS} WHERE `name` LIKE ? OR `last_name` LIKE ? ORDER BY `name`");
        read_rows(&self.gateway, &sql, &[json!(pattern), json!(pattern)]).await
    }

    pub async fn get(&self, id: i64) -> AppResult<Fetched<Patient>> {
        let sql = format!("{SELECT_COLUMNS} WHERE `id` = ?");
        let rows: Fetched<Vec<Patient>> = read_rows(&self.gateway, &sql, &[json!(id)]).await?;
        let degraded = rows.degraded;
        rows.data
            .into_iter()
            .find(|p| p.id == id)
            .map(|data| Fetched { data, degraded })
            .ok_or_else(|| AppError::NotFound(format!("patient {id}")))
    }

    pub async fn create(&self, input: &PatientInput) -> AppResult<Fetched<WriteAck>> {
        let sql = "INSERT INTO `patients` (`name`, `last_name`, `birth_date`, `gender`, `phone`, `email`, `address`) VALUES (?, ?, ?, ?, ?, ?, ?)";
        let ack = write(&self.gateway, sql, &input_params(input)).await?;
        tracing::info!(id = ?ack.data.last_insert_id, degraded = ack.degraded, "患者已创建");
        Ok(ack)
    }

    pub async fn update(&self, id: i64, input: &PatientInput) -> AppResult<Fetched<WriteAck>> {
        let sql = "UPDATE `patients` SET `name` = ?, `last_name` = ?, `birth_date` = ?, `gender` = ?, `phone` = ?, `email` = ?, `address` = ? WHERE `id` = ?";
        let mut params = input_params(input);
        params.push(json!(id));
        let ack = write(&self.gateway, sql, &params).await?;
        require_affected(ack, || format!("patient {id}"))
    }

    pub async fn delete(&self, id: i64) -> AppResult<Fetched<WriteAck>> {
        let ack = write(&self.gateway, "DELETE FROM `patients` WHERE `id` = ?", &[json!(id)]).await?;
        tracing::info!(id, degraded = ack.degraded, "患者已删除");
        require_affected(ack, || format!("patient {id}"))
    }
}

fn input_params(input: &PatientInput) -> Vec<Value> {
    vec![
        json!(input.name),
        json!(input.last_name),
        json!(input.birth_date),
        json!(input.gender),
        json!(input.phone),
        json!(input.email),
        json!(input.address),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_gateway::{DegradePolicy, FallbackDataset};

    fn service(policy: DegradePolicy) -> PatientService {
        let fallback = FallbackDataset::from_json_str(
            r#"{"patients": [
                {"id": 1, "name": "Ana", "last_name": "Torres"},
                {"id": 2, "name": "Luis", "last_name": null, "birth_date": "1990-04-02"}
            ]}"#,
        )
        .unwrap();
        PatientService::new(Arc::new(QueryGateway::new(None, fallback, policy)))
    }

    fn input() -> PatientInput {
        PatientInput {
            name: "Marta".into(),
            last_name: Some("Gil".into()),
            birth_date: None,
            gender: Some("F".into()),
            phone: None,
            email: None,
            address: None,
        }
    }

    #[tokio::test]
    async fn test_list_serves_fallback_rows() {
        let listed = service(DegradePolicy::default()).list().await.unwrap();
        assert!(listed.degraded);
        assert_eq!(listed.data.len(), 2);
        assert_eq!(listed.data[1].birth_date.as_deref(), Some("1990-04-02"));
    }

    #[tokio::test]
    async fn test_get_picks_matching_row() {
        let svc = service(DegradePolicy::default());
        assert_eq!(svc.get(2).await.unwrap().data.name, "Luis");
        assert!(matches!(svc.get(99).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_fails_without_database() {
        let err = service(DegradePolicy::default()).create(&input()).await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseNotConfigured));
    }

    #[tokio::test]
    async fn test_lenient_update_is_degraded_not_missing() {
        let ack = service(DegradePolicy::lenient()).update(1, &input()).await.unwrap();
        assert!(ack.degraded);
        assert_eq!(ack.data.affected_rows, 0);
    }

    #[test]
    fn test_params_follow_placeholder_order() {
        let params = input_params(&input());
        assert_eq!(params.len(), 7);
        assert_eq!(params[0], json!("Marta"));
        assert_eq!(params[2], Value::Null);
        assert_eq!(params[3], json!("F"));
    }
}
