//! Query execution gateway.
//!
//! Single choke point for SQL. Each call opens a session, runs one
//! statement with bound parameters and closes the session on every exit
//! path. When the database is unconfigured or the call fails, the degrade
//! policy decides between answering from the fallback dataset and
//! surfacing the error.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use common::config::{ConnectionMode, DegradeMode, DegradePolicy, GatewayConfig};
use common::errors::{AppError, AppResult};
use common::models::{
    DegradeReason, Degraded, QueryInvocation, QueryOutcome, StatementKind, WriteAck,
};
use common::utils::SqlInspector;

use crate::connector::Connector;
use crate::fallback::FallbackDataset;
use crate::mysql::{MySqlConnector, MySqlPoolConnector};

/// Executes SQL with graceful degradation.
pub struct QueryGateway {
    /// `None` when the connection configuration is incomplete.
    connector: Option<Arc<dyn Connector>>,
    fallback: Arc<FallbackDataset>,
    policy: DegradePolicy,
}

impl QueryGateway {
    /// Assembles a gateway from an explicit connector.
    pub fn new(
        connector: Option<Arc<dyn Connector>>,
        fallback: FallbackDataset,
        policy: DegradePolicy,
    ) -> Self {
        Self {
            connector,
            fallback: Arc::new(fallback),
            policy,
        }
    }

    /// Builds the MySQL connector selected by `config`.
    ///
    /// An incomplete connection configuration yields a fallback-only gateway
    /// that never attempts a connection. Pooled mode must be built inside a
    /// Tokio runtime.
    pub fn from_config(config: &GatewayConfig, fallback: FallbackDataset) -> AppResult<Self> {
        let connector: Option<Arc<dyn Connector>> = if !config.db.is_configured() {
            tracing::warn!("数据库未配置（DB_HOST/DB_USER/DB_NAME），网关仅返回回退数据");
            None
        } else {
            match config.connection_mode {
                ConnectionMode::PerCall => Some(Arc::new(MySqlConnector::new(&config.db)?)),
                ConnectionMode::Pooled => Some(Arc::new(MySqlPoolConnector::new(&config.db)?)),
            }
        };

        if let Some(connector) = &connector {
            tracing::info!(
                mode = connector.mode(),
                host = config.db.host.as_deref().unwrap_or_default(),
                database = config.db.database.as_deref().unwrap_or_default(),
                "查询网关已就绪"
            );
        }

        Ok(Self::new(connector, fallback, config.degrade))
    }

    /// `per-call`, `pooled` or `fallback-only`.
    pub fn mode(&self) -> &'static str {
        self.connector
            .as_ref()
            .map_or("fallback-only", |c| c.mode())
    }

    pub fn policy(&self) -> DegradePolicy {
        self.policy
    }

    pub fn fallback(&self) -> &FallbackDataset {
        &self.fallback
    }

    /// Executes one statement.
    ///
    /// Returns the driver's rows or write acknowledgement, or a
    /// [`QueryOutcome::Degraded`] carrying fallback data when the policy for
    /// the statement kind is [`DegradeMode::Fallback`].
    ///
    /// # Errors
    /// Only when the policy for the statement kind is [`DegradeMode::Fail`]:
    /// `DatabaseNotConfigured`, `Validation`, `DatabaseConnection`,
    /// `PoolExhausted` or `DatabaseQuery`.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> AppResult<QueryOutcome> {
        let kind = SqlInspector::statement_kind(sql);

        let Some(connector) = &self.connector else {
            return self.degrade(sql, kind, AppError::DatabaseNotConfigured);
        };

        if let Err(e) = SqlInspector::ensure_single_statement(sql) {
            tracing::warn!(error = %e, "拒绝执行 SQL");
            return self.degrade(sql, kind, e);
        }

        let invocation = QueryInvocation {
            sql: sql.to_string(),
            params: params.to_vec(),
            kind,
        };

        match run_once(connector.as_ref(), &invocation).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let table = SqlInspector::extract_table(sql);
                tracing::warn!(
                    error = %e,
                    table = table.as_deref().unwrap_or("-"),
                    "SQL 执行失败"
                );
                self.degrade(sql, kind, e)
            }
        }
    }

    /// Executes one statement and deserializes the result into `T`.
    ///
    /// Rows become an array of objects, a write acknowledgement becomes
    /// `{"affected_rows", "last_insert_id"}`. Fallback data is used as is for
    /// reads; a degraded write yields an empty acknowledgement so the result
    /// keeps the write shape.
    pub async fn fetch<T: DeserializeOwned>(&self, sql: &str, params: &[Value]) -> AppResult<T> {
        let value = match self.execute(sql, params).await? {
            QueryOutcome::Degraded(_) if SqlInspector::statement_kind(sql) == StatementKind::Write => {
                QueryOutcome::Written(WriteAck::default()).into_value()
            }
            outcome => outcome.into_value(),
        };
        Ok(serde_json::from_value(value)?)
    }

    fn degrade(&self, sql: &str, kind: StatementKind, error: AppError) -> AppResult<QueryOutcome> {
        match self.policy.mode_for(kind) {
            DegradeMode::Fail => Err(error),
            DegradeMode::Fallback => {
                let (table, value) = self.fallback.resolve(sql);
                let reason = match error {
                    AppError::DatabaseNotConfigured => DegradeReason::NotConfigured,
                    // Driver text stays in the logs; callers only see the code.
                    other => DegradeReason::QueryFailed(other.code().to_string()),
                };
                tracing::debug!(table = table.as_deref().unwrap_or("-"), ?reason, "返回回退数据");
                Ok(QueryOutcome::Degraded(Degraded {
                    table,
                    value,
                    reason,
                }))
            }
        }
    }
}

/// Opens a session, runs the statement, closes the session.
async fn run_once(connector: &dyn Connector, invocation: &QueryInvocation) -> AppResult<QueryOutcome> {
    let mut session = connector.open().await?;
    let result = session.run(invocation).await;
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "关闭数据库连接失败");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use common::config::DbConfig;
    use common::models::Row;
    use serde::Deserialize;
    use serde_json::json;

    use crate::connector::Session;

    #[derive(Default)]
    struct Counters {
        opens: AtomicUsize,
        runs: AtomicUsize,
        closes: AtomicUsize,
    }

    impl Counters {
        fn snapshot(&self) -> (usize, usize, usize) {
            (
                self.opens.load(Ordering::SeqCst),
                self.runs.load(Ordering::SeqCst),
                self.closes.load(Ordering::SeqCst),
            )
        }
    }

    #[derive(Clone)]
    enum Behavior {
        Succeed(QueryOutcome),
        FailOpen,
        FailRun,
    }

    struct MockConnector {
        counters: Arc<Counters>,
        behavior: Behavior,
    }

    struct MockSession {
        counters: Arc<Counters>,
        behavior: Behavior,
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn open(&self) -> AppResult<Box<dyn Session>> {
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            if let Behavior::FailOpen = self.behavior {
                return Err(AppError::DatabaseConnection("connection refused".into()));
            }
            Ok(Box::new(MockSession {
                counters: self.counters.clone(),
                behavior: self.behavior.clone(),
            }))
        }

        fn mode(&self) -> &'static str {
            "mock"
        }
    }

    #[async_trait]
    impl Session for MockSession {
        async fn run(&mut self, _invocation: &QueryInvocation) -> AppResult<QueryOutcome> {
            self.counters.runs.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Succeed(outcome) => Ok(outcome.clone()),
                _ => Err(AppError::DatabaseQuery("Table 'lab.doctors' doesn't exist".into())),
            }
        }

        async fn close(self: Box<Self>) -> AppResult<()> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fallback() -> FallbackDataset {
        FallbackDataset::from_json_str(
            r#"{"patients": [], "doctors": [{"id": 1, "name": "placeholder"}]}"#,
        )
        .unwrap()
    }

    fn gateway(behavior: Behavior, policy: DegradePolicy) -> (QueryGateway, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let connector = MockConnector {
            counters: counters.clone(),
            behavior,
        };
        (
            QueryGateway::new(Some(Arc::new(connector)), fallback(), policy),
            counters,
        )
    }

    fn unconfigured(policy: DegradePolicy) -> QueryGateway {
        let config = GatewayConfig {
            db: DbConfig {
                host: None,
                user: Some("lab".into()),
                database: Some("laboratory".into()),
                ..Default::default()
            },
            connection_mode: ConnectionMode::PerCall,
            degrade: policy,
            fallback_path: "unused.json".into(),
        };
        QueryGateway::from_config(&config, fallback()).unwrap()
    }

    fn doctor_row() -> Row {
        let mut row = Row::new();
        row.insert("id".into(), json!(7));
        row.insert("name".into(), json!("Dra. Paredes"));
        row
    }

    #[tokio::test]
    async fn test_unconfigured_returns_fallback_without_connecting() {
        let gw = unconfigured(DegradePolicy::default());
        assert_eq!(gw.mode(), "fallback-only");

        let outcome = gw.execute("SELECT * FROM patients", &[]).await.unwrap();
        match &outcome {
            QueryOutcome::Degraded(d) => {
                assert_eq!(d.table.as_deref(), Some("patients"));
                assert_eq!(d.reason, DegradeReason::NotConfigured);
            }
            other => panic!("expected degraded outcome, got {other:?}"),
        }
        assert_eq!(outcome.into_value(), json!([]));
    }

    #[tokio::test]
    async fn test_unconfigured_unmapped_table_is_empty() {
        let gw = unconfigured(DegradePolicy::default());
        let value = gw.execute("SELECT * FROM expenses", &[]).await.unwrap().into_value();
        assert_eq!(value, json!([]));
        let value = gw.execute("SELECT 1", &[]).await.unwrap().into_value();
        assert_eq!(value, json!([]));
    }

    #[tokio::test]
    async fn test_fallback_path_is_idempotent() {
        let gw = unconfigured(DegradePolicy::default());
        let first = gw.execute("SELECT * FROM doctors", &[]).await.unwrap();
        let second = gw.execute("SELECT * FROM doctors", &[]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(gw.fallback().lookup("doctors"), json!([{"id": 1, "name": "placeholder"}]));
    }

    #[tokio::test]
    async fn test_unconfigured_write_fails_under_default_policy() {
        let gw = unconfigured(DegradePolicy::default());
        let err = gw
            .execute("INSERT INTO patients (name) VALUES (?)", &[json!("Ana")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DatabaseNotConfigured));
    }

    #[tokio::test]
    async fn test_unconfigured_write_degrades_when_lenient() {
        let gw = unconfigured(DegradePolicy::lenient());
        let outcome = gw
            .execute("INSERT INTO `patients` (name) VALUES (?)", &[json!("Ana")])
            .await
            .unwrap();
        assert!(outcome.is_degraded());
        assert_eq!(outcome.into_value(), json!([]));
    }

    #[tokio::test]
    async fn test_success_returns_driver_rows_and_closes_once() {
        let rows = vec![doctor_row()];
        let (gw, counters) = gateway(Behavior::Succeed(QueryOutcome::Rows(rows.clone())), DegradePolicy::default());

        let outcome = gw.execute("SELECT * FROM doctors WHERE id = ?", &[json!(7)]).await.unwrap();
        assert_eq!(outcome, QueryOutcome::Rows(rows));
        assert_eq!(counters.snapshot(), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_write_returns_ack() {
        let ack = WriteAck {
            affected_rows: 1,
            last_insert_id: Some(12),
        };
        let (gw, counters) = gateway(Behavior::Succeed(QueryOutcome::Written(ack.clone())), DegradePolicy::default());

        let outcome = gw
            .execute("INSERT INTO branches (name) VALUES (?)", &[json!("Norte")])
            .await
            .unwrap();
        assert_eq!(outcome, QueryOutcome::Written(ack));
        assert_eq!(counters.snapshot(), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_execution_failure_degrades_and_still_closes() {
        let (gw, counters) = gateway(Behavior::FailRun, DegradePolicy::default());

        let outcome = gw.execute("SELECT * FROM doctors", &[]).await.unwrap();
        match &outcome {
            QueryOutcome::Degraded(d) => {
                assert_eq!(
                    d.reason,
                    DegradeReason::QueryFailed("DATABASE_QUERY_ERROR".into())
                );
            }
            other => panic!("expected degraded outcome, got {other:?}"),
        }
        assert_eq!(outcome.into_value(), json!([{"id": 1, "name": "placeholder"}]));
        assert_eq!(counters.snapshot(), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_open_failure_returns_placeholder_row() {
        let (gw, counters) = gateway(Behavior::FailOpen, DegradePolicy::default());

        let value = gw.execute("SELECT * FROM doctors", &[]).await.unwrap().into_value();
        assert_eq!(value, json!([{"id": 1, "name": "placeholder"}]));
        // Nothing was opened, so nothing to close.
        assert_eq!(counters.snapshot(), (1, 0, 0));
    }

    #[tokio::test]
    async fn test_failed_write_propagates_under_default_policy() {
        let (gw, counters) = gateway(Behavior::FailRun, DegradePolicy::default());

        let err = gw
            .execute("UPDATE doctors SET name = ? WHERE id = ?", &[json!("X"), json!(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DatabaseQuery(_)));
        assert_eq!(counters.snapshot(), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_failed_write_degrades_when_lenient() {
        let (gw, _) = gateway(Behavior::FailRun, DegradePolicy::lenient());
        let outcome = gw
            .execute("DELETE FROM doctors WHERE id = ?", &[json!(1)])
            .await
            .unwrap();
        assert!(outcome.is_degraded());
    }

    #[tokio::test]
    async fn test_strict_read_propagates() {
        let (gw, _) = gateway(Behavior::FailOpen, DegradePolicy::strict());
        let err = gw.execute("SELECT * FROM doctors", &[]).await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseConnection(_)));
    }

    #[tokio::test]
    async fn test_batched_statement_never_reaches_connector() {
        let (gw, counters) = gateway(Behavior::Succeed(QueryOutcome::Rows(vec![])), DegradePolicy::default());

        let outcome = gw
            .execute("SELECT * FROM patients; DROP TABLE patients", &[])
            .await
            .unwrap();
        assert!(outcome.is_degraded());
        assert_eq!(counters.snapshot(), (0, 0, 0));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct DoctorName {
        id: i64,
        name: String,
    }

    #[tokio::test]
    async fn test_fetch_deserializes_rows_and_fallback() {
        let (gw, _) = gateway(Behavior::Succeed(QueryOutcome::Rows(vec![doctor_row()])), DegradePolicy::default());
        let doctors: Vec<DoctorName> = gw.fetch("SELECT id, name FROM doctors", &[]).await.unwrap();
        assert_eq!(doctors, vec![DoctorName { id: 7, name: "Dra. Paredes".into() }]);

        let gw = unconfigured(DegradePolicy::default());
        let doctors: Vec<DoctorName> = gw.fetch("SELECT id, name FROM doctors", &[]).await.unwrap();
        assert_eq!(doctors, vec![DoctorName { id: 1, name: "placeholder".into() }]);
    }

    #[tokio::test]
    async fn test_commented_read_still_falls_back() {
        let gw = unconfigured(DegradePolicy::default());
        let value = gw
            .execute("-- list\nSELECT * FROM doctors", &[])
            .await
            .unwrap()
            .into_value();
        assert_eq!(value, json!([{"id": 1, "name": "placeholder"}]));

        let (gw, counters) = gateway(Behavior::FailRun, DegradePolicy::default());
        let outcome = gw
            .execute("/* report */ SELECT * FROM doctors", &[])
            .await
            .unwrap();
        assert!(outcome.is_degraded());
        assert_eq!(counters.snapshot(), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_fetch_degraded_write_keeps_ack_shape() {
        let gw = unconfigured(DegradePolicy::lenient());
        let ack: WriteAck = gw
            .fetch("INSERT INTO doctors (name) VALUES (?)", &[json!("Dr. Vega")])
            .await
            .unwrap();
        assert_eq!(ack, WriteAck::default());

        let (gw, _) = gateway(Behavior::FailRun, DegradePolicy::lenient());
        let ack: WriteAck = gw
            .fetch("UPDATE doctors SET name = ? WHERE id = ?", &[json!("X"), json!(1)])
            .await
            .unwrap();
        assert_eq!(ack.affected_rows, 0);
    }

    #[tokio::test]
    async fn test_degrade_reason_hides_driver_message() {
        let (gw, _) = gateway(Behavior::FailRun, DegradePolicy::default());
        let outcome = gw.execute("SELECT * FROM doctors", &[]).await.unwrap();
        let QueryOutcome::Degraded(degraded) = outcome else {
            panic!("expected degraded outcome");
        };
        let reason = serde_json::to_string(&degraded.reason).unwrap();
        assert!(!reason.contains("lab.doctors"));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_open_and_run_failures_are_logged() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (gw, _) = gateway(Behavior::FailOpen, DegradePolicy::default());
        assert!(gw.execute("SELECT * FROM doctors", &[]).await.unwrap().is_degraded());
        let (gw, _) = gateway(Behavior::FailRun, DegradePolicy::default());
        assert!(gw.execute("SELECT * FROM doctors", &[]).await.unwrap().is_degraded());

        let output = logs.contents();
        assert!(output.contains("WARN"));
        assert!(output.contains("connection refused"));
        assert!(output.contains("Table 'lab.doctors' doesn't exist"));
    }
}
