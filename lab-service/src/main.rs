//! 检验科后台数据服务
//!
//! 提供以下功能：
//! - 通过查询网关执行 SQL（数据库不可用时按策略降级到回退数据）
//! - 患者、医生、分院的增删改查
//! - 健康检查与 OpenAPI 文档

mod handlers;
mod routes;
mod services;
mod state;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::middleware::request_id::request_id_middleware;
use query_gateway::{FallbackDataset, QueryGateway};
use state::AppState;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

pub(crate) const SERVICE_NAME: &str = "lab-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "检验科后台 API",
        version = "0.1.0",
        description = "患者、医生、分院数据服务与 SQL 查询网关"
    ),
    paths(
        handlers::execute_query,
        handlers::list_fallback_tables,
        handlers::list_patients,
        handlers::search_patients,
        handlers::get_patient,
        handlers::create_patient,
        handlers::update_patient,
        handlers::delete_patient,
        handlers::list_doctors,
        handlers::get_doctor,
        handlers::create_doctor,
        handlers::update_doctor,
        handlers::delete_doctor,
        handlers::list_branches,
        handlers::get_branch,
        handlers::create_branch,
        handlers::update_branch,
        handlers::delete_branch,
        handlers::health_check,
    ),
    components(schemas(
        common::models::QueryRequest,
        common::models::QueryResult,
        common::models::DegradeReason,
        common::models::WriteAck,
        common::models::Patient,
        common::models::PatientInput,
        common::models::Doctor,
        common::models::DoctorInput,
        common::models::Branch,
        common::models::BranchInput,
        handlers::HealthResponse,
    )),
    tags(
        (name = "query", description = "SQL 查询端点"),
        (name = "patients", description = "患者管理端点"),
        (name = "doctors", description = "医生管理端点"),
        (name = "branches", description = "分院管理端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 需在读取任何配置之前加载
    dotenv::dotenv().ok();

    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME).context("加载配置失败")?;

    // 回退数据与查询网关
    let fallback = FallbackDataset::load(&config.gateway.fallback_path)
        .context("加载回退数据失败")?;
    let gateway =
        QueryGateway::from_config(&config.gateway, fallback).context("初始化查询网关失败")?;
    info!(
        mode = gateway.mode(),
        policy = ?gateway.policy(),
        "查询网关已初始化"
    );

    let state = AppState::new(config.clone(), gateway);
    let app = create_router(state);

    // 启动服务
    let addr = format!("{}:{}", config.host, config.port);
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务运行失败")?;

    info!("服务已停止");
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "无法监听关闭信号");
        std::future::pending::<()>().await;
    }
    info!("收到关闭信号");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use common::config::{ConnectionMode, DbConfig, DegradePolicy, GatewayConfig};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(policy: DegradePolicy) -> Router {
        let gateway_config = GatewayConfig {
            db: DbConfig::default(),
            connection_mode: ConnectionMode::PerCall,
            degrade: policy,
            fallback_path: "unused.json".into(),
        };
        let config = AppConfig {
            service_name: SERVICE_NAME.to_string(),
            host: "127.0.0.1".into(),
            port: 0,
            gateway: gateway_config.clone(),
        };
        let fallback = FallbackDataset::from_json_str(
            r#"{
                "patients": [],
                "doctors": [{"id": 1, "name": "placeholder"}],
                "branches": [{"id": 4, "name": "Sucursal Centro", "address": null, "phone": null}]
            }"#,
        )
        .unwrap();
        let gateway = QueryGateway::from_config(&gateway_config, fallback).unwrap();
        create_router(AppState::new(config, gateway))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_fallback_mode() {
        let (status, body) = send(app(DegradePolicy::default()), get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gateway_mode"], "fallback-only");
        assert_eq!(body["fallback_tables"], 3);
    }

    #[tokio::test]
    async fn test_list_doctors_is_degraded() {
        let (status, body) = send(app(DegradePolicy::default()), get("/api/doctors")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([{"id": 1, "name": "placeholder", "specialty": null, "phone": null, "email": null, "commission": null}]));
        assert_eq!(body["meta"]["degraded"], true);
        assert!(body["meta"]["request_id"].is_string());
    }

    #[tokio::test]
    async fn test_missing_branch_is_404() {
        let (status, body) = send(app(DegradePolicy::default()), get("/api/branches/99")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_create_patient_without_database_is_503() {
        let (status, body) = send(
            app(DegradePolicy::default()),
            post_json("/api/patients", json!({"name": "Ana"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "DATABASE_NOT_CONFIGURED");
    }

    #[tokio::test]
    async fn test_invalid_patient_is_400() {
        let (status, body) = send(
            app(DegradePolicy::default()),
            post_json("/api/patients", json!({"name": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_query_endpoint_returns_fallback() {
        let (status, body) = send(
            app(DegradePolicy::default()),
            post_json("/api/query", json!({"sql": "SELECT * FROM `doctors`"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["degraded"], true);
        assert_eq!(body["data"]["row_count"], 1);
        assert_eq!(body["data"]["degrade_reason"]["type"], "not_configured");
    }

    #[tokio::test]
    async fn test_lenient_write_reports_degraded_ack() {
        let (status, body) = send(
            app(DegradePolicy::lenient()),
            post_json("/api/branches", json!({"name": "Sucursal Norte"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["affected_rows"], 0);
        assert_eq!(body["meta"]["degraded"], true);
    }

    #[tokio::test]
    async fn test_openapi_document_served() {
        let (status, body) = send(app(DegradePolicy::default()), get("/api-docs/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"].get("/api/query").is_some());
    }
}
