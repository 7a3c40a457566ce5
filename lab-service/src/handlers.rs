//! Handler模块

use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use common::errors::AppError;
use common::middleware::RequestId;
use common::models::{
    Branch, BranchInput, Doctor, DoctorInput, Patient, PatientInput, QueryRequest, QueryResult,
    WriteAck,
};
use common::response::ApiResponse;

use crate::services::{BranchService, DoctorService, Fetched, PatientService};
use crate::state::AppState;
use crate::SERVICE_NAME;

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

fn reply<T: Serialize>(fetched: Fetched<T>, request_id: &RequestId) -> Json<ApiResponse<T>> {
    Json(
        ApiResponse::ok_with_service(fetched.data, SERVICE_NAME)
            .degraded(fetched.degraded)
            .with_request_id(request_id),
    )
}

/// 执行 SQL 语句
#[utoipa::path(
    post,
    path = "/api/query",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "执行成功或已降级", body = ApiResponse<QueryResult>),
        (status = 400, description = "SQL 无效"),
        (status = 503, description = "数据库不可用且策略为失败")
    )
)]
pub async fn execute_query(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<QueryResult> {
    req.validate()?;

    let start = Instant::now();
    let outcome = state.gateway.execute(&req.sql, &req.params).await?;
    let elapsed = start.elapsed().as_millis() as u64;
    let degraded = outcome.is_degraded();

    Ok(reply(
        Fetched {
            data: QueryResult::from_outcome(outcome, elapsed),
            degraded,
        },
        &request_id,
    ))
}

/// 列出回退数据集中的表
#[utoipa::path(
    get,
    path = "/api/fallback",
    tag = "query",
    responses(
        (status = 200, description = "回退表名列表", body = ApiResponse<Vec<String>>)
    )
)]
pub async fn list_fallback_tables(State(state): State<AppState>) -> Json<ApiResponse<Vec<String>>> {
    Json(ApiResponse::ok_with_service(
        state.gateway.fallback().tables(),
        SERVICE_NAME,
    ))
}

// ============== Patients ==============

/// 列出全部患者
#[utoipa::path(
    get,
    path = "/api/patients",
    tag = "patients",
    responses((status = 200, description = "患者列表", body = ApiResponse<Vec<Patient>>))
)]
pub async fn list_patients(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<Vec<Patient>> {
    let service = PatientService::new(state.gateway);
    Ok(reply(service.list().await?, &request_id))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// 姓名片段
    pub name: String,
}

/// 按姓名查询患者
#[utoipa::path(
    get,
    path = "/api/patients/search",
    tag = "patients",
    params(SearchParams),
    responses((status = 200, description = "匹配的患者", body = ApiResponse<Vec<Patient>>))
)]
pub async fn search_patients(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<Patient>> {
    if params.name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".into()));
    }
    let service = PatientService::new(state.gateway);
    Ok(reply(service.search(&params.name).await?, &request_id))
}

/// 根据 ID 获取患者
#[utoipa::path(
    get,
    path = "/api/patients/{id}",
    tag = "patients",
    params(("id" = i64, Path, description = "患者 ID")),
    responses(
        (status = 200, description = "患者详情", body = ApiResponse<Patient>),
        (status = 404, description = "患者未找到")
    )
)]
pub async fn get_patient(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> ApiResult<Patient> {
    let service = PatientService::new(state.gateway);
    Ok(reply(service.get(id).await?, &request_id))
}

/// 创建患者
#[utoipa::path(
    post,
    path = "/api/patients",
    tag = "patients",
    request_body = PatientInput,
    responses((status = 200, description = "患者已创建", body = ApiResponse<WriteAck>))
)]
pub async fn create_patient(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(input): Json<PatientInput>,
) -> ApiResult<WriteAck> {
    input.validate()?;
    let service = PatientService::new(state.gateway);
    Ok(reply(service.create(&input).await?, &request_id))
}

/// 更新患者
#[utoipa::path(
    put,
    path = "/api/patients/{id}",
    tag = "patients",
    params(("id" = i64, Path, description = "患者 ID")),
    request_body = PatientInput,
    responses(
        (status = 200, description = "患者已更新", body = ApiResponse<WriteAck>),
        (status = 404, description = "患者未找到")
    )
)]
pub async fn update_patient(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(input): Json<PatientInput>,
) -> ApiResult<WriteAck> {
    input.validate()?;
    let service = PatientService::new(state.gateway);
    Ok(reply(service.update(id, &input).await?, &request_id))
}

/// 删除患者
#[utoipa::path(
    delete,
    path = "/api/patients/{id}",
    tag = "patients",
    params(("id" = i64, Path, description = "患者 ID")),
    responses(
        (status = 200, description = "患者已删除", body = ApiResponse<WriteAck>),
        (status = 404, description = "患者未找到")
    )
)]
pub async fn delete_patient(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> ApiResult<WriteAck> {
    let service = PatientService::new(state.gateway);
    Ok(reply(service.delete(id).await?, &request_id))
}

// ============== Doctors ==============

/// 列出全部医生
#[utoipa::path(
    get,
    path = "/api/doctors",
    tag = "doctors",
    responses((status = 200, description = "医生列表", body = ApiResponse<Vec<Doctor>>))
)]
pub async fn list_doctors(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<Vec<Doctor>> {
    let service = DoctorService::new(state.gateway);
    Ok(reply(service.list().await?, &request_id))
}

/// 根据 ID 获取医生
#[utoipa::path(
    get,
    path = "/api/doctors/{id}",
    tag = "doctors",
    params(("id" = i64, Path, description = "医生 ID")),
    responses(
        (status = 200, description = "医生详情", body = ApiResponse<Doctor>),
        (status = 404, description = "医生未找到")
    )
)]
pub async fn get_doctor(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> ApiResult<Doctor> {
    let service = DoctorService::new(state.gateway);
    Ok(reply(service.get(id).await?, &request_id))
}

/// 创建医生
#[utoipa::path(
    post,
    path = "/api/doctors",
    tag = "doctors",
    request_body = DoctorInput,
    responses((status = 200, description = "医生已创建", body = ApiResponse<WriteAck>))
)]
pub async fn create_doctor(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(input): Json<DoctorInput>,
) -> ApiResult<WriteAck> {
    input.validate()?;
    let service = DoctorService::new(state.gateway);
    Ok(reply(service.create(&input).await?, &request_id))
}

/// 更新医生
#[utoipa::path(
    put,
    path = "/api/doctors/{id}",
    tag = "doctors",
    params(("id" = i64, Path, description = "医生 ID")),
    request_body = DoctorInput,
    responses(
        (status = 200, description = "医生已更新", body = ApiResponse<WriteAck>),
        (status = 404, description = "医生未找到")
    )
)]
pub async fn update_doctor(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(input): Json<DoctorInput>,
) -> ApiResult<WriteAck> {
    input.validate()?;
    let service = DoctorService::new(state.gateway);
    Ok(reply(service.update(id, &input).await?, &request_id))
}

/// 删除医生
#[utoipa::path(
    delete,
    path = "/api/doctors/{id}",
    tag = "doctors",
    params(("id" = i64, Path, description = "医生 ID")),
    responses(
        (status = 200, description = "医生已删除", body = ApiResponse<WriteAck>),
        (status = 404, description = "医生未找到")
    )
)]
pub async fn delete_doctor(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> ApiResult<WriteAck> {
    let service = DoctorService::new(state.gateway);
    Ok(reply(service.delete(id).await?, &request_id))
}

// ============== Branches ==============

/// 列出全部分院
#[utoipa::path(
    get,
    path = "/api/branches",
    tag = "branches",
    responses((status = 200, description = "分院列表", body = ApiResponse<Vec<Branch>>))
)]
pub async fn list_branches(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<Vec<Branch>> {
    let service = BranchService::new(state.gateway);
    Ok(reply(service.list().await?, &request_id))
}

/// 根据 ID 获取分院
#[utoipa::path(
    get,
    path = "/api/branches/{id}",
    tag = "branches",
    params(("id" = i64, Path, description = "分院 ID")),
    responses(
        (status = 200, description = "分院详情", body = ApiResponse<Branch>),
        (status = 404, description = "分院未找到")
    )
)]
pub async fn get_branch(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> ApiResult<Branch> {
    let service = BranchService::new(state.gateway);
    Ok(reply(service.get(id).await?, &request_id))
}

/// 创建分院
#[utoipa::path(
    post,
    path = "/api/branches",
    tag = "branches",
    request_body = BranchInput,
    responses((status = 200, description = "分院已创建", body = ApiResponse<WriteAck>))
)]
pub async fn create_branch(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(input): Json<BranchInput>,
) -> ApiResult<WriteAck> {
    input.validate()?;
    let service = BranchService::new(state.gateway);
    Ok(reply(service.create(&input).await?, &request_id))
}

/// 更新分院
#[utoipa::path(
    put,
    path = "/api/branches/{id}",
    tag = "branches",
    params(("id" = i64, Path, description = "分院 ID")),
    request_body = BranchInput,
    responses(
        (status = 200, description = "分院已更新", body = ApiResponse<WriteAck>),
        (status = 404, description = "分院未找到")
    )
)]
pub async fn update_branch(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(input): Json<BranchInput>,
) -> ApiResult<WriteAck> {
    input.validate()?;
    let service = BranchService::new(state.gateway);
    Ok(reply(service.update(id, &input).await?, &request_id))
}

/// 删除分院
#[utoipa::path(
    delete,
    path = "/api/branches/{id}",
    tag = "branches",
    params(("id" = i64, Path, description = "分院 ID")),
    responses(
        (status = 200, description = "分院已删除", body = ApiResponse<WriteAck>),
        (status = 404, description = "分院未找到")
    )
)]
pub async fn delete_branch(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> ApiResult<WriteAck> {
    let service = BranchService::new(state.gateway);
    Ok(reply(service.delete(id).await?, &request_id))
}

// ============== Health ==============

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        gateway_mode: state.gateway.mode().to_string(),
        fallback_tables: state.gateway.fallback().len(),
    })
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// `per-call`, `pooled` 或 `fallback-only`
    pub gateway_mode: String,
    /// 回退数据集中的表数量
    pub fallback_tables: usize,
}
