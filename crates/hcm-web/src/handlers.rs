//! HTTP处理器

use crate::auth::ApiError;
use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
    Extension,
};
use hcm_core::{AuthUser, NewCase};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "HCM Case API",
        "version": "1.0.0",
        "status": "running",
        "endpoints": {
            "health": "/health",
            "api": "/api/v1"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": "1.0.0"
    }))
}

/// 创建病例
pub async fn create_case(
    State(state): State<AppState>,
    Extension(acting): Extension<AuthUser>,
    Json(request): Json<NewCase>,
) -> Result<impl IntoResponse, ApiError> {
    info!("User {} creating case", acting.id);

    let case = state.engine.create_case(&acting, request).await?;
    Ok(Json(case))
}

/// 查看病例详情
///
/// 打开病例同时触发首次查看的状态推进。
pub async fn get_case(
    State(state): State<AppState>,
    Extension(acting): Extension<AuthUser>,
    Path(case_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let case = state.engine.mark_viewed(case_id, &acting).await?;
    Ok(Json(case))
}

/// 分派请求参数
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub target_user_id: Uuid,
    pub notes: Option<String>,
}

/// 移交病例
pub async fn assign_case(
    State(state): State<AppState>,
    Extension(acting): Extension<AuthUser>,
    Path(case_id): Path<Uuid>,
    Json(request): Json<AssignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!(
        "User {} assigning case {} to {}",
        acting.id, case_id, request.target_user_id
    );

    let case = state
        .engine
        .assign(case_id, &acting, request.target_user_id, request.notes)
        .await?;
    Ok(Json(case))
}

/// 文档上传参数
#[derive(Debug, Deserialize)]
pub struct DocumentParams {
    pub label: Option<String>,
}

/// 上传病例文档
///
/// 先把字节落入文档存储，再向引擎登记路径并推进内容版本。
pub async fn upload_document(
    State(state): State<AppState>,
    Extension(acting): Extension<AuthUser>,
    Path(case_id): Path<Uuid>,
    Query(params): Query<DocumentParams>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let label = params.label.unwrap_or_else(|| "document".to_string());
    let stored_path = state.storage.store(&body).await?;

    let case = state
        .engine
        .attach_document(case_id, &acting, &stored_path, &label)
        .await?;

    Ok(Json(json!({
        "case": case,
        "document_path": stored_path,
    })))
}

/// 下载病例文档
pub async fn download_document(
    State(state): State<AppState>,
    Extension(acting): Extension<AuthUser>,
    Path(case_id): Path<Uuid>,
    Query(params): Query<DownloadParams>,
) -> Result<impl IntoResponse, ApiError> {
    // 访问检查由引擎完成
    state.engine.get_case(case_id, &acting).await?;

    let data = state.storage.retrieve(&params.path).await?;
    Ok(data)
}

/// 文档下载参数
#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub path: String,
}

/// 结案
pub async fn complete_case(
    State(state): State<AppState>,
    Extension(acting): Extension<AuthUser>,
    Path(case_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let case = state.engine.complete(case_id, &acting).await?;
    Ok(Json(case))
}

/// 取消请求参数
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// 取消病例
pub async fn cancel_case(
    State(state): State<AppState>,
    Extension(acting): Extension<AuthUser>,
    Path(case_id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let case = state.engine.cancel(case_id, &acting, request.reason).await?;
    Ok(Json(case))
}

/// 病例分派历史
pub async fn get_case_assignments(
    State(state): State<AppState>,
    Extension(acting): Extension<AuthUser>,
    Path(case_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let assignments = state.engine.case_assignments(case_id, &acting).await?;
    let total = assignments.len();
    Ok(Json(json!({
        "assignments": assignments,
        "total": total,
    })))
}

/// 病例审计轨迹
pub async fn get_case_audits(
    State(state): State<AppState>,
    Extension(acting): Extension<AuthUser>,
    Path(case_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let audits = state.engine.case_audits(case_id, &acting).await?;
    let total = audits.len();
    Ok(Json(json!({
        "audits": audits,
        "total": total,
    })))
}

/// 病例版本列表
pub async fn get_case_versions(
    State(state): State<AppState>,
    Extension(acting): Extension<AuthUser>,
    Path(case_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let versions = state.engine.case_versions(case_id, &acting).await?;
    let total = versions.len();
    Ok(Json(json!({
        "versions": versions,
        "total": total,
    })))
}

/// 当前用户的工作列表
pub async fn get_worklist(
    State(state): State<AppState>,
    Extension(acting): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let cases = state.engine.worklist(&acting).await?;
    let total = cases.len();
    Ok(Json(json!({
        "cases": cases,
        "total": total,
    })))
}
