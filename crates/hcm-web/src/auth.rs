//! 操作者身份提取与错误映射
//!
//! 上游认证/租户中间层把解析结果写入请求头，这里组装成
//! AuthUser 注入请求扩展。对外的错误响应刻意不区分
//! "不存在"和"无权访问"，避免跨租户探测病例是否存在。

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hcm_core::{AuthUser, HcmError, Role};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

/// 身份三元组请求头
pub const HEADER_USER_ID: &str = "x-hcm-user-id";
pub const HEADER_USER_ROLE: &str = "x-hcm-user-role";
pub const HEADER_HOSPITAL_ID: &str = "x-hcm-hospital-id";

/// HTTP错误响应包装
#[derive(Debug)]
pub struct ApiError(pub HcmError);

impl From<HcmError> for ApiError {
    fn from(err: HcmError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            // 统一归并为未找到，不确认病例是否存在
            HcmError::NotFound(_) | HcmError::Forbidden(_) => (
                StatusCode::NOT_FOUND,
                "case not found or not accessible".to_string(),
            ),
            HcmError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            HcmError::Conflict(_) => (
                StatusCode::CONFLICT,
                "case was modified concurrently, retry".to_string(),
            ),
            other => {
                warn!("Internal error serving request: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn parse_acting_user(headers: &HeaderMap) -> Option<AuthUser> {
    let user_id = headers
        .get(HEADER_USER_ID)?
        .to_str()
        .ok()
        .and_then(|value| Uuid::parse_str(value).ok())?;
    let role = headers
        .get(HEADER_USER_ROLE)?
        .to_str()
        .ok()
        .and_then(Role::from_str)?;
    let hospital_id = headers
        .get(HEADER_HOSPITAL_ID)?
        .to_str()
        .ok()
        .and_then(|value| Uuid::parse_str(value).ok())?;

    Some(AuthUser {
        id: user_id,
        role,
        hospital_id,
    })
}

/// 身份注入中间件
pub async fn acting_user_middleware(mut request: Request, next: Next) -> Response {
    match parse_acting_user(request.headers()) {
        Some(acting) => {
            request.extensions_mut().insert(acting);
            next.run(request).await
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing or invalid identity headers" })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_acting_user_from_headers() {
        let user_id = Uuid::new_v4();
        let hospital_id = Uuid::new_v4();

        let mut headers = HeaderMap::new();
        headers.insert(
            HEADER_USER_ID,
            HeaderValue::from_str(&user_id.to_string()).unwrap(),
        );
        headers.insert(HEADER_USER_ROLE, HeaderValue::from_static("scientist"));
        headers.insert(
            HEADER_HOSPITAL_ID,
            HeaderValue::from_str(&hospital_id.to_string()).unwrap(),
        );

        let acting = parse_acting_user(&headers).unwrap();
        assert_eq!(acting.id, user_id);
        assert_eq!(acting.role, Role::Scientist);
        assert_eq!(acting.hospital_id, hospital_id);
    }

    #[test]
    fn test_missing_or_bad_headers_are_rejected() {
        assert!(parse_acting_user(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_USER_ID, HeaderValue::from_static("not-a-uuid"));
        headers.insert(HEADER_USER_ROLE, HeaderValue::from_static("scientist"));
        headers.insert(
            HEADER_HOSPITAL_ID,
            HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap(),
        );
        assert!(parse_acting_user(&headers).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(
            HEADER_USER_ID,
            HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap(),
        );
        headers.insert(HEADER_USER_ROLE, HeaderValue::from_static("astronaut"));
        headers.insert(
            HEADER_HOSPITAL_ID,
            HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap(),
        );
        assert!(parse_acting_user(&headers).is_none());
    }
}
