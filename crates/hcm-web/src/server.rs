//! Web服务器

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use hcm_core::Result;
use hcm_storage::DocumentStorage;
use hcm_workflow::CaseWorkflowEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::auth::acting_user_middleware;
use crate::handlers::{
    api_root, assign_case, cancel_case, complete_case, create_case, download_document,
    get_case, get_case_assignments, get_case_audits, get_case_versions, get_worklist, health,
    upload_document,
};

/// 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CaseWorkflowEngine>,
    pub storage: Arc<dyn DocumentStorage>,
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState, enable_cors: bool) -> Self {
        let app = Self::create_app(state, enable_cors);
        Self { addr, app }
    }

    fn create_app(state: AppState, enable_cors: bool) -> Router {
        let api = Router::new()
            .route("/cases", post(create_case))
            .route("/cases/:id", get(get_case))
            .route("/cases/:id/assign", post(assign_case))
            .route("/cases/:id/documents", post(upload_document).get(download_document))
            .route("/cases/:id/complete", post(complete_case))
            .route("/cases/:id/cancel", post(cancel_case))
            .route("/cases/:id/assignments", get(get_case_assignments))
            .route("/cases/:id/audits", get(get_case_audits))
            .route("/cases/:id/versions", get(get_case_versions))
            .route("/worklist", get(get_worklist))
            // API路由全部要求身份三元组
            .layer(middleware::from_fn(acting_user_middleware))
            .with_state(state);

        let mut app = Router::new()
            // 根路径
            .route("/", get(api_root))
            // 健康检查
            .route("/health", get(health))
            // API路由
            .nest("/api/v1", api)
            // 全局中间件
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

        if enable_cors {
            app = app.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        app
    }

    /// 启动HTTP服务
    pub async fn serve(self) -> Result<()> {
        info!("HTTP server listening on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| hcm_core::HcmError::Internal(e.to_string()))?;

        Ok(())
    }
}
