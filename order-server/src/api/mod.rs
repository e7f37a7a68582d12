//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`orders`] - 订单生命周期接口
//! - [`live`] - WebSocket 实时推送
//! - [`audit_log`] - 审计日志查询
//! - [`extractor`] - 调用方身份提取 ([`CurrentActor`])

pub mod audit_log;
pub mod extractor;
pub mod health;
pub mod live;
pub mod orders;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::ServerState;

pub use extractor::CurrentActor;

/// Build a router with all routes registered (no middleware, no state)
pub fn routes() -> Router<ServerState> {
    Router::new()
        // Health API - public route
        .merge(health::router())
        // Order lifecycle API - identity headers required
        .merge(orders::router())
        // Live push
        .merge(live::router())
        // Audit API - manager only
        .merge(audit_log::router())
}

/// Build a fully configured application with all middleware and state
pub fn build_router(state: ServerState) -> Router {
    routes()
        // CORS - Handle cross-origin requests
        .layer(CorsLayer::permissive())
        // Trace - Request tracing (logs at INFO level)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
