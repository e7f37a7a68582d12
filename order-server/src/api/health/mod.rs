//! 健康检查路由
//!
//! # 路由列表
//!
//! | 路径 | 方法 | 说明 | 认证 |
//! |------|------|------|------|
//! | /health | GET | 简单健康检查 | 无 |
//! | /health/detailed | GET | 详细健康检查 (存储、审计、订阅) | 无 |

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::time::SystemTime;

use crate::core::ServerState;

/// 健康检查路由 - 公共路由 (无需认证)
pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(detailed_health))
}

/// 简单健康检查响应
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// 详细健康检查响应
#[derive(Serialize)]
pub struct DetailedHealthResponse {
    status: &'static str,
    version: &'static str,
    /// 运行时间 (秒)
    uptime_seconds: u64,
    checks: HealthChecks,
    /// 当前活跃的实时 topic 数
    live_topics: usize,
}

/// 健康检查详情
#[derive(Serialize)]
pub struct HealthChecks {
    orders: CheckResult,
    audit: CheckResult,
}

/// 单项检查结果
#[derive(Serialize)]
pub struct CheckResult {
    /// 状态 (ok | error)
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(latency_ms: u64, data: serde_json::Value) -> Self {
        Self {
            status: "ok",
            latency_ms: Some(latency_ms),
            message: None,
            data: Some(data),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            latency_ms: None,
            message: Some(message.into()),
            data: None,
        }
    }
}

// 服务器启动时间 (懒加载静态变量)
static START_TIME: std::sync::OnceLock<SystemTime> = std::sync::OnceLock::new();

fn get_uptime_seconds() -> u64 {
    let start = START_TIME.get_or_init(SystemTime::now);
    SystemTime::now()
        .duration_since(*start)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// 基础健康检查
pub async fn health() -> Json<HealthResponse> {
    // 首次调用时记下启动时间
    let _ = get_uptime_seconds();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// 包含组件状态的详细健康检查
pub async fn detailed_health(State(state): State<ServerState>) -> Json<DetailedHealthResponse> {
    let started = std::time::Instant::now();
    let orders_check = match state.orders.storage().get_stats() {
        Ok(stats) => CheckResult::ok(
            started.elapsed().as_millis() as u64,
            serde_json::json!({
                "order_count": stats.order_count,
                "pending_count": stats.pending_count,
                "escalated_count": stats.escalated_count,
            }),
        ),
        Err(e) => CheckResult::error(format!("Order store error: {}", e)),
    };

    // 公共接口只读条数，完整链验证走 /api/audit-log/verify
    let started = std::time::Instant::now();
    let audit_check = match state.audit.count() {
        Ok(total) => CheckResult::ok(
            started.elapsed().as_millis() as u64,
            serde_json::json!({ "total_entries": total }),
        ),
        Err(e) => CheckResult::error(format!("Audit store error: {}", e)),
    };

    let all_ok = orders_check.status == "ok" && audit_check.status == "ok";

    Json(DetailedHealthResponse {
        status: if all_ok { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: get_uptime_seconds(),
        checks: HealthChecks {
            orders: orders_check,
            audit: audit_check,
        },
        live_topics: state.registry.topic_count(),
    })
}
