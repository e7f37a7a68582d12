//! Audit Log API Handlers

use axum::extract::{Query, State};
use shared::order::ActorRole;
use shared::{ApiResponse, AppResult};

use crate::api::extractor::CurrentActor;
use crate::audit::{AuditChainVerification, AuditEntry};
use crate::core::ServerState;

/// 单次查询上限
const MAX_LIMIT: usize = 500;

#[derive(Debug, serde::Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /api/audit-log?limit=N: 最近 N 条审计日志 (倒序)
pub async fn list(
    State(state): State<ServerState>,
    actor: CurrentActor,
    Query(query): Query<ListQuery>,
) -> AppResult<ApiResponse<Vec<AuditEntry>>> {
    actor.require_role(&[ActorRole::Manager])?;
    let entries = state.audit.query_recent(query.limit.clamp(1, MAX_LIMIT))?;
    Ok(ApiResponse::success(entries))
}

/// GET /api/audit-log/verify: 验证审计链完整性
pub async fn verify_chain(
    State(state): State<ServerState>,
    actor: CurrentActor,
) -> AppResult<ApiResponse<AuditChainVerification>> {
    actor.require_role(&[ActorRole::Manager])?;
    let verification = state.audit.verify_chain()?;
    Ok(ApiResponse::success(verification))
}
