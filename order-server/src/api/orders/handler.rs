//! Order API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use shared::order::{
    ActorRole, NewOrder, OrderSnapshot, PaymentFlagRequest, ReassignRequest, TransitionAction,
    TransitionRequest,
};
use shared::{ApiResponse, AppError, AppResult};

use crate::api::extractor::CurrentActor;
use crate::core::ServerState;
use crate::security_log;

/// Body of `POST /api/orders/{id}/transitions`
#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub action: TransitionAction,
    pub expected_revision: u64,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body of `POST /api/orders/{id}/reassign`
#[derive(Debug, Deserialize)]
pub struct ReassignBody {
    pub new_responsible_party: String,
    #[serde(default)]
    pub expected_revision: Option<u64>,
}

/// Body of `POST /api/orders/{id}/payment`
#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    pub paid: bool,
    pub expected_revision: u64,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    #[serde(default)]
    pub responsible: Option<String>,
}

/// Load an order the caller is allowed to see
fn load_scoped(state: &ServerState, actor: &CurrentActor, id: &str) -> AppResult<OrderSnapshot> {
    match state.orders.get_order(id)? {
        Some(order) if order.restaurant_id == actor.restaurant_id => Ok(order),
        Some(order) => {
            security_log!(
                "WARN",
                "cross_tenant_order_access",
                actor_id = actor.actor_id.as_str(),
                caller_restaurant = actor.restaurant_id.as_str(),
                order_restaurant = order.restaurant_id.as_str()
            );
            Err(AppError::order_not_found(id))
        }
        None => Err(AppError::order_not_found(id)),
    }
}

/// Create an order (intake collaborator)
pub async fn create(
    State(state): State<ServerState>,
    actor: CurrentActor,
    Json(payload): Json<NewOrder>,
) -> AppResult<ApiResponse<OrderSnapshot>> {
    if payload.restaurant_id != actor.restaurant_id {
        security_log!(
            "WARN",
            "cross_tenant_create",
            actor_id = actor.actor_id.as_str(),
            caller_restaurant = actor.restaurant_id.as_str()
        );
        return Err(AppError::new(shared::ErrorCode::TenantMismatch));
    }
    let order = state.orders.create_order(payload, &actor.actor_id)?;
    Ok(ApiResponse::success(order))
}

/// Get order by id
pub async fn get_by_id(
    State(state): State<ServerState>,
    actor: CurrentActor,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<OrderSnapshot>> {
    let order = load_scoped(&state, &actor, &id)?;
    Ok(ApiResponse::success(order))
}

/// Apply a lifecycle action as the calling actor
pub async fn transition(
    State(state): State<ServerState>,
    actor: CurrentActor,
    Path(id): Path<String>,
    Json(body): Json<TransitionBody>,
) -> AppResult<ApiResponse<OrderSnapshot>> {
    load_scoped(&state, &actor, &id)?;
    let order = state.orders.execute_transition(TransitionRequest {
        order_id: id,
        action: body.action,
        actor_id: actor.actor_id,
        expected_revision: body.expected_revision,
        reason: body.reason,
    })?;
    Ok(ApiResponse::success(order))
}

/// Reassign a pending order (manager only)
pub async fn reassign(
    State(state): State<ServerState>,
    actor: CurrentActor,
    Path(id): Path<String>,
    Json(body): Json<ReassignBody>,
) -> AppResult<ApiResponse<OrderSnapshot>> {
    actor.require_role(&[ActorRole::Manager])?;
    load_scoped(&state, &actor, &id)?;
    let order = state.reassign.reassign(ReassignRequest {
        order_id: id,
        new_responsible_party: body.new_responsible_party,
        manager_id: actor.actor_id,
        expected_revision: body.expected_revision,
    })?;
    Ok(ApiResponse::success(order))
}

/// Toggle the payment flag (billing)
pub async fn set_payment(
    State(state): State<ServerState>,
    actor: CurrentActor,
    Path(id): Path<String>,
    Json(body): Json<PaymentBody>,
) -> AppResult<ApiResponse<OrderSnapshot>> {
    actor.require_role(&[ActorRole::Manager, ActorRole::System])?;
    load_scoped(&state, &actor, &id)?;
    let order = state.orders.set_payment_flag(PaymentFlagRequest {
        order_id: id,
        paid: body.paid,
        actor_id: actor.actor_id,
        expected_revision: body.expected_revision,
    })?;
    Ok(ApiResponse::success(order))
}

/// Escalated orders of the caller's restaurant
pub async fn escalated(
    State(state): State<ServerState>,
    actor: CurrentActor,
) -> AppResult<ApiResponse<Vec<OrderSnapshot>>> {
    let orders = state.orders.escalated_orders(&actor.restaurant_id)?;
    Ok(ApiResponse::success(orders))
}

/// Pending orders of the caller's restaurant, optionally for one waiter
pub async fn pending(
    State(state): State<ServerState>,
    actor: CurrentActor,
    Query(query): Query<PendingQuery>,
) -> AppResult<ApiResponse<Vec<OrderSnapshot>>> {
    let orders = state
        .orders
        .pending_for(&actor.restaurant_id, query.responsible.as_deref())?;
    Ok(ApiResponse::success(orders))
}
