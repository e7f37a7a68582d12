//! OrdersManager - the concurrency controller
//!
//! Every mutation of an order goes through here:
//! - Load the current record
//! - Run the pure state machine against it
//! - Compare-and-swap the result into redb
//! - Broadcast the committed snapshot (after commit, never before)
//!
//! # Mutation Flow
//!
//! ```text
//! execute_transition(req)
//!     ├─ 1. Load record (OrderNotFound)
//!     ├─ 2. machine::attempt_transition (guards + revision check)
//!     ├─ 3. storage.compare_and_swap(next, read_revision)
//!     │       └─ RevisionConflict → ConcurrentModification
//!     ├─ 4. Dispatch OrderEvent to order/restaurant topics
//!     ├─ 5. Audit (reject / cancel only, best effort)
//!     └─ 6. Return the committed record
//! ```
//!
//! Two actors that read the same revision race at step 3; redb serializes
//! write transactions, so exactly one commits and the other gets
//! `ConcurrentModification`.

mod error;
pub use error::*;

use super::machine::{self, Transition};
use super::storage::OrderStorage;
use crate::audit::{AuditAction, AuditService};
use crate::live::{BroadcastDispatcher, SubscriptionRegistry};
use shared::order::{
    NewOrder, OrderEvent, OrderEventKind, OrderSnapshot, OrderStatus, PaymentFlagRequest,
    TransitionAction, TransitionRequest,
};
use std::path::Path;
use std::sync::Arc;

/// Actor id used for system-initiated mutations
pub const SYSTEM_ACTOR: &str = "system";

/// OrdersManager for order mutations
pub struct OrdersManager {
    storage: OrderStorage,
    dispatcher: BroadcastDispatcher,
    /// Audit trail for reject/cancel (optional, wired by ServerState)
    audit: Option<Arc<AuditService>>,
}

impl std::fmt::Debug for OrdersManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrdersManager")
            .field("storage", &"<OrderStorage>")
            .field("dispatcher", &self.dispatcher)
            .field("audit", &self.audit.is_some())
            .finish()
    }
}

impl OrdersManager {
    /// Create a new OrdersManager with the given database path
    pub fn new(db_path: impl AsRef<Path>, dispatcher: BroadcastDispatcher) -> ManagerResult<Self> {
        let storage = OrderStorage::open(db_path)?;
        tracing::info!("OrdersManager started");
        Ok(Self {
            storage,
            dispatcher,
            audit: None,
        })
    }

    /// Create an OrdersManager with existing storage and a private registry
    pub fn with_storage(storage: OrderStorage) -> Self {
        Self {
            storage,
            dispatcher: BroadcastDispatcher::default(),
            audit: None,
        }
    }

    /// Create an OrdersManager on existing storage publishing into `dispatcher`
    pub fn with_dispatcher(storage: OrderStorage, dispatcher: BroadcastDispatcher) -> Self {
        Self {
            storage,
            dispatcher,
            audit: None,
        }
    }

    /// Set the audit service for reject/cancel records
    pub fn set_audit_service(&mut self, audit: Arc<AuditService>) {
        self.audit = Some(audit);
    }

    /// Get the storage (for reads and stats)
    pub fn storage(&self) -> &OrderStorage {
        &self.storage
    }

    /// Registry the dispatcher publishes into
    pub fn registry(&self) -> &SubscriptionRegistry {
        self.dispatcher.registry()
    }

    // ========== Intake ==========

    /// Create a new order in `PENDING_ACCEPTANCE`
    pub fn create_order(&self, new: NewOrder, actor_id: &str) -> ManagerResult<OrderSnapshot> {
        self.create_order_at(new, actor_id, shared::util::now_millis())
    }

    /// [`create_order`](Self::create_order) with an explicit clock
    pub fn create_order_at(
        &self,
        new: NewOrder,
        actor_id: &str,
        now: i64,
    ) -> ManagerResult<OrderSnapshot> {
        new.validate().map_err(ManagerError::Validation)?;

        let order_id = new
            .order_id
            .as_deref()
            .map(|id| id.trim().to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let order = OrderSnapshot::from_new(order_id, new, now);

        self.storage
            .insert_new(&order)
            .map_err(ManagerError::from_storage)?;

        tracing::info!(
            order_id = %order.order_id,
            restaurant_id = %order.restaurant_id,
            responsible_party = ?order.responsible_party,
            items = order.items.len(),
            "Order created"
        );

        self.dispatcher.dispatch(OrderEvent::new(
            OrderEventKind::Created,
            None,
            actor_id,
            order.clone(),
            now,
        ));
        Ok(order)
    }

    // ========== Lifecycle ==========

    /// Apply a lifecycle action (accept, reject, sendToKitchen, ...)
    pub fn execute_transition(&self, req: TransitionRequest) -> ManagerResult<OrderSnapshot> {
        self.execute_transition_at(req, shared::util::now_millis())
    }

    /// [`execute_transition`](Self::execute_transition) with an explicit clock
    pub fn execute_transition_at(
        &self,
        req: TransitionRequest,
        now: i64,
    ) -> ManagerResult<OrderSnapshot> {
        let current = self.load(&req.order_id)?;

        let Transition {
            order,
            previous_state,
            new_state,
            actor,
        } = machine::attempt_transition(
            &current,
            req.action,
            &req.actor_id,
            req.expected_revision,
            req.reason.as_deref(),
            now,
        )
        .inspect_err(|e| {
            tracing::debug!(
                order_id = %req.order_id,
                action = %req.action,
                actor_id = %req.actor_id,
                error = %e,
                "Transition refused"
            );
        })?;

        self.commit(
            &order,
            current.revision,
            OrderEventKind::Transitioned,
            Some(previous_state),
            &actor,
            now,
        )?;

        tracing::info!(
            order_id = %order.order_id,
            action = %req.action,
            from = %previous_state,
            to = %new_state,
            revision = order.revision,
            actor_id = %actor,
            "Order transitioned"
        );

        if let Some(action) = audit_action_for(req.action) {
            self.audit(
                action,
                &order,
                &actor,
                serde_json::json!({
                    "previous_state": previous_state,
                    "responsible_party": current.responsible_party,
                    "reason": order.rejection_reason,
                }),
            );
        }

        Ok(order)
    }

    /// Flag a stale pending order for manager attention
    ///
    /// `expected_revision` is the revision the escalation scan saw; any
    /// mutation since then makes this a lost race instead of an escalation.
    pub fn escalate(
        &self,
        order_id: &str,
        expected_revision: u64,
        now: i64,
    ) -> ManagerResult<OrderSnapshot> {
        let current = self.load(order_id)?;
        let order = machine::apply_escalation(&current, expected_revision, now)?;

        self.commit(
            &order,
            current.revision,
            OrderEventKind::Escalated,
            Some(current.status),
            SYSTEM_ACTOR,
            now,
        )?;

        tracing::info!(
            order_id = %order.order_id,
            restaurant_id = %order.restaurant_id,
            revision = order.revision,
            "Order escalated"
        );
        Ok(order)
    }

    /// Hand a pending order to another waiter
    ///
    /// Returns the committed record and the previous responsible party.
    /// Without `expected_revision` the revision read here is used, so only
    /// writes racing inside this call are detected.
    pub fn reassign(
        &self,
        order_id: &str,
        new_responsible_party: &str,
        actor_id: &str,
        expected_revision: Option<u64>,
        now: i64,
    ) -> ManagerResult<(OrderSnapshot, Option<String>)> {
        let current = self.load(order_id)?;
        let expected = expected_revision.unwrap_or(current.revision);
        let order = machine::apply_reassignment(&current, new_responsible_party, expected, now)?;

        self.commit(
            &order,
            current.revision,
            OrderEventKind::Reassigned,
            Some(current.status),
            actor_id,
            now,
        )?;

        tracing::info!(
            order_id = %order.order_id,
            previous_party = ?current.responsible_party,
            new_party = ?order.responsible_party,
            revision = order.revision,
            actor_id = %actor_id,
            "Order reassigned"
        );
        Ok((order, current.responsible_party))
    }

    // ========== Billing ==========

    /// Toggle the payment flag (billing hook)
    pub fn set_payment_flag(&self, req: PaymentFlagRequest) -> ManagerResult<OrderSnapshot> {
        self.set_payment_flag_at(req, shared::util::now_millis())
    }

    /// [`set_payment_flag`](Self::set_payment_flag) with an explicit clock
    pub fn set_payment_flag_at(
        &self,
        req: PaymentFlagRequest,
        now: i64,
    ) -> ManagerResult<OrderSnapshot> {
        let current = self.load(&req.order_id)?;
        let order = machine::apply_payment_flag(&current, req.paid, req.expected_revision, now)?;

        self.commit(
            &order,
            current.revision,
            OrderEventKind::PaymentUpdated,
            Some(current.status),
            &req.actor_id,
            now,
        )?;

        tracing::info!(
            order_id = %order.order_id,
            paid = order.is_paid,
            revision = order.revision,
            "Payment flag updated"
        );
        Ok(order)
    }

    // ========== Reads ==========

    /// Get an order by id
    pub fn get_order(&self, order_id: &str) -> ManagerResult<Option<OrderSnapshot>> {
        Ok(self.storage.get(order_id)?)
    }

    /// Escalated orders of a restaurant (manager view)
    pub fn escalated_orders(&self, restaurant_id: &str) -> ManagerResult<Vec<OrderSnapshot>> {
        Ok(self.storage.escalated(restaurant_id)?)
    }

    /// Pending orders of a restaurant, optionally for one waiter
    pub fn pending_for(
        &self,
        restaurant_id: &str,
        responsible_party: Option<&str>,
    ) -> ManagerResult<Vec<OrderSnapshot>> {
        Ok(self.storage.pending_for(restaurant_id, responsible_party)?)
    }

    /// Pending, un-escalated orders created at or before `cutoff`
    pub fn find_stale_pending(&self, cutoff: i64) -> ManagerResult<Vec<OrderSnapshot>> {
        Ok(self.storage.find_stale_pending(cutoff)?)
    }

    // ========== Internals ==========

    fn load(&self, order_id: &str) -> ManagerResult<OrderSnapshot> {
        self.storage
            .get(order_id)?
            .ok_or_else(|| ManagerError::OrderNotFound(order_id.to_string()))
    }

    /// Compare-and-swap `order` in, then broadcast it
    fn commit(
        &self,
        order: &OrderSnapshot,
        read_revision: u64,
        kind: OrderEventKind,
        previous_state: Option<OrderStatus>,
        actor_id: &str,
        now: i64,
    ) -> ManagerResult<()> {
        self.storage
            .compare_and_swap(order, read_revision)
            .map_err(ManagerError::from_storage)?;

        self.dispatcher.dispatch(OrderEvent::new(
            kind,
            previous_state,
            actor_id,
            order.clone(),
            now,
        ));
        Ok(())
    }

    fn audit(
        &self,
        action: AuditAction,
        order: &OrderSnapshot,
        actor_id: &str,
        details: serde_json::Value,
    ) {
        if let Some(audit) = &self.audit {
            audit.log(
                action,
                "order",
                order.order_id.clone(),
                Some(actor_id.to_string()),
                details,
            );
        }
    }
}

fn audit_action_for(action: TransitionAction) -> Option<AuditAction> {
    match action {
        TransitionAction::Reject => Some(AuditAction::OrderRejected),
        TransitionAction::Cancel => Some(AuditAction::OrderCancelled),
        _ => None,
    }
}

#[cfg(test)]
mod tests;
