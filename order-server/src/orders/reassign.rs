//! Reassignment coordinator
//!
//! Manager-invoked handover of a pending order to another waiter. The
//! mutation itself goes through [`OrdersManager::reassign`] so it races
//! under the same revision check as any other write; this layer adds the
//! audit record. Role checks happen at the request boundary.

use std::sync::Arc;

use shared::order::{OrderSnapshot, ReassignRequest};

use super::manager::{ManagerResult, OrdersManager};
use crate::audit::{AuditAction, AuditService};

pub struct ReassignmentCoordinator {
    manager: Arc<OrdersManager>,
    audit: Option<Arc<AuditService>>,
}

impl ReassignmentCoordinator {
    pub fn new(manager: Arc<OrdersManager>, audit: Option<Arc<AuditService>>) -> Self {
        Self { manager, audit }
    }

    pub fn reassign(&self, req: ReassignRequest) -> ManagerResult<OrderSnapshot> {
        self.reassign_at(req, shared::util::now_millis())
    }

    /// [`reassign`](Self::reassign) with an explicit clock
    pub fn reassign_at(&self, req: ReassignRequest, now: i64) -> ManagerResult<OrderSnapshot> {
        let new_party = req.new_responsible_party.trim();
        let (order, previous_party) = self.manager.reassign(
            &req.order_id,
            new_party,
            &req.manager_id,
            req.expected_revision,
            now,
        )?;

        if let Some(audit) = &self.audit {
            audit.log(
                AuditAction::OrderReassigned,
                "order",
                order.order_id.clone(),
                Some(req.manager_id.clone()),
                serde_json::json!({
                    "previous_party": previous_party,
                    "new_party": order.responsible_party,
                    "manager": req.manager_id,
                }),
            );
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditStorage;
    use crate::orders::machine::TransitionError;
    use crate::orders::{ManagerError, OrderStorage};
    use rust_decimal::Decimal;
    use shared::order::{LineItem, NewOrder, OrderEventKind, Topic};

    const T0: i64 = 1_700_000_000_000;

    fn manager() -> Arc<OrdersManager> {
        Arc::new(OrdersManager::with_storage(
            OrderStorage::open_in_memory().unwrap(),
        ))
    }

    fn create(manager: &OrdersManager, order_id: &str, responsible: Option<&str>) {
        let new = NewOrder {
            order_id: Some(order_id.to_string()),
            restaurant_id: "r-1".to_string(),
            table_id: Some("T2".to_string()),
            responsible_party: responsible.map(str::to_string),
            items: vec![LineItem {
                menu_item_id: "m-9".to_string(),
                name: "Gazpacho".to_string(),
                quantity: 2,
                modifiers: vec![],
                note: None,
            }],
            subtotal: Decimal::new(900, 2),
            tax: Decimal::new(90, 2),
            total: Decimal::new(990, 2),
        };
        manager.create_order_at(new, "intake", T0).unwrap();
    }

    fn request(order_id: &str, party: &str, expected_revision: Option<u64>) -> ReassignRequest {
        ReassignRequest {
            order_id: order_id.to_string(),
            new_responsible_party: party.to_string(),
            manager_id: "mgr-1".to_string(),
            expected_revision,
        }
    }

    #[test]
    fn reassign_clears_escalation_and_bumps_revision_once() {
        let manager = manager();
        create(&manager, "o-1", Some("w-1"));
        manager.escalate("o-1", 0, T0 + 360_000).unwrap();

        let coordinator = ReassignmentCoordinator::new(manager.clone(), None);
        let order = coordinator
            .reassign_at(request("o-1", "w-2", Some(1)), T0 + 400_000)
            .unwrap();

        assert_eq!(order.responsible_party.as_deref(), Some("w-2"));
        assert!(!order.escalated);
        assert_eq!(order.escalated_at, None);
        assert_eq!(order.revision, 2);
        assert_eq!(order.updated_at, T0 + 400_000);
    }

    #[test]
    fn unassigned_pending_order_can_be_reassigned() {
        let manager = manager();
        create(&manager, "o-1", None);

        let coordinator = ReassignmentCoordinator::new(manager, None);
        let order = coordinator
            .reassign_at(request("o-1", "  w-3 ", None), T0 + 1)
            .unwrap();
        assert_eq!(order.responsible_party.as_deref(), Some("w-3"));
        assert_eq!(order.revision, 1);
    }

    #[test]
    fn stale_revision_loses() {
        let manager = manager();
        create(&manager, "o-1", Some("w-1"));
        manager.escalate("o-1", 0, T0 + 1).unwrap();

        let coordinator = ReassignmentCoordinator::new(manager, None);
        let err = coordinator
            .reassign_at(request("o-1", "w-2", Some(0)), T0 + 2)
            .unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Transition(TransitionError::ConcurrentModification {
                expected: 0,
                actual: 1
            })
        ));
    }

    #[test]
    fn reassign_broadcasts_like_a_transition() {
        let manager = manager();
        create(&manager, "o-1", None);
        let (observer, mut rx) = crate::live::Observer::channel("mgr-dash", 8);
        let _sub = manager
            .registry()
            .subscribe("r-1", Topic::order("r-1", "o-1"), observer)
            .unwrap();

        ReassignmentCoordinator::new(manager, None)
            .reassign_at(request("o-1", "w-2", None), T0 + 5)
            .unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, OrderEventKind::Reassigned);
        assert_eq!(event.actor, "mgr-1");
        assert_eq!(event.previous_state, Some(event.new_state));
        assert_eq!(event.order.responsible_party.as_deref(), Some("w-2"));
    }

    #[tokio::test]
    async fn reassignment_is_audited() {
        let (audit, mut rx) = AuditService::new(AuditStorage::open_in_memory().unwrap(), 8);
        let manager = manager();
        create(&manager, "o-1", Some("w-1"));
        manager.escalate("o-1", 0, T0 + 1).unwrap();

        ReassignmentCoordinator::new(manager, Some(audit))
            .reassign_at(request("o-1", "w-2", None), T0 + 2)
            .unwrap();

        let req = rx.try_recv().unwrap();
        assert_eq!(req.action, AuditAction::OrderReassigned);
        assert_eq!(req.operator_id.as_deref(), Some("mgr-1"));
        assert_eq!(req.details["previous_party"], "w-1");
        assert_eq!(req.details["new_party"], "w-2");
    }

    #[test]
    fn failed_reassignment_is_not_audited() {
        let (audit, mut rx) = AuditService::new(AuditStorage::open_in_memory().unwrap(), 8);
        let manager = manager();
        create(&manager, "o-1", Some("w-1"));

        let err = ReassignmentCoordinator::new(manager, Some(audit))
            .reassign_at(request("o-1", "w-2", None), T0 + 2)
            .unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Transition(TransitionError::InvalidTransition { .. })
        ));
        assert!(rx.try_recv().is_err());
    }
}
