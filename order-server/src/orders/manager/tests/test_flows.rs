use super::*;
use crate::audit::{AuditStorage, AuditWorker};

// ========================================================================
// Full lifecycle
// ========================================================================

#[test]
fn test_full_lifecycle_to_completed() {
    let manager = create_test_manager();
    create_pending(&manager, "o-1", None);

    let order = drive(
        &manager,
        "o-1",
        "w-1",
        &[
            TransitionAction::Accept,
            TransitionAction::SendToKitchen,
            TransitionAction::MarkReceived,
            TransitionAction::MarkPreparing,
            TransitionAction::MarkReady,
            TransitionAction::MarkServed,
            TransitionAction::Complete,
        ],
    );

    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.revision, 7);
    let ts = &order.timestamps;
    for slot in [
        ts.accepted_at,
        ts.sent_to_kitchen_at,
        ts.received_by_kitchen_at,
        ts.preparing_at,
        ts.ready_at,
        ts.served_at,
        ts.completed_at,
    ] {
        assert!(slot.is_some());
    }
    assert!(ts.rejected_at.is_none());
    assert!(ts.cancelled_at.is_none());
}

#[test]
fn test_each_commit_broadcasts_one_event_per_topic() {
    let manager = create_test_manager();
    let (_sub, mut rx) = subscribe_restaurant(&manager, "floor");

    create_pending(&manager, "o-1", None);
    drive(
        &manager,
        "o-1",
        "w-1",
        &[TransitionAction::Accept, TransitionAction::SendToKitchen],
    );

    let mut revisions = Vec::new();
    while let Ok(event) = rx.try_recv() {
        revisions.push((event.kind, event.revision, event.previous_state));
    }
    assert_eq!(
        revisions,
        vec![
            (OrderEventKind::Created, 0, None),
            (
                OrderEventKind::Transitioned,
                1,
                Some(OrderStatus::PendingAcceptance)
            ),
            (OrderEventKind::Transitioned, 2, Some(OrderStatus::Accepted)),
        ]
    );
}

#[test]
fn test_order_topic_isolated_from_other_orders() {
    let manager = create_test_manager();
    let (observer, mut rx) = Observer::channel("table-4", 8);
    let _sub = manager
        .registry()
        .subscribe(RESTAURANT, Topic::order(RESTAURANT, "o-2"), observer)
        .unwrap();

    create_pending(&manager, "o-1", None);
    assert!(rx.try_recv().is_err());

    create_pending(&manager, "o-2", None);
    assert_eq!(rx.try_recv().unwrap().order_id, "o-2");
}

// ========================================================================
// Escalation → reassignment → accept
// ========================================================================

#[test]
fn test_escalate_reassign_accept() {
    let manager = create_test_manager();
    create_pending(&manager, "o-1", Some("w-1"));

    let escalated = manager.escalate("o-1", 0, T0 + 6 * 60_000).unwrap();
    let (reassigned, _) = manager
        .reassign("o-1", "w-2", "mgr-1", Some(escalated.revision), T0 + 7 * 60_000)
        .unwrap();

    // Old waiter lost responsibility but accept is open to any waiter
    let accepted = transition(
        &manager,
        "o-1",
        TransitionAction::Accept,
        "w-2",
        reassigned.revision,
    )
    .unwrap();
    assert_eq!(accepted.revision, 3);
    assert_eq!(accepted.responsible_party.as_deref(), Some("w-2"));
    assert!(!accepted.escalated);
}

#[test]
fn test_reassign_after_accept_already_resolved() {
    let manager = create_test_manager();
    create_pending(&manager, "o-1", Some("w-1"));
    manager.escalate("o-1", 0, T0 + 1).unwrap();
    transition(&manager, "o-1", TransitionAction::Accept, "w-1", 1).unwrap();

    let err = manager
        .reassign("o-1", "w-2", "mgr-1", None, T0 + 2)
        .unwrap_err();
    assert!(matches!(
        err,
        ManagerError::Transition(TransitionError::AlreadyResolved {
            current: OrderStatus::Accepted
        })
    ));
}

#[test]
fn test_payment_flag_on_completed_order() {
    let manager = create_test_manager();
    create_pending(&manager, "o-1", None);
    let done = drive(
        &manager,
        "o-1",
        "w-1",
        &[
            TransitionAction::Accept,
            TransitionAction::SendToKitchen,
            TransitionAction::MarkReceived,
            TransitionAction::MarkPreparing,
            TransitionAction::MarkReady,
            TransitionAction::MarkServed,
            TransitionAction::Complete,
        ],
    );

    let paid = manager
        .set_payment_flag_at(
            PaymentFlagRequest {
                order_id: "o-1".to_string(),
                paid: true,
                actor_id: "billing".to_string(),
                expected_revision: done.revision,
            },
            T0 + 99,
        )
        .unwrap();
    assert!(paid.is_paid);
    assert_eq!(paid.status, OrderStatus::Completed);
}

// ========================================================================
// Audit side effects
// ========================================================================

#[tokio::test]
async fn test_reject_and_cancel_are_audited() {
    let audit_storage = AuditStorage::open_in_memory().unwrap();
    let (audit, rx) = AuditService::new(audit_storage.clone(), 16);

    let mut manager = create_test_manager();
    manager.set_audit_service(audit);

    create_pending(&manager, "o-1", Some("w-1"));
    create_pending(&manager, "o-2", Some("w-1"));
    create_pending(&manager, "o-3", Some("w-1"));
    transition(&manager, "o-1", TransitionAction::Reject, "w-1", 0).unwrap();
    transition(&manager, "o-2", TransitionAction::Cancel, "w-1", 0).unwrap();
    transition(&manager, "o-3", TransitionAction::Accept, "w-1", 0).unwrap();

    // Dropping the manager drops the last sender
    drop(manager);
    AuditWorker::new(audit_storage.clone())
        .run_until_cancelled(rx, tokio_util::sync::CancellationToken::new())
        .await;

    let entries = audit_storage.query_recent(10).unwrap();
    let actions: Vec<AuditAction> = entries.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::OrderCancelled, AuditAction::OrderRejected]
    );
    assert_eq!(entries[1].resource_id, "o-1");
    assert_eq!(entries[1].operator_id.as_deref(), Some("w-1"));
}
