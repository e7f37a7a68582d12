use super::*;
use std::sync::Barrier;
use std::thread;

/// N waiters accept the same pending order at the same instant
#[test]
fn test_concurrent_accept_exactly_one_wins() {
    const WAITERS: usize = 8;

    let manager = Arc::new(create_test_manager());
    create_pending(&manager, "o-1", None);
    let (_sub, mut rx) = subscribe_restaurant(&manager, "floor");
    // Drop the CREATED event
    let _ = rx.try_recv();

    let barrier = Arc::new(Barrier::new(WAITERS));
    let handles: Vec<_> = (0..WAITERS)
        .map(|i| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                transition(&manager, "o-1", TransitionAction::Accept, &format!("w-{i}"), 0)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners: Vec<&OrderSnapshot> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);

    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        // Lost at the store (same revision read) or at the guard (read after commit)
        assert!(
            matches!(
                err,
                ManagerError::Transition(
                    TransitionError::ConcurrentModification { .. }
                        | TransitionError::AlreadyResolved { .. }
                )
            ),
            "unexpected error: {err}"
        );
    }

    let stored = manager.get_order("o-1").unwrap().unwrap();
    assert_eq!(stored.revision, 1);
    assert_eq!(stored.responsible_party, winners[0].responsible_party);

    // Exactly one TRANSITIONED event
    assert_eq!(rx.try_recv().unwrap().revision, 1);
    assert!(rx.try_recv().is_err());
}

/// Waiter accepts while the monitor escalates; both read revision 0
#[test]
fn test_accept_races_escalation() {
    for _ in 0..20 {
        let manager = Arc::new(create_test_manager());
        create_pending(&manager, "o-1", Some("w-1"));

        let barrier = Arc::new(Barrier::new(2));
        let accept = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                transition(&manager, "o-1", TransitionAction::Accept, "w-1", 0)
            })
        };
        let escalate = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.escalate("o-1", 0, T0 + 400_000)
            })
        };

        let accepted = accept.join().unwrap();
        let escalated = escalate.join().unwrap();
        assert!(accepted.is_ok() != escalated.is_ok(), "exactly one must win");

        let stored = manager.get_order("o-1").unwrap().unwrap();
        assert_eq!(stored.revision, 1);
        if accepted.is_ok() {
            assert_eq!(stored.status, OrderStatus::Accepted);
            assert!(!stored.escalated);
            assert!(escalated.unwrap_err().is_lost_race());
        } else {
            assert!(stored.escalated);
            assert_eq!(stored.status, OrderStatus::PendingAcceptance);
        }
    }
}

/// Parallel writers on different orders never interfere
#[test]
fn test_independent_orders_commit_in_parallel() {
    let manager = Arc::new(create_test_manager());
    for i in 0..16 {
        create_pending(&manager, &format!("o-{i}"), None);
    }

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let id = format!("o-{i}");
                drive(
                    &manager,
                    &id,
                    "w-1",
                    &[TransitionAction::Accept, TransitionAction::SendToKitchen],
                )
            })
        })
        .collect();

    for handle in handles {
        let order = handle.join().unwrap();
        assert_eq!(order.status, OrderStatus::SentToKitchen);
        assert_eq!(order.revision, 2);
    }
    assert!(manager.pending_for(RESTAURANT, None).unwrap().is_empty());
}
