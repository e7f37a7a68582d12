use super::*;
use crate::live::{EventReceiver, Observer, Subscription};
use crate::orders::machine::TransitionError;
use rust_decimal::Decimal;
use shared::order::{LineItem, Topic};

const T0: i64 = 1_700_000_000_000;
const RESTAURANT: &str = "r-1";

fn create_test_manager() -> OrdersManager {
    let storage = OrderStorage::open_in_memory().unwrap();
    OrdersManager::with_storage(storage)
}

fn new_order(order_id: &str, responsible: Option<&str>) -> NewOrder {
    NewOrder {
        order_id: Some(order_id.to_string()),
        restaurant_id: RESTAURANT.to_string(),
        table_id: Some("T4".to_string()),
        responsible_party: responsible.map(str::to_string),
        items: vec![
            simple_item("m-1", "Patatas bravas", 2),
            simple_item("m-2", "Caña", 3),
        ],
        subtotal: Decimal::new(1450, 2),
        tax: Decimal::new(145, 2),
        total: Decimal::new(1595, 2),
    }
}

fn simple_item(menu_item_id: &str, name: &str, quantity: u32) -> LineItem {
    LineItem {
        menu_item_id: menu_item_id.to_string(),
        name: name.to_string(),
        quantity,
        modifiers: vec![],
        note: None,
    }
}

// ========================================================================
// Helper: create an order and drive it through actions
// ========================================================================

fn create_pending(
    manager: &OrdersManager,
    order_id: &str,
    responsible: Option<&str>,
) -> OrderSnapshot {
    manager
        .create_order_at(new_order(order_id, responsible), "intake", T0)
        .expect("Failed to create order")
}

fn transition(
    manager: &OrdersManager,
    order_id: &str,
    action: TransitionAction,
    actor: &str,
    expected_revision: u64,
) -> ManagerResult<OrderSnapshot> {
    manager.execute_transition_at(
        TransitionRequest {
            order_id: order_id.to_string(),
            action,
            actor_id: actor.to_string(),
            expected_revision,
            reason: None,
        },
        T0 + 1_000,
    )
}

/// Apply `actions` in order, each against the latest revision
fn drive(
    manager: &OrdersManager,
    order_id: &str,
    actor: &str,
    actions: &[TransitionAction],
) -> OrderSnapshot {
    let mut order = manager.get_order(order_id).unwrap().unwrap();
    for action in actions {
        order = transition(manager, order_id, *action, actor, order.revision)
            .unwrap_or_else(|e| panic!("{action} failed: {e}"));
    }
    order
}

fn subscribe_restaurant(manager: &OrdersManager, id: &str) -> (Subscription, EventReceiver) {
    let (observer, rx) = Observer::channel(id, 64);
    let sub = manager
        .registry()
        .subscribe(RESTAURANT, Topic::restaurant(RESTAURANT), observer)
        .unwrap();
    (sub, rx)
}

mod test_flows;
mod test_race;
