//! BroadcastDispatcher: 提交后事件扇出

use super::{DispatchReport, SubscriptionRegistry};
use shared::order::{OrderEvent, Topic};
use std::sync::Arc;

/// 把一个事件推送到它影响的所有 topic
///
/// 每个事件恰好影响两个 topic：`order:<id>` 和 `restaurant:<id>`。
/// 同一 observer 同时订阅两者会收到两份，客户端按 `event_id` 去重。
#[derive(Debug, Clone, Default)]
pub struct BroadcastDispatcher {
    registry: SubscriptionRegistry,
}

impl BroadcastDispatcher {
    pub fn new(registry: SubscriptionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// 分发事件（非阻塞）
    pub fn dispatch(&self, event: OrderEvent) -> DispatchReport {
        let event = Arc::new(event);
        let mut report = DispatchReport::default();
        for topic in Topic::affected_by(&event.order) {
            report += self.registry.publish(&topic, &event);
        }

        tracing::debug!(
            order_id = %event.order_id,
            kind = %event.kind,
            revision = event.revision,
            delivered = report.delivered,
            dropped = report.dropped,
            pruned = report.pruned,
            "Event dispatched"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::Observer;
    use rust_decimal::Decimal;
    use shared::order::{LineItem, NewOrder, OrderEventKind, OrderSnapshot};

    fn make_event(order_id: &str) -> OrderEvent {
        let new = NewOrder {
            order_id: None,
            restaurant_id: "r-1".to_string(),
            table_id: None,
            responsible_party: None,
            items: vec![LineItem {
                menu_item_id: "m-1".to_string(),
                name: "Churros".to_string(),
                quantity: 3,
                modifiers: vec![],
                note: None,
            }],
            subtotal: Decimal::TEN,
            tax: Decimal::ZERO,
            total: Decimal::TEN,
        };
        let order = OrderSnapshot::from_new(order_id.to_string(), new, 0);
        OrderEvent::new(OrderEventKind::Created, None, "w-1", order, 0)
    }

    #[test]
    fn dispatch_reaches_order_and_restaurant_topics() {
        let registry = SubscriptionRegistry::new();
        let dispatcher = BroadcastDispatcher::new(registry.clone());

        let (kitchen, mut kitchen_rx) = Observer::channel("kitchen", 8);
        let (table, mut table_rx) = Observer::channel("table", 8);
        let (other, mut other_rx) = Observer::channel("other", 8);
        let _k = registry
            .subscribe("r-1", Topic::restaurant("r-1"), kitchen)
            .unwrap();
        let _t = registry
            .subscribe("r-1", Topic::order("r-1", "o-1"), table)
            .unwrap();
        let _o = registry
            .subscribe("r-1", Topic::order("r-1", "o-2"), other)
            .unwrap();

        let report = dispatcher.dispatch(make_event("o-1"));
        assert_eq!(report.delivered, 2);

        assert!(kitchen_rx.try_recv().is_ok());
        assert!(table_rx.try_recv().is_ok());
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn dispatch_without_subscribers() {
        let dispatcher = BroadcastDispatcher::default();
        assert_eq!(dispatcher.dispatch(make_event("o-1")), DispatchReport::default());
    }
}
