//! 订单实时推送：topic 订阅注册表 + 广播分发
//!
//! 每次提交成功后，OrdersManager 通过 [`BroadcastDispatcher`] 把
//! `OrderEvent` 推送给订阅了相关 topic 的 observer。
//! 所有订阅按 restaurant (tenant) 严格隔离。
//!
//! ```text
//! OrdersManager::commit
//!       │ Arc<OrderEvent>
//!       ▼
//! BroadcastDispatcher
//!   ├── order:<id>          ─┐
//!   └── restaurant:<id>     ─┤  SubscriptionRegistry
//!                            │    topic → (observer_id → Observer)
//!                            ▼
//!                 mpsc::Sender (每个 observer 独立队列)
//!                            │ try_send：满 → 丢弃，关闭 → 清理
//!                            ▼
//!                   WS session / 测试接收端
//! ```
//!
//! 分发从不阻塞写路径：慢 observer 只会丢自己的事件，
//! 客户端可通过 `GET /api/orders/{id}` 按 revision 追平。

pub mod dispatcher;

pub use dispatcher::BroadcastDispatcher;

use dashmap::DashMap;
use shared::error::AppError;
use shared::order::{OrderEvent, Topic};
use std::collections::HashMap;
use std::ops::AddAssign;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Observer 队列默认容量
pub const DEFAULT_OBSERVER_CAPACITY: usize = 64;

/// 事件接收端
pub type EventReceiver = mpsc::Receiver<Arc<OrderEvent>>;

/// 一个已连接的接收方（WS session 等）
#[derive(Debug, Clone)]
pub struct Observer {
    id: String,
    tx: mpsc::Sender<Arc<OrderEvent>>,
}

impl Observer {
    pub fn new(id: impl Into<String>, tx: mpsc::Sender<Arc<OrderEvent>>) -> Self {
        Self { id: id.into(), tx }
    }

    /// 创建 observer 及其有界接收队列
    pub fn channel(id: impl Into<String>, capacity: usize) -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(id, tx), rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// 单次分发统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// 成功入队
    pub delivered: usize,
    /// 队列已满，事件丢弃
    pub dropped: usize,
    /// 接收端已关闭，observer 被移除
    pub pruned: usize,
}

impl AddAssign for DispatchReport {
    fn add_assign(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.dropped += other.dropped;
        self.pruned += other.pruned;
    }
}

/// 注册表中的一条订阅
struct Entry {
    /// 每次 subscribe 唯一，旧句柄 drop 时不会误删新订阅
    token: u64,
    observer: Observer,
}

type TopicMap = DashMap<Topic, HashMap<String, Entry>>;

/// Topic 订阅注册表
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    /// topic → (observer_id → Entry)
    topics: Arc<TopicMap>,
    next_token: Arc<AtomicU64>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.topics.len())
            .finish()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅 topic
    ///
    /// 调用方只能订阅自己 restaurant 的 topic，跨 tenant 返回 `PermissionDenied`。
    /// 同一 observer 重复订阅同一 topic 是幂等的：只保留一条，队列替换为最新的。
    pub fn subscribe(
        &self,
        caller_restaurant: &str,
        topic: Topic,
        observer: Observer,
    ) -> Result<Subscription, AppError> {
        if topic.restaurant_id() != caller_restaurant {
            crate::security_log!(
                "WARN",
                "cross_tenant_subscribe",
                caller_restaurant = caller_restaurant,
                topic = topic.to_string(),
                observer_id = observer.id()
            );
            return Err(
                AppError::permission_denied("Cannot subscribe to another restaurant")
                    .with_detail("topic", topic.to_string()),
            );
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let observer_id = observer.id.clone();
        self.topics
            .entry(topic.clone())
            .or_default()
            .insert(observer_id.clone(), Entry { token, observer });

        tracing::debug!(topic = %topic, observer_id = %observer_id, "Observer subscribed");
        Ok(Subscription {
            topics: Arc::downgrade(&self.topics),
            topic,
            observer_id,
            token,
        })
    }

    /// 推送事件给 topic 的所有 observer
    ///
    /// 事件所属订单不在 topic 范围内时不投递（防止跨 tenant 泄漏）。
    pub fn publish(&self, topic: &Topic, event: &Arc<OrderEvent>) -> DispatchReport {
        let mut report = DispatchReport::default();
        if !topic.admits(&event.order) {
            tracing::warn!(
                topic = %topic,
                order_id = %event.order_id,
                "Event does not belong to topic, skipped"
            );
            return report;
        }

        // 先复制 sender，释放分片锁后再投递
        let targets: Vec<(String, u64, mpsc::Sender<Arc<OrderEvent>>)> =
            match self.topics.get(topic) {
                Some(observers) => observers
                    .iter()
                    .map(|(id, e)| (id.clone(), e.token, e.observer.tx.clone()))
                    .collect(),
                None => return report,
            };

        let mut closed = Vec::new();
        for (observer_id, token, tx) in targets {
            match tx.try_send(Arc::clone(event)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    tracing::warn!(
                        topic = %topic,
                        observer_id = %observer_id,
                        order_id = %event.order_id,
                        revision = event.revision,
                        "Observer queue full, event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push((observer_id, token)),
            }
        }

        for (observer_id, token) in closed {
            if remove_entry(&self.topics, topic, &observer_id, token) {
                report.pruned += 1;
                tracing::debug!(topic = %topic, observer_id = %observer_id, "Closed observer pruned");
            }
        }

        report
    }

    /// 当前有订阅者的 topic 数量
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// topic 下的 observer 数量
    pub fn observer_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map(|o| o.len()).unwrap_or(0)
    }
}

/// 移除一条订阅，topic 为空时一并清理
fn remove_entry(topics: &TopicMap, topic: &Topic, observer_id: &str, token: u64) -> bool {
    let mut removed = false;
    if let Some(mut observers) = topics.get_mut(topic) {
        if observers.get(observer_id).is_some_and(|e| e.token == token) {
            observers.remove(observer_id);
            removed = true;
        }
    }
    topics.remove_if(topic, |_, observers| observers.is_empty());
    removed
}

/// 订阅句柄，drop 时自动退订
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    topics: std::sync::Weak<TopicMap>,
    topic: Topic,
    observer_id: String,
    token: u64,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn observer_id(&self) -> &str {
        &self.observer_id
    }

    /// 显式退订
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(topics) = self.topics.upgrade() {
            remove_entry(&topics, &self.topic, &self.observer_id, self.token);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("observer_id", &self.observer_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::order::{LineItem, NewOrder, OrderEventKind, OrderSnapshot};

    fn make_event(restaurant_id: &str, order_id: &str) -> Arc<OrderEvent> {
        let new = NewOrder {
            order_id: None,
            restaurant_id: restaurant_id.to_string(),
            table_id: None,
            responsible_party: None,
            items: vec![LineItem {
                menu_item_id: "m-1".to_string(),
                name: "Flan".to_string(),
                quantity: 1,
                modifiers: vec![],
                note: None,
            }],
            subtotal: Decimal::ONE,
            tax: Decimal::ZERO,
            total: Decimal::ONE,
        };
        let order = OrderSnapshot::from_new(order_id.to_string(), new, 1_000);
        Arc::new(OrderEvent::new(OrderEventKind::Created, None, "w-1", order, 1_000))
    }

    #[tokio::test]
    async fn publish_delivers_to_subscribers() {
        let registry = SubscriptionRegistry::new();
        let (observer, mut rx) = Observer::channel("obs-1", 8);
        let _sub = registry
            .subscribe("r-1", Topic::restaurant("r-1"), observer)
            .unwrap();

        let event = make_event("r-1", "o-1");
        let report = registry.publish(&Topic::restaurant("r-1"), &event);
        assert_eq!(report.delivered, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.order_id, "o-1");
    }

    #[test]
    fn cross_tenant_subscribe_denied() {
        let registry = SubscriptionRegistry::new();
        let (observer, _rx) = Observer::channel("obs-1", 8);
        let err = registry
            .subscribe("r-1", Topic::restaurant("r-2"), observer)
            .unwrap_err();
        assert_eq!(err.code, shared::ErrorCode::PermissionDenied);
        assert_eq!(registry.topic_count(), 0);
    }

    #[test]
    fn publish_skips_foreign_orders() {
        let registry = SubscriptionRegistry::new();
        let (observer, mut rx) = Observer::channel("obs-1", 8);
        let _sub = registry
            .subscribe("r-1", Topic::restaurant("r-1"), observer)
            .unwrap();

        let report = registry.publish(&Topic::restaurant("r-1"), &make_event("r-2", "o-1"));
        assert_eq!(report, DispatchReport::default());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn drop_unsubscribes_and_cleans_topic() {
        let registry = SubscriptionRegistry::new();
        let topic = Topic::order("r-1", "o-1");
        let (observer, _rx) = Observer::channel("obs-1", 8);
        let sub = registry.subscribe("r-1", topic.clone(), observer).unwrap();
        assert_eq!(registry.observer_count(&topic), 1);

        sub.unsubscribe();
        assert_eq!(registry.observer_count(&topic), 0);
        assert_eq!(registry.topic_count(), 0);
    }

    #[test]
    fn resubscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let topic = Topic::restaurant("r-1");
        let (first, _rx1) = Observer::channel("obs-1", 8);
        let (second, mut rx2) = Observer::channel("obs-1", 8);

        let old = registry.subscribe("r-1", topic.clone(), first).unwrap();
        let _new = registry.subscribe("r-1", topic.clone(), second).unwrap();
        assert_eq!(registry.observer_count(&topic), 1);

        // Old handle is inert
        drop(old);
        assert_eq!(registry.observer_count(&topic), 1);

        registry.publish(&topic, &make_event("r-1", "o-1"));
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let registry = SubscriptionRegistry::new();
        let topic = Topic::restaurant("r-1");
        let (slow, _slow_rx) = Observer::channel("slow", 1);
        let (fast, mut fast_rx) = Observer::channel("fast", 8);
        let _a = registry.subscribe("r-1", topic.clone(), slow).unwrap();
        let _b = registry.subscribe("r-1", topic.clone(), fast).unwrap();

        let first = registry.publish(&topic, &make_event("r-1", "o-1"));
        assert_eq!(first.delivered, 2);

        let second = registry.publish(&topic, &make_event("r-1", "o-2"));
        assert_eq!(second.delivered, 1);
        assert_eq!(second.dropped, 1);

        assert_eq!(fast_rx.try_recv().unwrap().order_id, "o-1");
        assert_eq!(fast_rx.try_recv().unwrap().order_id, "o-2");
    }

    #[test]
    fn closed_receiver_is_pruned() {
        let registry = SubscriptionRegistry::new();
        let topic = Topic::restaurant("r-1");
        let (observer, rx) = Observer::channel("gone", 8);
        let _sub = registry.subscribe("r-1", topic.clone(), observer).unwrap();
        drop(rx);

        let report = registry.publish(&topic, &make_event("r-1", "o-1"));
        assert_eq!(report.pruned, 1);
        assert_eq!(registry.topic_count(), 0);
    }
}
