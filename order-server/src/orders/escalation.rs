//! 超时升级监控
//!
//! 周期扫描长时间未被接单的订单，标记为 escalated 并推送给经理视图。
//!
//! ```text
//! interval tick
//!   └─ sweep_at(now)
//!        ├─ find_stale_pending(now - threshold)   最旧的优先
//!        ├─ 逐单 OrdersManager::escalate (独立事务 + 乐观锁)
//!        │     ├─ Ok          → 审计 order_escalated
//!        │     ├─ lost race   → 已被接单/改动，跳过
//!        │     └─ 其他错误     → 记录日志，继续下一单
//!        └─ 超出时间预算或单次上限 → 留到下一轮
//! ```
//!
//! 注册为 `TaskKind::Periodic`，收到 shutdown 信号后退出。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::manager::{OrdersManager, SYSTEM_ACTOR};
use crate::audit::{AuditAction, AuditService};

/// 升级监控配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationConfig {
    /// 扫描间隔
    pub interval: Duration,
    /// 未接单超过此时长即升级
    pub threshold: Duration,
    /// 单轮扫描时间预算
    pub sweep_budget: Duration,
    /// 单轮最多处理的订单数
    pub max_per_sweep: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            threshold: Duration::from_secs(300),
            sweep_budget: Duration::from_secs(10),
            max_per_sweep: 500,
        }
    }
}

/// 单轮扫描结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// 命中超时条件的订单数
    pub matched: usize,
    /// 成功升级
    pub escalated: usize,
    /// 扫描后被其他操作抢先改动
    pub lost_race: usize,
    /// 存储等错误
    pub failed: usize,
    /// 超出预算/上限，留到下一轮
    pub deferred: usize,
}

/// 超时升级监控
pub struct EscalationMonitor {
    manager: Arc<OrdersManager>,
    audit: Option<Arc<AuditService>>,
    config: EscalationConfig,
    shutdown: CancellationToken,
}

impl EscalationMonitor {
    pub fn new(
        manager: Arc<OrdersManager>,
        audit: Option<Arc<AuditService>>,
        config: EscalationConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            manager,
            audit,
            config,
            shutdown,
        }
    }

    /// 主循环：首个 tick 立即触发（重启后补扫），之后按间隔触发
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            threshold_secs = self.config.threshold.as_secs(),
            "Escalation monitor started"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep_at(shared::util::now_millis());
                }
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Escalation monitor received shutdown signal");
                    break;
                }
            }
        }

        tracing::info!("Escalation monitor stopped");
    }

    /// 执行一轮扫描
    pub fn sweep_at(&self, now: i64) -> SweepReport {
        let mut report = SweepReport::default();
        let cutoff = now.saturating_sub(self.config.threshold.as_millis() as i64);

        let candidates = match self.manager.find_stale_pending(cutoff) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Escalation scan failed");
                return report;
            }
        };
        report.matched = candidates.len();

        let started = Instant::now();
        for (index, order) in candidates.iter().enumerate() {
            if index >= self.config.max_per_sweep
                || started.elapsed() >= self.config.sweep_budget
            {
                report.deferred = report.matched - index;
                break;
            }

            match self.manager.escalate(&order.order_id, order.revision, now) {
                Ok(escalated) => {
                    report.escalated += 1;
                    self.audit_escalation(
                        &escalated.order_id,
                        escalated.responsible_party.as_deref(),
                        now - order.created_at(),
                    );
                }
                Err(e) if e.is_lost_race() => {
                    report.lost_race += 1;
                    tracing::debug!(order_id = %order.order_id, error = %e, "Escalation lost race");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(order_id = %order.order_id, error = %e, "Escalation failed");
                }
            }
        }

        if report.matched > 0 {
            tracing::info!(
                matched = report.matched,
                escalated = report.escalated,
                lost_race = report.lost_race,
                failed = report.failed,
                deferred = report.deferred,
                "Escalation sweep finished"
            );
        }
        report
    }

    fn audit_escalation(&self, order_id: &str, responsible_party: Option<&str>, elapsed_ms: i64) {
        if let Some(audit) = &self.audit {
            audit.log(
                AuditAction::OrderEscalated,
                "order",
                order_id,
                Some(SYSTEM_ACTOR.to_string()),
                serde_json::json!({
                    "responsible_party": responsible_party,
                    "elapsed_ms": elapsed_ms,
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditStorage;
    use crate::orders::OrderStorage;
    use rust_decimal::Decimal;
    use shared::order::{LineItem, NewOrder, TransitionAction, TransitionRequest};

    const T0: i64 = 1_700_000_000_000;
    const MINUTE: i64 = 60_000;

    fn setup(config: EscalationConfig) -> (Arc<OrdersManager>, EscalationMonitor) {
        let manager = Arc::new(OrdersManager::with_storage(
            OrderStorage::open_in_memory().unwrap(),
        ));
        let monitor =
            EscalationMonitor::new(manager.clone(), None, config, CancellationToken::new());
        (manager, monitor)
    }

    fn create(manager: &OrdersManager, order_id: &str, created_at: i64) {
        let new = NewOrder {
            order_id: Some(order_id.to_string()),
            restaurant_id: "r-1".to_string(),
            table_id: None,
            responsible_party: Some("w-1".to_string()),
            items: vec![LineItem {
                menu_item_id: "m-1".to_string(),
                name: "Tortilla".to_string(),
                quantity: 1,
                modifiers: vec![],
                note: None,
            }],
            subtotal: Decimal::ONE,
            tax: Decimal::ZERO,
            total: Decimal::ONE,
        };
        manager.create_order_at(new, "intake", created_at).unwrap();
    }

    #[test]
    fn sweep_escalates_only_stale_orders() {
        let (manager, monitor) = setup(EscalationConfig::default());
        create(&manager, "old", T0);
        create(&manager, "fresh", T0 + 4 * MINUTE);

        let report = monitor.sweep_at(T0 + 6 * MINUTE);
        assert_eq!(report.matched, 1);
        assert_eq!(report.escalated, 1);

        let old = manager.get_order("old").unwrap().unwrap();
        assert!(old.escalated);
        assert_eq!(old.escalated_at, Some(T0 + 6 * MINUTE));
        assert!(!manager.get_order("fresh").unwrap().unwrap().escalated);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let (manager, monitor) = setup(EscalationConfig::default());
        create(&manager, "o-1", T0);

        assert_eq!(monitor.sweep_at(T0 + 5 * MINUTE - 1).matched, 0);
        assert_eq!(monitor.sweep_at(T0 + 5 * MINUTE).escalated, 1);
    }

    #[test]
    fn repeated_sweeps_are_idempotent() {
        let (manager, monitor) = setup(EscalationConfig::default());
        create(&manager, "o-1", T0);

        assert_eq!(monitor.sweep_at(T0 + 6 * MINUTE).escalated, 1);
        assert_eq!(monitor.sweep_at(T0 + 7 * MINUTE), SweepReport::default());

        let order = manager.get_order("o-1").unwrap().unwrap();
        assert_eq!(order.revision, 1);
        assert_eq!(order.escalated_at, Some(T0 + 6 * MINUTE));
    }

    #[test]
    fn accepted_orders_are_never_escalated() {
        let (manager, monitor) = setup(EscalationConfig::default());
        create(&manager, "o-1", T0);
        manager
            .execute_transition_at(
                TransitionRequest {
                    order_id: "o-1".to_string(),
                    action: TransitionAction::Accept,
                    actor_id: "w-1".to_string(),
                    expected_revision: 0,
                    reason: None,
                },
                T0 + MINUTE,
            )
            .unwrap();

        assert_eq!(monitor.sweep_at(T0 + 10 * MINUTE).matched, 0);
    }

    #[test]
    fn cap_defers_remaining_orders() {
        let (manager, monitor) = setup(EscalationConfig {
            max_per_sweep: 2,
            ..Default::default()
        });
        for i in 0..5 {
            create(&manager, &format!("o-{i}"), T0 + i);
        }

        let first = monitor.sweep_at(T0 + 10 * MINUTE);
        assert_eq!(first.matched, 5);
        assert_eq!(first.escalated, 2);
        assert_eq!(first.deferred, 3);
        // Oldest first
        assert!(manager.get_order("o-0").unwrap().unwrap().escalated);
        assert!(manager.get_order("o-1").unwrap().unwrap().escalated);

        let second = monitor.sweep_at(T0 + 11 * MINUTE);
        assert_eq!(second.matched, 3);
        assert_eq!(second.escalated, 2);
        assert_eq!(second.deferred, 1);
    }

    #[test]
    fn exhausted_budget_defers_everything() {
        let (manager, monitor) = setup(EscalationConfig {
            sweep_budget: Duration::ZERO,
            ..Default::default()
        });
        create(&manager, "o-1", T0);

        let report = monitor.sweep_at(T0 + 10 * MINUTE);
        assert_eq!(report.escalated, 0);
        assert_eq!(report.deferred, 1);
    }

    #[tokio::test]
    async fn escalation_is_audited() {
        let audit_storage = AuditStorage::open_in_memory().unwrap();
        let (audit, mut rx) = AuditService::new(audit_storage, 8);
        let manager = Arc::new(OrdersManager::with_storage(
            OrderStorage::open_in_memory().unwrap(),
        ));
        let monitor = EscalationMonitor::new(
            manager.clone(),
            Some(audit),
            EscalationConfig::default(),
            CancellationToken::new(),
        );
        create(&manager, "o-1", T0);

        monitor.sweep_at(T0 + 6 * MINUTE);

        let req = rx.try_recv().unwrap();
        assert_eq!(req.action, AuditAction::OrderEscalated);
        assert_eq!(req.operator_id.as_deref(), Some("system"));
        assert_eq!(req.details["responsible_party"], "w-1");
        assert_eq!(req.details["elapsed_ms"], 6 * MINUTE);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let manager = Arc::new(OrdersManager::with_storage(
            OrderStorage::open_in_memory().unwrap(),
        ));
        let shutdown = CancellationToken::new();
        let monitor = EscalationMonitor::new(
            manager,
            None,
            EscalationConfig {
                interval: Duration::from_millis(10),
                ..Default::default()
            },
            shutdown.clone(),
        );

        let handle = tokio::spawn(monitor.run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }
}
