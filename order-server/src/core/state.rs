use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditLogRequest, AuditService, AuditStorage, AuditWorker};
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::{Config, Result};
use crate::live::{BroadcastDispatcher, SubscriptionRegistry};
use crate::orders::{EscalationMonitor, OrderStorage, OrdersManager, ReassignmentCoordinator};

/// 服务器状态 - 持有所有服务的共享引用
///
/// 使用 Arc 实现浅拷贝，可直接作为 axum 的 `State`。
///
/// # 服务组件
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | orders | Arc<OrdersManager> | 并发控制器 (所有订单写入) |
/// | reassign | Arc<ReassignmentCoordinator> | 经理重新指派 |
/// | registry | SubscriptionRegistry | 实时订阅表 |
/// | audit | Arc<AuditService> | 审计日志 |
/// | shutdown | CancellationToken | 关闭信号 |
#[derive(Clone)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    /// 订单并发控制器
    pub orders: Arc<OrdersManager>,
    /// 重新指派协调器
    pub reassign: Arc<ReassignmentCoordinator>,
    /// 实时订阅表 (与 OrdersManager 的 dispatcher 共享)
    pub registry: SubscriptionRegistry,
    /// 审计服务
    pub audit: Arc<AuditService>,
    /// 进程关闭信号 (WebSocket 会话监听它主动断开)
    pub shutdown: CancellationToken,
    /// 审计 worker 的接收端，启动后台任务时取走
    audit_rx: Arc<Mutex<Option<mpsc::Receiver<AuditLogRequest>>>>,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .field("orders", &self.orders)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录
    /// 2. 审计存储 (work_dir/audit.redb)
    /// 3. 订阅表 + 订单存储 (work_dir/orders.redb)
    pub async fn initialize(config: &Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.work_dir).await?;

        let audit_storage = AuditStorage::open(config.audit_db_path())?;
        let registry = SubscriptionRegistry::new();
        let manager = OrdersManager::new(
            config.orders_db_path(),
            BroadcastDispatcher::new(registry.clone()),
        )?;

        tracing::info!(work_dir = %config.work_dir, "Server state initialized");
        Ok(Self::assemble(config, manager, registry, audit_storage))
    }

    /// 内存后端的服务器状态 (测试用，不落盘)
    pub fn in_memory(config: &Config) -> Result<Self> {
        let audit_storage = AuditStorage::open_in_memory()?;
        let registry = SubscriptionRegistry::new();
        let storage = OrderStorage::open_in_memory().map_err(crate::orders::ManagerError::from)?;
        let manager =
            OrdersManager::with_dispatcher(storage, BroadcastDispatcher::new(registry.clone()));
        Ok(Self::assemble(config, manager, registry, audit_storage))
    }

    fn assemble(
        config: &Config,
        mut manager: OrdersManager,
        registry: SubscriptionRegistry,
        audit_storage: AuditStorage,
    ) -> Self {
        let (audit, audit_rx) = AuditService::new(audit_storage, config.audit_buffer_size);
        manager.set_audit_service(audit.clone());
        let orders = Arc::new(manager);
        let reassign = Arc::new(ReassignmentCoordinator::new(
            orders.clone(),
            Some(audit.clone()),
        ));

        Self {
            config: config.clone(),
            orders,
            reassign,
            registry,
            audit,
            shutdown: CancellationToken::new(),
            audit_rx: Arc::new(Mutex::new(Some(audit_rx))),
        }
    }

    /// 启动后台任务
    ///
    /// 必须在 `Server::run()` 之前调用，只有第一次调用会启动审计 worker。
    ///
    /// 启动的任务：
    /// - 审计 worker (AuditWorker)
    /// - 超时升级监控 (EscalationMonitor)
    pub async fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        if let Some(rx) = self.audit_rx.lock().await.take() {
            let worker = AuditWorker::new(self.audit.storage().clone());
            let shutdown = tasks.shutdown_token();
            tasks.spawn(
                "audit_worker",
                TaskKind::Worker,
                worker.run_until_cancelled(rx, shutdown),
            );
        } else {
            tracing::warn!("Audit worker already started");
        }

        let monitor = EscalationMonitor::new(
            self.orders.clone(),
            Some(self.audit.clone()),
            self.config.escalation(),
            tasks.shutdown_token(),
        );
        tasks.spawn("escalation_monitor", TaskKind::Periodic, monitor.run());

        tasks.log_summary();
        tasks
    }
}
