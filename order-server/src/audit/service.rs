//! 审计日志服务
//!
//! `AuditService` 提供：
//! - 日志写入（通过 mpsc 通道交给后台 worker）
//! - 日志查询（直接读取 redb）
//! - 链验证
//! - 系统启动/关闭记录

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::storage::{AuditStorage, AuditStorageResult};
use super::types::*;

/// 发送到 AuditWorker 的日志请求
#[derive(Debug, Clone)]
pub struct AuditLogRequest {
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: String,
    pub operator_id: Option<String>,
    pub details: serde_json::Value,
}

/// 审计日志服务
///
/// 写入是尽力而为的旁路：调用方（状态变更路径）从不等待审计落盘，
/// 审计失败也不会回滚已提交的订单变更。
pub struct AuditService {
    storage: AuditStorage,
    tx: mpsc::Sender<AuditLogRequest>,
}

impl std::fmt::Debug for AuditService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditService")
            .field("queued", &(self.tx.max_capacity() - self.tx.capacity()))
            .finish_non_exhaustive()
    }
}

impl AuditService {
    /// 创建审计服务，返回的 Receiver 交给 [`AuditWorker`](super::AuditWorker)
    pub fn new(
        storage: AuditStorage,
        buffer_size: usize,
    ) -> (Arc<Self>, mpsc::Receiver<AuditLogRequest>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        (Arc::new(Self { storage, tx }), rx)
    }

    /// 记录审计日志（非阻塞）
    ///
    /// 通道满或已关闭时记录警告后返回。
    pub fn log(
        &self,
        action: AuditAction,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        operator_id: Option<String>,
        details: serde_json::Value,
    ) {
        let req = AuditLogRequest {
            action,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            operator_id,
            details,
        };

        match self.tx.try_send(req) {
            Ok(()) => {}
            Err(TrySendError::Full(req)) => {
                tracing::warn!(
                    action = %req.action,
                    resource_id = %req.resource_id,
                    "Audit channel full, entry lost"
                );
            }
            Err(TrySendError::Closed(req)) => {
                tracing::warn!(
                    action = %req.action,
                    resource_id = %req.resource_id,
                    "Audit channel closed, entry lost"
                );
            }
        }
    }

    /// 直接写入审计日志（启动/关闭等 worker 不可用的场景）
    pub fn log_sync(
        &self,
        action: AuditAction,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        details: serde_json::Value,
    ) -> AuditStorageResult<AuditEntry> {
        self.storage.append(
            action,
            resource_type.into(),
            resource_id.into(),
            Some("system".to_string()),
            details,
        )
    }

    /// 系统启动时调用
    pub fn on_startup(&self) {
        let details = serde_json::json!({ "version": env!("CARGO_PKG_VERSION") });
        if let Err(e) = self.log_sync(AuditAction::SystemStartup, "system", "server:main", details)
        {
            tracing::error!(error = %e, "Failed to log system startup");
        }
    }

    /// 系统正常关闭时调用
    pub fn on_shutdown(&self) {
        if let Err(e) = self.log_sync(
            AuditAction::SystemShutdown,
            "system",
            "server:main",
            serde_json::Value::Null,
        ) {
            tracing::error!(error = %e, "Failed to log system shutdown");
        }
    }

    /// 最近 N 条审计日志（倒序）
    pub fn query_recent(&self, limit: usize) -> AuditStorageResult<Vec<AuditEntry>> {
        self.storage.query_recent(limit)
    }

    /// 审计记录总数
    pub fn count(&self) -> AuditStorageResult<u64> {
        self.storage.count()
    }

    /// 验证审计链完整性
    pub fn verify_chain(&self) -> AuditStorageResult<AuditChainVerification> {
        self.storage.verify_chain()
    }

    /// 获取存储引用
    pub fn storage(&self) -> &AuditStorage {
        &self.storage
    }
}
