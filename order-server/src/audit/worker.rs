//! 审计日志后台 Worker
//!
//! 从 mpsc 通道消费 AuditLogRequest，写入 redb。
//! 通道关闭或收到 shutdown 信号时退出。

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::service::AuditLogRequest;
use super::storage::AuditStorage;

/// 审计日志后台 Worker
pub struct AuditWorker {
    storage: AuditStorage,
}

impl AuditWorker {
    pub fn new(storage: AuditStorage) -> Self {
        Self { storage }
    }

    /// 运行 worker 直到通道关闭或收到 shutdown
    ///
    /// 收到 shutdown 后关闭通道并写完已排队的记录。
    pub async fn run_until_cancelled(
        self,
        mut rx: mpsc::Receiver<AuditLogRequest>,
        shutdown: CancellationToken,
    ) {
        tracing::info!("📋 Audit log worker started");

        loop {
            tokio::select! {
                req = rx.recv() => match req {
                    Some(req) => self.append(req),
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    rx.close();
                    let mut drained = 0usize;
                    while let Some(req) = rx.recv().await {
                        self.append(req);
                        drained += 1;
                    }
                    tracing::info!(drained, "Audit log worker received shutdown signal");
                    break;
                }
            }
        }

        tracing::info!("Audit log worker stopped");
    }

    fn append(&self, req: AuditLogRequest) {
        match self.storage.append(
            req.action,
            req.resource_type,
            req.resource_id,
            req.operator_id,
            req.details,
        ) {
            Ok(entry) => {
                tracing::debug!(
                    audit_id = entry.id,
                    action = %entry.action,
                    resource_id = %entry.resource_id,
                    "Audit entry recorded"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to write audit entry");
            }
        }
    }
}
