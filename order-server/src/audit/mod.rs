//! 审计日志模块：防篡改审计追踪
//!
//! # 架构
//!
//! ```text
//! 升级 / 重新指派 / 拒绝 / 取消
//!   ├─ AuditService::log() → mpsc (try_send) → AuditWorker → redb (audit_log 表)
//!   └─ AuditService::log_sync() → redb (启动/关闭场景)
//!
//! SHA256 哈希链: genesis → entry₁ → entry₂ → ... → entryₙ
//! ```
//!
//! # 防篡改保证
//!
//! - **SHA256 哈希链**: 每条记录包含前一条的哈希
//! - **Append-only**: 无删除/更新接口
//! - **链验证**: `verify_chain()` 可随时验证完整性
//!
//! 审计是订单变更的旁路：写入失败只记录日志，不回滚订单。

pub mod service;
pub mod storage;
pub mod types;
pub mod worker;

pub use service::{AuditLogRequest, AuditService};
pub use storage::{AuditStorage, AuditStorageError};
pub use types::{AuditAction, AuditBreakKind, AuditChainBreak, AuditChainVerification, AuditEntry};
pub use worker::AuditWorker;
