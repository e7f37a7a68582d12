//! 审计日志类型定义
//!
//! 所有条目不可变、不可删除，支持 SHA256 哈希链防篡改。

use serde::{Deserialize, Serialize};

/// 审计操作类型（枚举，非自由文本）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // ═══ 系统生命周期 ═══
    /// 系统正常启动
    SystemStartup,
    /// 系统正常关闭
    SystemShutdown,

    // ═══ 订单 ═══
    /// 超时未处理，升级给经理
    OrderEscalated,
    /// 经理重新指派负责人
    OrderReassigned,
    /// 订单被拒绝
    OrderRejected,
    /// 订单被取消
    OrderCancelled,
}

impl AuditAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AuditAction::SystemStartup => "system_startup",
            AuditAction::SystemShutdown => "system_shutdown",
            AuditAction::OrderEscalated => "order_escalated",
            AuditAction::OrderReassigned => "order_reassigned",
            AuditAction::OrderRejected => "order_rejected",
            AuditAction::OrderCancelled => "order_cancelled",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 审计日志条目（不可变）
///
/// - `prev_hash`: 前一条记录的哈希（第一条为 `genesis`）
/// - `curr_hash`: 当前记录的哈希（包含 prev_hash + 所有字段）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// 全局递增序列号，从 1 开始
    pub id: u64,
    /// 时间戳（Unix 毫秒）
    pub timestamp: i64,
    pub action: AuditAction,
    /// 资源类型（如 "order", "system"）
    pub resource_type: String,
    /// 资源 ID
    pub resource_id: String,
    /// 操作人 ID（系统事件为 "system"）
    pub operator_id: Option<String>,
    /// 结构化详情（JSON）
    pub details: serde_json::Value,
    pub prev_hash: String,
    pub curr_hash: String,
}

/// 审计链验证结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditChainVerification {
    /// 验证的记录总数
    pub total_entries: u64,
    /// 链是否完整
    pub chain_intact: bool,
    /// 断裂点列表
    pub breaks: Vec<AuditChainBreak>,
}

/// 断裂类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditBreakKind {
    /// prev_hash 与上一条的 curr_hash 不一致（删除/插入）
    PrevHashMismatch,
    /// 重算哈希与 curr_hash 不一致（内容被改）
    ContentHashMismatch,
}

/// 审计链断裂点
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditChainBreak {
    /// 断裂处的序列号
    pub entry_id: u64,
    pub kind: AuditBreakKind,
    /// 期望的哈希
    pub expected_hash: String,
    /// 实际存储的哈希
    pub actual_hash: String,
}
