use thiserror::Error;

use crate::audit::AuditStorageError;
use crate::orders::ManagerError;

/// 服务器启动/运行错误
///
/// 请求级错误走 `shared::AppError`，这里只覆盖进程级失败。
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("订单存储初始化失败: {0}")]
    Orders(#[from] ManagerError),

    #[error("审计存储初始化失败: {0}")]
    Audit(#[from] AuditStorageError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部服务器错误: {0}")]
    Internal(#[from] anyhow::Error),
}

/// 服务器级 Result 类型别名
pub type Result<T> = std::result::Result<T, ServerError>;
