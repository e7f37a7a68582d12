use super::super::machine::TransitionError;
use super::super::storage::StorageError;
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

/// Manager errors
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order already exists: {0}")]
    AlreadyExists(String),

    #[error("Validation failed: {0}")]
    Validation(AppError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl ManagerError {
    /// Someone else changed the order between our read and our write
    ///
    /// The escalation sweep counts these separately from real failures.
    pub fn is_lost_race(&self) -> bool {
        matches!(
            self,
            ManagerError::Transition(
                TransitionError::ConcurrentModification { .. }
                    | TransitionError::AlreadyResolved { .. }
                    | TransitionError::AlreadyEscalated
            )
        )
    }

    /// Lift a store error, keeping the domain meaning of its typed variants
    pub(crate) fn from_storage(err: StorageError) -> Self {
        match err {
            StorageError::OrderNotFound(id) => ManagerError::OrderNotFound(id),
            StorageError::AlreadyExists(id) => ManagerError::AlreadyExists(id),
            StorageError::RevisionConflict { expected, actual } => {
                ManagerError::Transition(TransitionError::ConcurrentModification {
                    expected,
                    actual,
                })
            }
            other => ManagerError::Storage(other),
        }
    }
}

/// 将存储错误转换为错误码（前端负责本地化）
fn classify_storage_error(e: &StorageError) -> ErrorCode {
    // 先按枚举变体精确匹配
    match e {
        StorageError::Serialization(_) => return ErrorCode::StorageCorrupted,
        StorageError::OrderNotFound(_) => return ErrorCode::OrderNotFound,
        StorageError::AlreadyExists(_) => return ErrorCode::AlreadyExists,
        StorageError::RevisionConflict { .. } => return ErrorCode::ConcurrentModification,
        _ => {}
    }

    // redb 错误通过字符串匹配分类
    let err_str = e.to_string().to_lowercase();

    // 磁盘空间不足
    if err_str.contains("no space") || err_str.contains("disk full") || err_str.contains("enospc")
    {
        return ErrorCode::StorageFull;
    }

    // 数据损坏
    if err_str.contains("corrupt") || err_str.contains("invalid database") {
        return ErrorCode::StorageCorrupted;
    }

    // 默认：系统繁忙（redb 的 Database/Transaction/Table/Storage/Commit 错误）
    ErrorCode::SystemBusy
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidTransition { action, from } => AppError::with_message(
                ErrorCode::InvalidTransition,
                format!("Cannot {} an order in {}", action, from),
            )
            .with_detail("action", action)
            .with_detail("current_state", from.as_str()),
            TransitionError::AlreadyResolved { current } => {
                AppError::already_resolved(current.as_str())
            }
            TransitionError::AlreadyEscalated => {
                AppError::with_message(ErrorCode::InvalidTransition, "Order is already escalated")
            }
            TransitionError::NotResponsible { actor, responsible } => {
                let err = AppError::new(ErrorCode::NotResponsible).with_detail("actor_id", actor);
                match responsible {
                    Some(party) => err.with_detail("responsible_party", party),
                    None => err,
                }
            }
            TransitionError::ConcurrentModification { expected, actual } => {
                AppError::concurrent_modification(expected, actual)
            }
            TransitionError::Invalid(msg) => AppError::validation(msg),
        }
    }
}

impl From<ManagerError> for AppError {
    fn from(err: ManagerError) -> Self {
        match err {
            ManagerError::Storage(e) => {
                let code = classify_storage_error(&e);
                tracing::error!(error = %e, error_code = ?code, "Storage error occurred");
                AppError::with_message(code, e.to_string())
            }
            ManagerError::OrderNotFound(id) => AppError::order_not_found(id),
            ManagerError::AlreadyExists(id) => {
                AppError::already_exists(format!("Order {}", id)).with_detail("order_id", id)
            }
            ManagerError::Validation(e) => e,
            ManagerError::Transition(e) => e.into(),
        }
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;
