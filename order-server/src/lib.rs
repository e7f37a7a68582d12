//! Order Server - 餐厅订单生命周期核心
//!
//! # 架构概述
//!
//! 服务员、厨房、经理三方并发操作同一批订单，本 crate 负责：
//!
//! - **订单状态机** (`orders::machine`): 纯函数的状态转换与守卫
//! - **并发控制** (`orders::manager`): 基于 revision 的乐观锁提交
//! - **超时升级** (`orders::escalation`): 周期扫描无人接单的订单
//! - **重新指派** (`orders::reassign`): 经理把订单交给其他服务员
//! - **实时推送** (`live`): topic 订阅表 + 广播分发
//! - **审计** (`audit`): SHA256 哈希链审计日志
//! - **HTTP API** (`api`): REST + WebSocket 接口
//!
//! # 模块结构
//!
//! ```text
//! order-server/src/
//! ├── core/          # 配置、状态、后台任务、服务器
//! ├── api/           # HTTP 路由和处理器
//! ├── orders/        # 状态机、存储、并发控制、升级、指派
//! ├── live/          # 订阅表与广播
//! ├── audit/         # 审计日志
//! └── utils/         # 日志
//! ```

pub mod api;
pub mod audit;
pub mod core;
pub mod live;
pub mod orders;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, Server, ServerState};
pub use live::{BroadcastDispatcher, SubscriptionRegistry};
pub use orders::{OrderStorage, OrdersManager};
pub use shared::{ApiResponse, AppError, AppResult, ErrorCode};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

// Security logging macro - 租户边界相关的拒绝记录
#[macro_export]
macro_rules! security_log {
    ($level:expr, $event:expr, $($key:ident = $value:expr),*) => {
        tracing::info!(
            target: "security",
            level = $level,
            event = $event,
            $($key = $value),*
        );
    };
}

/// 初始化日志 (.env 需在加载配置前由调用方读取)
pub fn setup_environment(config: &Config) -> anyhow::Result<()> {
    init_logger_with_file(&config.log_level, config.log_dir.as_deref())
}

pub fn print_banner() {
    println!(
        r#"
   ____          __
  / __ \_______/ /__  _____
 / / / / ___/ __  / _ \/ ___/
/ /_/ / /  / /_/ /  __/ /
\____/_/   \__,_/\___/_/
    "#
    );
}
