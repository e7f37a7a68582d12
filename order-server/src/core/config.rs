use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::live::DEFAULT_OBSERVER_CAPACITY;
use crate::orders::EscalationConfig;

/// 服务器配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖，未设置或无法解析时使用默认值：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/order-core | 工作目录 (数据库、日志) |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | LOG_LEVEL | info | 默认日志级别 (RUST_LOG 优先) |
/// | LOG_DIR | (无) | 日志文件目录，未设置时只输出到终端 |
/// | ESCALATION_INTERVAL_SECS | 60 | 升级扫描间隔 |
/// | ESCALATION_THRESHOLD_SECS | 300 | 未接单超时阈值 |
/// | ESCALATION_SWEEP_BUDGET_MS | 10000 | 单轮扫描时间预算 |
/// | ESCALATION_MAX_PER_SWEEP | 500 | 单轮最多升级数 |
/// | OBSERVER_QUEUE_CAPACITY | 64 | 每个订阅者的推送队列长度 |
/// | AUDIT_BUFFER_SIZE | 1024 | 审计通道容量 |
/// | SHUTDOWN_TIMEOUT_MS | 10000 | 关闭超时(毫秒) |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/orders HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库和日志
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 默认日志级别
    pub log_level: String,
    /// 日志文件目录
    pub log_dir: Option<String>,

    // === 升级监控 ===
    pub escalation_interval_secs: u64,
    pub escalation_threshold_secs: u64,
    pub escalation_sweep_budget_ms: u64,
    pub escalation_max_per_sweep: usize,

    // === 推送与审计 ===
    /// 每个实时订阅者的队列容量，满了就丢弃该订阅者的事件
    pub observer_queue_capacity: usize,
    /// 审计通道容量
    pub audit_buffer_size: usize,
    /// 关闭超时时间 (毫秒)
    pub shutdown_timeout_ms: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/order-core".into()),
            http_port: env_or("HTTP_PORT", 3000),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.trim().is_empty()),

            escalation_interval_secs: env_or("ESCALATION_INTERVAL_SECS", 60),
            escalation_threshold_secs: env_or("ESCALATION_THRESHOLD_SECS", 300),
            escalation_sweep_budget_ms: env_or("ESCALATION_SWEEP_BUDGET_MS", 10_000),
            escalation_max_per_sweep: env_or("ESCALATION_MAX_PER_SWEEP", 500),

            observer_queue_capacity: env_or("OBSERVER_QUEUE_CAPACITY", DEFAULT_OBSERVER_CAPACITY),
            audit_buffer_size: env_or("AUDIT_BUFFER_SIZE", 1024),
            shutdown_timeout_ms: env_or("SHUTDOWN_TIMEOUT_MS", 10_000),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// 订单数据库路径
    pub fn orders_db_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("orders.redb")
    }

    /// 审计数据库路径
    pub fn audit_db_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("audit.redb")
    }

    /// 升级监控配置
    pub fn escalation(&self) -> EscalationConfig {
        EscalationConfig {
            interval: Duration::from_secs(self.escalation_interval_secs.max(1)),
            threshold: Duration::from_secs(self.escalation_threshold_secs),
            sweep_budget: Duration::from_millis(self.escalation_sweep_budget_ms),
            max_per_sweep: self.escalation_max_per_sweep.max(1),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
