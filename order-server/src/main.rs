use order_server::{Config, Server, ServerState, print_banner, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 加载 .env (不存在时忽略)
    let _ = dotenv::dotenv();

    // 2. 加载配置并初始化日志
    let config = Config::from_env();
    setup_environment(&config)?;

    print_banner();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        work_dir = %config.work_dir,
        "Order server starting..."
    );

    // 3. 初始化服务器状态
    let state = ServerState::initialize(&config).await?;

    // 4. 启动 HTTP 服务器 (Server::run 会自动启动后台任务)
    let server = Server::with_state(config, state);
    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "Server error");
        return Err(e.into());
    }

    Ok(())
}
