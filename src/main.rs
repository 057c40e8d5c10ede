// ==========================================
// 单车道客运站 - 服务主入口
// ==========================================
// 环境变量:
// - TERMINAL_LANE_DB_PATH: 数据库路径（默认用户数据目录）
// - TERMINAL_LANE_BIND: 监听地址（默认 0.0.0.0:8080）
// - TERMINAL_LANE_LOCALE: 提示语言（en / zh-CN）
// - RUST_LOG: 日志级别
// ==========================================

use anyhow::Context;
use terminal_lane::app::{get_default_db_path, jobs, router, AppState};

const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    terminal_lane::logging::init();

    tracing::info!("==================================================");
    tracing::info!("单车道客运站 - 进出场仲裁与排队服务");
    tracing::info!("系统版本: {}", terminal_lane::VERSION);
    tracing::info!("==================================================");
    tracing::info!("提示语言: {}", terminal_lane::i18n::init_from_env());

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = tokio::task::spawn_blocking(move || AppState::new(db_path))
        .await
        .context("初始化任务异常退出")?
        .map_err(anyhow::Error::msg)
        .context("无法初始化AppState")?;

    jobs::spawn_event_auditor(state.events.clone());
    jobs::spawn_sweep_scheduler(state.sweeper.clone());

    let bind = std::env::var("TERMINAL_LANE_BIND")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_BIND.to_string());

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("无法监听地址 {}", bind))?;
    tracing::info!("HTTP 服务已启动: {}", bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP 服务异常退出")?;

    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("监听退出信号失败: {}", e);
    }
}
