// ==========================================
// 单车道客运站 - 后台作业
// ==========================================
// 职责:
// - 车辆状态清扫调度: 启动时补跑、每小时检查、每日本地固定时刻
// - 车道事件审计: 订阅广播通道，逐条记录推送事件
// 说明: 清扫本身按本地日去重，调度只负责“按时尝试”
// ==========================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::engine::events::BroadcastEventPublisher;
use crate::engine::sweep::{StatusSweeper, SWEEP_CHECK_INTERVAL_SECS};

/// 启动清扫调度任务
pub fn spawn_sweep_scheduler(sweeper: Arc<StatusSweeper>) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_sweep_once(sweeper.clone(), "startup").await;

        let hourly = Duration::from_secs(SWEEP_CHECK_INTERVAL_SECS);
        loop {
            let (wait, trigger) = match until_daily_run(sweeper.clone()).await {
                Some(until_daily) if until_daily < hourly => (until_daily, "daily"),
                _ => (hourly, "hourly"),
            };
            tokio::time::sleep(wait).await;
            run_sweep_once(sweeper.clone(), trigger).await;
        }
    })
}

async fn run_sweep_once(sweeper: Arc<StatusSweeper>, trigger: &'static str) {
    match tokio::task::spawn_blocking(move || sweeper.run_if_due()).await {
        Ok(Ok(Some(report))) => {
            tracing::info!(trigger, updates = report.total_updates(), "定时清扫已执行");
        }
        Ok(Ok(None)) => tracing::debug!(trigger, "定时清扫跳过"),
        Ok(Err(e)) => tracing::error!(trigger, error = %e, "定时清扫失败"),
        Err(e) => tracing::error!(trigger, error = %e, "定时清扫任务异常退出"),
    }
}

async fn until_daily_run(sweeper: Arc<StatusSweeper>) -> Option<Duration> {
    match tokio::task::spawn_blocking(move || sweeper.until_next_daily_run(Utc::now())).await {
        Ok(Ok(d)) => d.to_std().ok(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "计算每日清扫时刻失败，按小时检查");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "计算每日清扫时刻任务异常");
            None
        }
    }
}

/// 启动车道事件审计任务
///
/// 推送本身由各订阅者（SSE 连接）独立消费，此任务只做留痕
pub fn spawn_event_auditor(events: Arc<BroadcastEventPublisher>) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::info!(event = event.name(), "车道事件已推送"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "事件审计落后，已跳过部分事件");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
