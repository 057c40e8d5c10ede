// ==========================================
// 单车道客运站 - 车辆状态清扫作业
// ==========================================
// 每次运行:
// - 解除处罚满保留期: Lifted → None（先于登记到期执行）
// - 当日到期的登记: Ok → Expired
// - 历史到期未处理（停机期间错过）: Ok → Expired
// 调度: 启动时补跑、每小时检查、每日固定本地时刻
// 红线: 同一本地日只运行一次（记账持久化在 config_kv），人工触发可越过
// 红线: 进程内单飞，运行中的重复触发直接跳过
// ==========================================

use crate::config::ConfigManager;
use crate::engine::error::LaneResult;
use crate::engine::tx::with_immediate_tx;
use crate::repository::vehicle_repo::VehicleRepository;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// 每小时检查间隔
pub const SWEEP_CHECK_INTERVAL_SECS: u64 = 60 * 60;

/// 单次清扫结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub run_date: NaiveDate,
    pub expired_today: usize,
    pub expired_catch_up: usize,
    pub penalties_reset: usize,
    pub manual: bool,
}

impl SweepReport {
    pub fn total_updates(&self) -> usize {
        self.expired_today + self.expired_catch_up + self.penalties_reset
    }
}

/// 清扫作业状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepStatus {
    pub is_running: bool,
    pub last_run_date: Option<NaiveDate>,
    pub ran_today: bool,
    pub daily_hour: u32,
    pub next_daily_run: DateTime<Utc>,
    pub check_interval_secs: u64,
}

// ==========================================
// StatusSweeper
// ==========================================
pub struct StatusSweeper {
    conn: Arc<Mutex<Connection>>,
    config: Arc<ConfigManager>,
    running: AtomicBool,
}

/// 运行标记守卫，离开作用域时复位
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl StatusSweeper {
    pub fn new(conn: Arc<Mutex<Connection>>, config: Arc<ConfigManager>) -> Self {
        Self {
            conn,
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 定时触发: 当日已运行则跳过
    ///
    /// # 返回
    /// - `Ok(Some(report))`: 本次执行了清扫
    /// - `Ok(None)`: 当日已运行，或已有清扫在运行
    pub fn run_if_due(&self) -> LaneResult<Option<SweepReport>> {
        self.run_if_due_at(Utc::now())
    }

    pub fn run_if_due_at(&self, now: DateTime<Utc>) -> LaneResult<Option<SweepReport>> {
        let today = self.config.load_lane_settings()?.local_date(now);
        if self.config.get_sweep_last_run_date()? == Some(today) {
            debug!(%today, "当日清扫已完成，跳过");
            return Ok(None);
        }
        self.run_at(now, false)
    }

    /// 人工触发: 越过“当日已运行”检查
    pub fn run_manual(&self) -> LaneResult<Option<SweepReport>> {
        self.run_at(Utc::now(), true)
    }

    pub fn run_manual_at(&self, now: DateTime<Utc>) -> LaneResult<Option<SweepReport>> {
        self.run_at(now, true)
    }

    fn run_at(&self, now: DateTime<Utc>, manual: bool) -> LaneResult<Option<SweepReport>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("车辆状态清扫正在运行，跳过本次触发");
            return Ok(None);
        }
        let _guard = RunningGuard(&self.running);

        let settings = self.config.load_lane_settings()?;
        let today = settings.local_date(now);
        let cutoff = now - settings.penalty_lift_expiry();

        let report = with_immediate_tx(&self.conn, |tx| -> LaneResult<SweepReport> {
            let penalties_reset = VehicleRepository::reset_lifted_penalties_tx(tx, cutoff, now)?;
            let (expired_today, expired_catch_up) =
                VehicleRepository::expire_registrations_tx(tx, today, now)?;
            ConfigManager::set_sweep_last_run_date_tx(tx, today)?;

            Ok(SweepReport {
                run_date: today,
                expired_today,
                expired_catch_up,
                penalties_reset,
                manual,
            })
        })?;

        info!(
            run_date = %report.run_date,
            expired_today = report.expired_today,
            expired_catch_up = report.expired_catch_up,
            penalties_reset = report.penalties_reset,
            manual = report.manual,
            "车辆状态清扫完成"
        );
        Ok(Some(report))
    }

    /// 清扫作业状态
    pub fn status_at(&self, now: DateTime<Utc>) -> LaneResult<SweepStatus> {
        let settings = self.config.load_lane_settings()?;
        let last_run_date = self.config.get_sweep_last_run_date()?;
        let today = settings.local_date(now);

        Ok(SweepStatus {
            is_running: self.is_running(),
            last_run_date,
            ran_today: last_run_date == Some(today),
            daily_hour: settings.sweep_daily_hour,
            next_daily_run: next_daily_run(now, &settings.offset(), settings.sweep_daily_hour),
            check_interval_secs: SWEEP_CHECK_INTERVAL_SECS,
        })
    }

    /// 距下一次每日定时运行的时长
    pub fn until_next_daily_run(&self, now: DateTime<Utc>) -> LaneResult<Duration> {
        let settings = self.config.load_lane_settings()?;
        Ok(next_daily_run(now, &settings.offset(), settings.sweep_daily_hour) - now)
    }
}

/// 下一次本地 hour:00 对应的 UTC 时刻（严格晚于 now）
pub fn next_daily_run<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz, hour: u32) -> DateTime<Utc> {
    let local_today = now.with_timezone(tz).date_naive();
    for day_offset in 0..=2 {
        let date = local_today + Duration::days(day_offset);
        let Some(naive) = date.and_hms_opt(hour, 0, 0) else {
            continue;
        };
        if let Some(candidate) = tz.from_local_datetime(&naive).earliest() {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > now {
                return candidate;
            }
        }
    }
    now + Duration::days(1)
}
