// ==========================================
// 单车道客运站 - 看板与通行记录查询 API
// ==========================================
// 职责: 当日完成趟次统计、最近通行记录、按车牌+touchdown 查询
// 说明: “当日”按站点本地时区划分
// ==========================================

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::api::error::{ApiError, ApiResult};
use crate::api::lane_api::require_non_empty;
use crate::config::ConfigManager;
use crate::domain::entry_log::{DashboardCounts, EntryLogEntry};
use crate::domain::types::Touchdown;
use crate::repository::entry_log_repo::EntryLogRepository;

/// 最近通行记录默认条数
pub const DEFAULT_RECENT_LIMIT: usize = 50;
/// 最近通行记录最大条数
pub const MAX_RECENT_LIMIT: usize = 500;

pub struct DashboardApi {
    entry_log_repo: Arc<EntryLogRepository>,
    config: Arc<ConfigManager>,
}

impl DashboardApi {
    pub fn new(entry_log_repo: Arc<EntryLogRepository>, config: Arc<ConfigManager>) -> Self {
        Self {
            entry_log_repo,
            config,
        }
    }

    /// 当日完成趟次（按通行证拆分）
    pub fn get_counts(&self) -> ApiResult<DashboardCounts> {
        self.get_counts_at(Utc::now())
    }

    pub fn get_counts_at(&self, now: DateTime<Utc>) -> ApiResult<DashboardCounts> {
        let since = self.config.load_lane_settings()?.day_start_utc(now);
        Ok(self.entry_log_repo.dashboard_counts(since)?)
    }

    /// 最近通行记录（按 time_in 倒序）
    ///
    /// limit 为空时取默认值，超过上限时截断
    pub fn recent_entry_logs(&self, limit: Option<usize>) -> ApiResult<Vec<EntryLogEntry>> {
        let limit = match limit {
            Some(0) => return Err(ApiError::InvalidInput("limit 必须大于 0".to_string())),
            Some(n) => n.min(MAX_RECENT_LIMIT),
            None => DEFAULT_RECENT_LIMIT,
        };
        Ok(self.entry_log_repo.recent(limit)?)
    }

    /// 按车牌 + touchdown 查询（按 time_out 倒序）
    pub fn find_by_plate_and_touchdown(
        &self,
        plate: &str,
        touchdown: &str,
    ) -> ApiResult<Vec<EntryLogEntry>> {
        let plate = require_non_empty("plate_number", plate)?;
        let touchdown: Touchdown = touchdown.parse().map_err(ApiError::InvalidInput)?;
        Ok(self
            .entry_log_repo
            .find_by_plate_and_touchdown(plate, touchdown)?)
    }
}
