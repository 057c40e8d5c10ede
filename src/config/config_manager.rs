// ==========================================
// 单车道客运站 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 约定: 配置值非法时记录 warn 并回退默认值，不阻断业务
// ==========================================

use crate::db::{parse_date, DATE_FORMAT};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// 全局作用域
const GLOBAL_SCOPE: &str = "global";

// ==========================================
// 默认值
// ==========================================

/// Asia/Manila, UTC+8
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 480;
pub const DEFAULT_TICKET_VALIDITY_HOURS: i64 = 24;
pub const DEFAULT_PENALTY_LIFT_EXPIRY_HOURS: i64 = 24;
pub const DEFAULT_SWEEP_DAILY_HOUR: u32 = 2;

/// 线路 → FD 默认映射
pub fn default_route_fd_map() -> HashMap<String, String> {
    [
        ("SanJose - Cabanatuan City", "FD1"),
        ("SanJose - Carranglan", "FD2"),
        ("SanJose - Rizal", "FD3"),
        ("SanJose - Baguio", "FD4"),
    ]
    .into_iter()
    .map(|(route, fd)| (route.to_string(), fd.to_string()))
    .collect()
}

// ==========================================
// LaneSettings - 车道引擎运行参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneSettings {
    pub utc_offset_minutes: i32,          // 站点所在时区偏移
    pub ticket_validity_hours: i64,       // 票据有效期
    pub penalty_lift_expiry_hours: i64,   // 解除处罚状态保留时长
    pub sweep_daily_hour: u32,            // 每日清扫的本地小时
    pub route_fd_map: HashMap<String, String>,
}

impl Default for LaneSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            ticket_validity_hours: DEFAULT_TICKET_VALIDITY_HOURS,
            penalty_lift_expiry_hours: DEFAULT_PENALTY_LIFT_EXPIRY_HOURS,
            sweep_daily_hour: DEFAULT_SWEEP_DAILY_HOUR,
            route_fd_map: default_route_fd_map(),
        }
    }
}

impl LaneSettings {
    /// 站点时区（越界时回退 UTC）
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// 站点本地日期
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset()).date_naive()
    }

    /// 站点本地当日零点（UTC 表示）
    pub fn day_start_utc(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = self.local_date(now).and_hms_opt(0, 0, 0).unwrap_or_default();
        self.offset()
            .from_local_datetime(&midnight)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now)
    }

    /// 排队号计数器的分期键（本地日期）
    pub fn queue_period(&self, now: DateTime<Utc>) -> String {
        self.local_date(now).format(DATE_FORMAT).to_string()
    }

    pub fn ticket_validity(&self) -> Duration {
        Duration::hours(self.ticket_validity_hours)
    }

    pub fn penalty_lift_expiry(&self) -> Duration {
        Duration::hours(self.penalty_lift_expiry_hours)
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockPoisoned(e.to_string()))
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        Self::get_value_tx(&conn, key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::set_value_tx(&conn, key, value)
    }

    pub(crate) fn get_value_tx(conn: &Connection, key: &str) -> RepositoryResult<Option<String>> {
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub(crate) fn set_value_tx(conn: &Connection, key: &str, value: &str) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')
            "#,
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self
            .get_global_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 解析数值配置，非法时回退默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> RepositoryResult<T>
    where
        T: std::str::FromStr + ToString + Copy,
    {
        let raw = self.get_config_or_default(key, &default.to_string())?;
        Ok(raw.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!(config_key = key, raw_value = %raw, "配置值格式错误，使用默认值");
            default
        }))
    }

    // ===== 车道引擎参数 =====

    /// 加载车道引擎运行参数
    pub fn load_lane_settings(&self) -> RepositoryResult<LaneSettings> {
        let mut offset = self.get_parsed_or_default(
            config_keys::TERMINAL_UTC_OFFSET_MINUTES,
            DEFAULT_UTC_OFFSET_MINUTES,
        )?;
        if FixedOffset::east_opt(offset * 60).is_none() {
            tracing::warn!(offset_minutes = offset, "时区偏移越界，使用默认值");
            offset = DEFAULT_UTC_OFFSET_MINUTES;
        }

        let mut sweep_hour =
            self.get_parsed_or_default(config_keys::SWEEP_DAILY_HOUR, DEFAULT_SWEEP_DAILY_HOUR)?;
        if sweep_hour > 23 {
            tracing::warn!(sweep_hour, "每日清扫小时越界，使用默认值");
            sweep_hour = DEFAULT_SWEEP_DAILY_HOUR;
        }

        Ok(LaneSettings {
            utc_offset_minutes: offset,
            ticket_validity_hours: self.get_parsed_or_default(
                config_keys::TICKET_VALIDITY_HOURS,
                DEFAULT_TICKET_VALIDITY_HOURS,
            )?,
            penalty_lift_expiry_hours: self.get_parsed_or_default(
                config_keys::PENALTY_LIFT_EXPIRY_HOURS,
                DEFAULT_PENALTY_LIFT_EXPIRY_HOURS,
            )?,
            sweep_daily_hour: sweep_hour,
            route_fd_map: self.get_route_fd_map()?,
        })
    }

    /// 获取线路 → FD 映射
    ///
    /// 配置格式为 JSON: {"SanJose - Baguio": "FD4", ...}
    /// 配置不存在或格式错误时返回内置映射
    pub fn get_route_fd_map(&self) -> RepositoryResult<HashMap<String, String>> {
        let Some(raw) = self.get_global_config_value(config_keys::ROUTE_FD_MAP)? else {
            return Ok(default_route_fd_map());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_else(|_| {
            tracing::warn!(
                config_key = config_keys::ROUTE_FD_MAP,
                raw_value = %raw,
                "线路映射配置格式错误，使用内置映射"
            );
            default_route_fd_map()
        }))
    }

    // ===== 清扫记账 =====

    /// 最近一次每日清扫的本地日期
    pub fn get_sweep_last_run_date(&self) -> RepositoryResult<Option<NaiveDate>> {
        let raw = self.get_global_config_value(config_keys::SWEEP_LAST_RUN_DATE)?;
        Ok(raw.as_deref().and_then(parse_date))
    }

    pub(crate) fn set_sweep_last_run_date_tx(conn: &Connection, date: NaiveDate) -> RepositoryResult<()> {
        Self::set_value_tx(
            conn,
            config_keys::SWEEP_LAST_RUN_DATE,
            &date.format(DATE_FORMAT).to_string(),
        )
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 时区
    pub const TERMINAL_UTC_OFFSET_MINUTES: &str = "terminal_utc_offset_minutes";

    // 票据与处罚
    pub const TICKET_VALIDITY_HOURS: &str = "ticket_validity_hours";
    pub const PENALTY_LIFT_EXPIRY_HOURS: &str = "penalty_lift_expiry_hours";

    // 清扫
    pub const SWEEP_DAILY_HOUR: &str = "sweep_daily_hour";
    pub const SWEEP_LAST_RUN_DATE: &str = "sweep_last_run_date"; // 记账，非人工配置

    // 线路 → FD (JSON)
    pub const ROUTE_FD_MAP: &str = "route_fd_map";
}
