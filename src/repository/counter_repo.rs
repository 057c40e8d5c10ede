// ==========================================
// 单车道客运站 - 原子计数器仓储
// ==========================================
// 用途: 排队号（按本地日期分期）、票号（全局）、排班号（按预约/排班日期分期）
// 红线: 取号必须是单条 UPSERT ... RETURNING，禁止“先读后写”
// 说明: floor 为业务表中已存在的最大值，保证导入的历史数据不被重号
// ==========================================

use crate::db::format_ts;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

/// 计数器用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterPurpose {
    QueueNumber,
    TicketId,
    ReservationQueue,
}

impl CounterPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterPurpose::QueueNumber => "queue_number",
            CounterPurpose::TicketId => "ticket_id",
            CounterPurpose::ReservationQueue => "reservation_queue",
        }
    }
}

/// 全局计数器的分期键
pub const GLOBAL_PERIOD: &str = "global";

// ==========================================
// LaneCounterRepository - 计数器仓储
// ==========================================
pub struct LaneCounterRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LaneCounterRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockPoisoned(e.to_string()))
    }

    /// 查看计数器当前值（不消耗）
    pub fn current(&self, purpose: CounterPurpose, period: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Self::current_tx(&conn, purpose, period)
    }

    pub(crate) fn current_tx(
        conn: &Connection,
        purpose: CounterPurpose,
        period: &str,
    ) -> RepositoryResult<i64> {
        let value: Option<i64> = conn
            .query_row(
                "SELECT value FROM lane_counter WHERE purpose = ?1 AND period = ?2",
                params![purpose.as_str(), period],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0))
    }

    /// 取下一个值
    ///
    /// 新值 = max(当前值, floor) + 1
    pub(crate) fn next_value_tx(
        conn: &Connection,
        purpose: CounterPurpose,
        period: &str,
        floor: i64,
        now: DateTime<Utc>,
    ) -> RepositoryResult<i64> {
        let value = conn.query_row(
            r#"
            INSERT INTO lane_counter (purpose, period, value, updated_at)
            VALUES (?1, ?2, ?3 + 1, ?4)
            ON CONFLICT(purpose, period) DO UPDATE
              SET value = MAX(lane_counter.value, ?3) + 1,
                  updated_at = excluded.updated_at
            RETURNING value
            "#,
            params![purpose.as_str(), period, floor, format_ts(&now)],
            |row| row.get(0),
        )?;
        Ok(value)
    }
}
