use super::core::{map_entry_log_row, EntryLogRepository, ENTRY_LOG_COLUMNS};
use crate::db::format_ts;
use crate::domain::entry_log::{DashboardCounts, EntryLogEntry};
use crate::domain::types::{LaneAction, LaneState, Touchdown};
use crate::repository::error::RepositoryResult;
use crate::repository::vehicle_repo::normalize_plate;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};

impl EntryLogRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 最近的通行记录（按进场时间倒序）
    pub fn recent(&self, limit: usize) -> RepositoryResult<Vec<EntryLogEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM entry_log ORDER BY time_in DESC, entry_log_id DESC LIMIT ?1",
            ENTRY_LOG_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![limit as i64], map_entry_log_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 按车牌 + touchdown 查询（按出场时间倒序）
    pub fn find_by_plate_and_touchdown(
        &self,
        plate: &str,
        touchdown: Touchdown,
    ) -> RepositoryResult<Vec<EntryLogEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM entry_log
            WHERE plate_number = ?1 AND touchdown = ?2
            ORDER BY time_out DESC, entry_log_id DESC
            "#,
            ENTRY_LOG_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(
                params![normalize_plate(plate), touchdown.as_str()],
                map_entry_log_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 按主键查询
    pub fn find_by_id(&self, entry_log_id: i64) -> RepositoryResult<Option<EntryLogEntry>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, entry_log_id)
    }

    /// 车牌最近一次出场的记录（处罚列表的原因来源）
    pub fn latest_exit_for_plate(&self, plate: &str) -> RepositoryResult<Option<EntryLogEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM entry_log
            WHERE plate_number = ?1
            ORDER BY time_out DESC, entry_log_id DESC
            LIMIT 1
            "#,
            ENTRY_LOG_COLUMNS
        );
        let log = conn
            .query_row(&sql, params![normalize_plate(plate)], map_entry_log_row)
            .optional()?;
        Ok(log)
    }

    /// 当日完成趟次统计
    ///
    /// 口径: time_out ≥ since 且 touchdown ≠ ongoing，按通行证拆分
    pub fn dashboard_counts(&self, since: DateTime<Utc>) -> RepositoryResult<DashboardCounts> {
        let conn = self.get_conn()?;
        let counts = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN pass = 'Pila' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN pass = 'Taxi' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN pass = 'SP' THEN 1 ELSE 0 END), 0)
            FROM entry_log
            WHERE time_out >= ?1 AND touchdown <> ?2
            "#,
            params![format_ts(&since), Touchdown::Ongoing.as_str()],
            |row| {
                Ok(DashboardCounts {
                    total_trips: row.get(0)?,
                    pila_count: row.get(1)?,
                    taxi_count: row.get(2)?,
                    special_pass_count: row.get(3)?,
                })
            },
        )?;
        Ok(counts)
    }

    // ==========================================
    // 事务内查询（关联函数）
    // ==========================================

    pub(crate) fn find_by_id_tx(
        conn: &Connection,
        entry_log_id: i64,
    ) -> RepositoryResult<Option<EntryLogEntry>> {
        let sql = format!("SELECT {} FROM entry_log WHERE entry_log_id = ?1", ENTRY_LOG_COLUMNS);
        let log = conn
            .query_row(&sql, params![entry_log_id], map_entry_log_row)
            .optional()?;
        Ok(log)
    }

    /// 车辆最近一条记录（按分配时间，同时间按主键）
    pub(crate) fn latest_for_vehicle_tx(
        conn: &Connection,
        vehicle_id: &str,
    ) -> RepositoryResult<Option<EntryLogEntry>> {
        let sql = format!(
            r#"
            SELECT {} FROM entry_log
            WHERE vehicle_id = ?1
            ORDER BY logged_at DESC, entry_log_id DESC
            LIMIT 1
            "#,
            ENTRY_LOG_COLUMNS
        );
        let log = conn
            .query_row(&sql, params![vehicle_id], map_entry_log_row)
            .optional()?;
        Ok(log)
    }

    /// 车牌当前未清除的记录（至多一条）
    pub(crate) fn open_for_plate_tx(
        conn: &Connection,
        plate: &str,
    ) -> RepositoryResult<Option<EntryLogEntry>> {
        let sql = format!(
            "SELECT {} FROM entry_log WHERE plate_number = ?1 AND cleared = 0",
            ENTRY_LOG_COLUMNS
        );
        let log = conn
            .query_row(&sql, params![normalize_plate(plate)], map_entry_log_row)
            .optional()?;
        Ok(log)
    }

    /// 检查点是否已有未清除记录（active 或 queued）
    pub(crate) fn has_open_for_action_tx(
        conn: &Connection,
        action: LaneAction,
    ) -> RepositoryResult<bool> {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM entry_log WHERE action = ?1 AND cleared = 0)",
            params![action.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists != 0)
    }

    /// 检查点指定状态的未清除记录（FIFO 顺序）
    pub(crate) fn list_open_tx(
        conn: &Connection,
        action: LaneAction,
        lane_state: LaneState,
    ) -> RepositoryResult<Vec<EntryLogEntry>> {
        let sql = format!(
            r#"
            SELECT {} FROM entry_log
            WHERE action = ?1 AND lane_state = ?2 AND cleared = 0
            ORDER BY logged_at, entry_log_id
            "#,
            ENTRY_LOG_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![action.as_str(), lane_state.as_str()], map_entry_log_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 排队位置（从 1 开始）
    pub(crate) fn queue_position_tx(conn: &Connection, log: &EntryLogEntry) -> RepositoryResult<i64> {
        let ahead: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM entry_log
            WHERE action = ?1 AND lane_state = 'queued' AND cleared = 0
              AND (logged_at < ?2 OR (logged_at = ?2 AND entry_log_id < ?3))
            "#,
            params![log.action.as_str(), format_ts(&log.logged_at), log.entry_log_id],
            |row| row.get(0),
        )?;
        Ok(ahead + 1)
    }

    /// 按车牌 + 票号查询（同一票号优先取出场记录）
    pub(crate) fn find_by_plate_and_ticket_tx(
        conn: &Connection,
        plate: &str,
        ticket_id: &str,
    ) -> RepositoryResult<Option<EntryLogEntry>> {
        let sql = format!(
            r#"
            SELECT {} FROM entry_log
            WHERE plate_number = ?1 AND ticket_id = ?2
            ORDER BY CASE WHEN action = 'exit' THEN 0 ELSE 1 END, logged_at DESC, entry_log_id DESC
            LIMIT 1
            "#,
            ENTRY_LOG_COLUMNS
        );
        let log = conn
            .query_row(&sql, params![normalize_plate(plate), ticket_id], map_entry_log_row)
            .optional()?;
        Ok(log)
    }

    /// 访问的进场时间（取该访问所有记录中最早的 time_in）
    pub(crate) fn visit_time_in_tx(
        conn: &Connection,
        visit_id: &str,
    ) -> RepositoryResult<Option<DateTime<Utc>>> {
        let raw: Option<String> = conn.query_row(
            "SELECT MIN(time_in) FROM entry_log WHERE visit_id = ?1",
            params![visit_id],
            |row| row.get(0),
        )?;
        Ok(raw.as_deref().and_then(crate::db::parse_ts))
    }

    /// 指定时刻之后进场记录的最大排队号（计数器下限）
    pub(crate) fn max_queue_number_since_tx(
        conn: &Connection,
        since: DateTime<Utc>,
    ) -> RepositoryResult<i64> {
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(queue_number) FROM entry_log WHERE time_in >= ?1",
            params![format_ts(&since)],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    /// 已发出票号的最大值（计数器下限）
    pub(crate) fn max_ticket_number_tx(conn: &Connection) -> RepositoryResult<i64> {
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(CAST(ticket_id AS INTEGER)) FROM entry_log WHERE ticket_id IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }
}
