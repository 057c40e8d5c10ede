use crate::db::format_ts;
use crate::domain::entry_log::{EntryLogEntry, NewEntryLog};
use crate::domain::types::{LaneAction, LaneState, PassType, Touchdown};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_mapping::{opt_text_enum, opt_ts, text_enum, ts};
use crate::repository::vehicle_repo::normalize_plate;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

pub(super) const ENTRY_LOG_COLUMNS: &str = r#"
    entry_log_id, visit_id, vehicle_id, plate_number, action, lane_state,
    logged_at, cleared, time_in, time_out, route, fd, pass,
    queue_number, touchdown, ticket_id, qr_payload
"#;

// ==========================================
// EntryLogRepository - 通行记录仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
pub struct EntryLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EntryLogRepository {
    /// 创建新的通行记录仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    pub(super) fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockPoisoned(e.to_string()))
    }

    // ==========================================
    // 写入操作（事务内）
    // ==========================================

    /// 插入通行记录
    ///
    /// # 返回
    /// - `Ok(entry_log_id)`: 新记录主键
    /// - `Err(UniqueConstraintViolation)`: 同车牌已有未清除记录，或检查点已有 active 车辆
    pub(crate) fn insert_tx(conn: &Connection, log: &NewEntryLog) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO entry_log (
                visit_id, vehicle_id, plate_number, action, lane_state,
                logged_at, cleared, time_in, route, fd, pass, queue_number, touchdown
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                log.visit_id,
                log.vehicle_id,
                log.plate_number,
                log.action.as_str(),
                log.lane_state.as_str(),
                format_ts(&log.logged_at),
                log.time_in.map(|t| format_ts(&t)),
                log.route,
                log.fd,
                log.pass.map(|p| p.as_str()),
                log.queue_number,
                Touchdown::Processing.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 将已清除的进场记录原地重新打开为出场
    ///
    /// 条件: 记录必须处于 cleared=1；返回是否命中
    /// 重新打开的记录 touchdown 回到 processing
    pub(crate) fn reopen_for_exit_tx(
        conn: &Connection,
        entry_log_id: i64,
        lane_state: LaneState,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let rows = conn.execute(
            r#"
            UPDATE entry_log
            SET action = ?1, lane_state = ?2, logged_at = ?3, touchdown = ?4, cleared = 0
            WHERE entry_log_id = ?5 AND cleared = 1
            "#,
            params![
                LaneAction::Exit.as_str(),
                lane_state.as_str(),
                format_ts(&now),
                Touchdown::Processing.as_str(),
                entry_log_id
            ],
        )?;
        Ok(rows == 1)
    }

    /// 原子清除车牌的未清除记录
    ///
    /// 条件 UPDATE ... RETURNING: 并发下只有一个调用方能拿到记录
    pub(crate) fn clear_open_for_plate_tx(
        conn: &Connection,
        plate: &str,
    ) -> RepositoryResult<Option<EntryLogEntry>> {
        let sql = format!(
            "UPDATE entry_log SET cleared = 1 WHERE plate_number = ?1 AND cleared = 0 RETURNING {}",
            ENTRY_LOG_COLUMNS
        );
        let log = conn
            .query_row(&sql, params![normalize_plate(plate)], map_entry_log_row)
            .optional()?;
        Ok(log)
    }

    /// 出场登记: 写入出场时间、票据与 touchdown
    pub(crate) fn stamp_exit_tx(
        conn: &Connection,
        entry_log_id: i64,
        time_out: DateTime<Utc>,
        ticket_id: &str,
        qr_payload: &str,
        touchdown: Touchdown,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE entry_log
            SET action = ?1, time_out = ?2, ticket_id = ?3, qr_payload = ?4, touchdown = ?5
            WHERE entry_log_id = ?6
            "#,
            params![
                LaneAction::Exit.as_str(),
                format_ts(&time_out),
                ticket_id,
                qr_payload,
                touchdown.as_str(),
                entry_log_id
            ],
        )?;
        Ok(rows)
    }

    /// 将票据与出场时间回填到同一访问的其他记录
    pub(crate) fn backfill_visit_ticket_tx(
        conn: &Connection,
        visit_id: &str,
        exclude_entry_log_id: i64,
        time_out: DateTime<Utc>,
        ticket_id: &str,
        qr_payload: &str,
        touchdown: Touchdown,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE entry_log
            SET time_out = ?1, ticket_id = ?2, qr_payload = ?3, touchdown = ?4
            WHERE visit_id = ?5 AND entry_log_id <> ?6 AND action = ?7
            "#,
            params![
                format_ts(&time_out),
                ticket_id,
                qr_payload,
                touchdown.as_str(),
                visit_id,
                exclude_entry_log_id,
                LaneAction::Entry.as_str()
            ],
        )?;
        Ok(rows)
    }

    /// 设置同一访问下所有记录的 touchdown
    pub(crate) fn set_visit_touchdown_tx(
        conn: &Connection,
        visit_id: &str,
        touchdown: Touchdown,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "UPDATE entry_log SET touchdown = ?1 WHERE visit_id = ?2",
            params![touchdown.as_str(), visit_id],
        )?;
        Ok(rows)
    }

    /// 设置单条记录的 touchdown
    pub(crate) fn set_touchdown_tx(
        conn: &Connection,
        entry_log_id: i64,
        touchdown: Touchdown,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "UPDATE entry_log SET touchdown = ?1 WHERE entry_log_id = ?2",
            params![touchdown.as_str(), entry_log_id],
        )?;
        Ok(rows)
    }

    /// 提升队首车辆为 active
    ///
    /// 单条 UPDATE 内同时完成:
    /// - 选取 (logged_at, entry_log_id) 最小的排队记录
    /// - 校验该检查点当前无 active 记录
    ///
    /// # 返回
    /// - `Ok(Some(id))`: 被提升的记录
    /// - `Ok(None)`: 无排队车辆或检查点仍被占用
    pub(crate) fn promote_next_tx(
        conn: &Connection,
        action: LaneAction,
    ) -> RepositoryResult<Option<i64>> {
        let promoted = conn
            .query_row(
                r#"
                UPDATE entry_log SET lane_state = 'active'
                WHERE entry_log_id = (
                    SELECT entry_log_id FROM entry_log
                    WHERE action = ?1 AND lane_state = 'queued' AND cleared = 0
                    ORDER BY logged_at, entry_log_id
                    LIMIT 1
                )
                AND NOT EXISTS (
                    SELECT 1 FROM entry_log
                    WHERE action = ?1 AND lane_state = 'active' AND cleared = 0
                )
                RETURNING entry_log_id
                "#,
                params![action.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(promoted)
    }

    // ==========================================
    // 未清除记录的人工调整
    // ==========================================

    /// 修改未清除记录的通行证
    ///
    /// Pila 时写入给定排队号（未给出则保留原值）；Taxi/SP 清空排队号
    ///
    /// # 返回
    /// - `Ok(Some(log))`: 修改后的记录
    /// - `Ok(None)`: 该车牌无未清除记录
    pub fn update_active_pass(
        &self,
        plate: &str,
        pass: PassType,
        queue_number: Option<i64>,
    ) -> RepositoryResult<Option<EntryLogEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            UPDATE entry_log
            SET pass = ?1,
                queue_number = CASE WHEN ?1 = 'Pila' THEN COALESCE(?2, queue_number) ELSE NULL END
            WHERE plate_number = ?3 AND cleared = 0
            RETURNING {}
            "#,
            ENTRY_LOG_COLUMNS
        );
        let log = conn
            .query_row(&sql, params![pass.as_str(), queue_number, normalize_plate(plate)], map_entry_log_row)
            .optional()?;
        Ok(log)
    }

    /// 修改未清除记录的 FD 快照（车辆主数据不变）
    pub fn update_active_fd(&self, plate: &str, fd: &str) -> RepositoryResult<Option<EntryLogEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "UPDATE entry_log SET fd = ?1 WHERE plate_number = ?2 AND cleared = 0 RETURNING {}",
            ENTRY_LOG_COLUMNS
        );
        let log = conn
            .query_row(&sql, params![fd.trim(), normalize_plate(plate)], map_entry_log_row)
            .optional()?;
        Ok(log)
    }
}

/// 行映射（列顺序与 ENTRY_LOG_COLUMNS 一致）
pub(super) fn map_entry_log_row(row: &Row) -> SqliteResult<EntryLogEntry> {
    Ok(EntryLogEntry {
        entry_log_id: row.get(0)?,
        visit_id: row.get(1)?,
        vehicle_id: row.get(2)?,
        plate_number: row.get(3)?,
        action: text_enum(row, 4)?,
        lane_state: text_enum(row, 5)?,
        logged_at: ts(row, 6)?,
        cleared: row.get::<_, i64>(7)? != 0,
        time_in: opt_ts(row, 8)?,
        time_out: opt_ts(row, 9)?,
        route: row.get(10)?,
        fd: row.get(11)?,
        pass: opt_text_enum(row, 12)?,
        queue_number: row.get(13)?,
        touchdown: text_enum(row, 14)?,
        ticket_id: row.get(15)?,
        qr_payload: row.get(16)?,
    })
}
