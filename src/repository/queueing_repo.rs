// ==========================================
// 单车道客运站 - 每日排班仓储
// ==========================================
// 红线: 每车牌每日至多一条未离列排班（部分唯一索引兜底）
// 说明: 排班号与预约共用 lane_counter(reservation_queue, 日期) 号段
// ==========================================

use crate::db::{format_ts, DATE_FORMAT};
use crate::domain::reservation::{NewQueueingEntry, QueueingEntry};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_mapping::{date, opt_text_enum, opt_ts, text_enum, ts};
use crate::repository::vehicle_repo::normalize_plate;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const QUEUEING_COLUMNS: &str = r#"
    queueing_id, queueing_number, driver_name, plate_number, fd, pass, status,
    queue_date, time_in, time_out, from_reservation, reservation_id, created_at
"#;

pub struct QueueingRepository {
    conn: Arc<Mutex<Connection>>,
}

impl QueueingRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockPoisoned(e.to_string()))
    }

    /// 某日排班名单（按排班号升序）
    pub fn list_for_date(&self, queue_date: NaiveDate) -> RepositoryResult<Vec<QueueingEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM queueing WHERE queue_date = ?1 ORDER BY queueing_number ASC",
            QUEUEING_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![queue_date.format(DATE_FORMAT).to_string()], map_queueing_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn find_by_id(&self, queueing_id: &str) -> RepositoryResult<Option<QueueingEntry>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, queueing_id)
    }

    // ==========================================
    // 事务内操作（关联函数）
    // ==========================================

    pub(crate) fn find_by_id_tx(
        conn: &Connection,
        queueing_id: &str,
    ) -> RepositoryResult<Option<QueueingEntry>> {
        let sql = format!("SELECT {} FROM queueing WHERE queueing_id = ?1", QUEUEING_COLUMNS);
        let row = conn
            .query_row(&sql, params![queueing_id.trim()], map_queueing_row)
            .optional()?;
        Ok(row)
    }

    /// 车牌当日是否已有未离列排班
    pub(crate) fn has_open_entry_tx(
        conn: &Connection,
        plate: &str,
        queue_date: NaiveDate,
    ) -> RepositoryResult<bool> {
        let hit = conn
            .query_row(
                r#"
                SELECT 1 FROM queueing
                WHERE plate_number = ?1 AND queue_date = ?2 AND time_out IS NULL
                LIMIT 1
                "#,
                params![normalize_plate(plate), queue_date.format(DATE_FORMAT).to_string()],
                |_row| Ok(()),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    /// 该日期已使用的最大排班号（预约与排班取大者），作为取号 floor
    pub(crate) fn max_number_for_date_tx(conn: &Connection, day: NaiveDate) -> RepositoryResult<i64> {
        let max: Option<i64> = conn.query_row(
            r#"
            SELECT MAX(n) FROM (
                SELECT MAX(queueing_number) AS n FROM reservation WHERE reservation_date = ?1
                UNION ALL
                SELECT MAX(queueing_number) AS n FROM queueing WHERE queue_date = ?1
            )
            "#,
            params![day.format(DATE_FORMAT).to_string()],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    /// 写入排班
    ///
    /// # 返回
    /// - `Err(UniqueConstraintViolation)`: 车牌当日已有未离列排班
    pub(crate) fn insert_tx(
        conn: &Connection,
        entry: &NewQueueingEntry,
        now: DateTime<Utc>,
    ) -> RepositoryResult<QueueingEntry> {
        let queueing_id = Uuid::new_v4().to_string();
        conn.execute(
            r#"
            INSERT INTO queueing (
                queueing_id, queueing_number, driver_name, plate_number, fd, pass, status,
                queue_date, time_in, time_out, from_reservation, reservation_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, ?11, ?12)
            "#,
            params![
                queueing_id,
                entry.queueing_number,
                entry.driver_name.trim(),
                normalize_plate(&entry.plate_number),
                entry.fd,
                entry.pass.as_str(),
                entry.status.map(|s| s.as_str()),
                entry.queue_date.format(DATE_FORMAT).to_string(),
                entry.time_in.map(|t| format_ts(&t)),
                entry.reservation_id.is_some(),
                entry.reservation_id,
                format_ts(&now),
            ],
        )?;

        Self::find_by_id_tx(conn, &queueing_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "Queueing".to_string(),
            id: queueing_id,
        })
    }

    /// 记录离列时刻（仅首次生效），返回是否命中
    pub(crate) fn set_time_out_tx(
        conn: &Connection,
        queueing_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let rows = conn.execute(
            "UPDATE queueing SET time_out = ?1 WHERE queueing_id = ?2 AND time_out IS NULL",
            params![format_ts(&now), queueing_id.trim()],
        )?;
        Ok(rows == 1)
    }
}

fn map_queueing_row(row: &Row) -> SqliteResult<QueueingEntry> {
    Ok(QueueingEntry {
        queueing_id: row.get(0)?,
        queueing_number: row.get(1)?,
        driver_name: row.get(2)?,
        plate_number: row.get(3)?,
        fd: row.get(4)?,
        pass: text_enum(row, 5)?,
        status: opt_text_enum(row, 6)?,
        queue_date: date(row, 7)?,
        time_in: opt_ts(row, 8)?,
        time_out: opt_ts(row, 9)?,
        from_reservation: row.get(10)?,
        reservation_id: row.get(11)?,
        created_at: ts(row, 12)?,
    })
}
