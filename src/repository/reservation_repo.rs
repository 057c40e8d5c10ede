// ==========================================
// 单车道客运站 - 排班预约仓储
// ==========================================
// 红线: 预约只改状态不删除（取消保留记录）
// 红线: 每车牌每日一条有效预约由部分唯一索引兜底
// ==========================================

use crate::db::{format_ts, DATE_FORMAT};
use crate::domain::reservation::{PastReservationFilter, Reservation, ReservationStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_mapping::{date, opt_ts, text_enum, ts};
use crate::repository::vehicle_repo::normalize_plate;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const RESERVATION_COLUMNS: &str = r#"
    reservation_id, queueing_number, driver_name, plate_number, route,
    reservation_date, status, created_at, updated_at
"#;

pub struct ReservationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReservationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockPoisoned(e.to_string()))
    }

    pub fn find_by_id(&self, reservation_id: &str) -> RepositoryResult<Option<Reservation>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, reservation_id)
    }

    /// 指定日期、指定状态的预约（按排班号升序）
    pub fn list_by_date(
        &self,
        reservation_date: NaiveDate,
        status: ReservationStatus,
    ) -> RepositoryResult<Vec<Reservation>> {
        let conn = self.get_conn()?;
        Self::list_by_date_tx(&conn, reservation_date, status)
    }

    /// 历史预约（日期倒序，同日按排班号升序）
    ///
    /// 未指定日期时取 `today` 之前的全部预约；指定日期时只取该日
    pub fn list_past(
        &self,
        today: NaiveDate,
        filter: &PastReservationFilter,
    ) -> RepositoryResult<Vec<Reservation>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        match filter.date {
            Some(day) => {
                clauses.push("reservation_date = ?");
                values.push(Value::Text(day.format(DATE_FORMAT).to_string()));
            }
            None => {
                clauses.push("reservation_date < ?");
                values.push(Value::Text(today.format(DATE_FORMAT).to_string()));
            }
        }
        if let Some(plate) = filter.plate_number.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            clauses.push("instr(upper(plate_number), upper(?)) > 0");
            values.push(Value::Text(plate.to_string()));
        }
        if let Some(driver) = filter.driver_name.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            clauses.push("instr(upper(driver_name), upper(?)) > 0");
            values.push(Value::Text(driver.to_string()));
        }

        let sql = format!(
            "SELECT {} FROM reservation WHERE {} ORDER BY reservation_date DESC, queueing_number ASC",
            RESERVATION_COLUMNS,
            clauses.join(" AND ")
        );

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), map_reservation_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    // ==========================================
    // 事务内操作（关联函数）
    // ==========================================

    pub(crate) fn find_by_id_tx(
        conn: &Connection,
        reservation_id: &str,
    ) -> RepositoryResult<Option<Reservation>> {
        let sql = format!("SELECT {} FROM reservation WHERE reservation_id = ?1", RESERVATION_COLUMNS);
        let row = conn
            .query_row(&sql, params![reservation_id.trim()], map_reservation_row)
            .optional()?;
        Ok(row)
    }

    /// 车牌在该日期的有效预约
    pub(crate) fn find_reserved_tx(
        conn: &Connection,
        plate: &str,
        reservation_date: NaiveDate,
    ) -> RepositoryResult<Option<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservation WHERE plate_number = ?1 AND reservation_date = ?2 AND status = ?3",
            RESERVATION_COLUMNS
        );
        let row = conn
            .query_row(
                &sql,
                params![
                    normalize_plate(plate),
                    reservation_date.format(DATE_FORMAT).to_string(),
                    ReservationStatus::Reserved.as_str()
                ],
                map_reservation_row,
            )
            .optional()?;
        Ok(row)
    }

    pub(crate) fn list_by_date_tx(
        conn: &Connection,
        reservation_date: NaiveDate,
        status: ReservationStatus,
    ) -> RepositoryResult<Vec<Reservation>> {
        let sql = format!(
            r#"
            SELECT {} FROM reservation
            WHERE reservation_date = ?1 AND status = ?2
            ORDER BY queueing_number ASC
            "#,
            RESERVATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![reservation_date.format(DATE_FORMAT).to_string(), status.as_str()],
                map_reservation_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 写入有效预约
    ///
    /// # 返回
    /// - `Err(UniqueConstraintViolation)`: 同车牌同日已有有效预约
    pub(crate) fn insert_tx(
        conn: &Connection,
        queueing_number: i64,
        driver_name: &str,
        plate: &str,
        route: &str,
        reservation_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Reservation> {
        let reservation_id = Uuid::new_v4().to_string();
        conn.execute(
            r#"
            INSERT INTO reservation (
                reservation_id, queueing_number, driver_name, plate_number, route,
                reservation_date, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)
            "#,
            params![
                reservation_id,
                queueing_number,
                driver_name.trim(),
                normalize_plate(plate),
                route,
                reservation_date.format(DATE_FORMAT).to_string(),
                ReservationStatus::Reserved.as_str(),
                format_ts(&now),
            ],
        )?;

        Self::find_by_id_tx(conn, &reservation_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "Reservation".to_string(),
            id: reservation_id,
        })
    }

    /// 条件状态迁移: 仅当当前状态为 `from` 时生效，返回是否命中
    pub(crate) fn transition_tx(
        conn: &Connection,
        reservation_id: &str,
        from: ReservationStatus,
        to: ReservationStatus,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let rows = conn.execute(
            "UPDATE reservation SET status = ?1, updated_at = ?2 WHERE reservation_id = ?3 AND status = ?4",
            params![to.as_str(), format_ts(&now), reservation_id, from.as_str()],
        )?;
        Ok(rows == 1)
    }
}

fn map_reservation_row(row: &Row) -> SqliteResult<Reservation> {
    Ok(Reservation {
        reservation_id: row.get(0)?,
        queueing_number: row.get(1)?,
        driver_name: row.get(2)?,
        plate_number: row.get(3)?,
        route: row.get(4)?,
        reservation_date: date(row, 5)?,
        status: text_enum(row, 6)?,
        created_at: ts(row, 7)?,
        updated_at: opt_ts(row, 8)?,
    })
}
