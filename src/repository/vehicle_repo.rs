// ==========================================
// 单车道客运站 - 车辆主数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑,只做数据映射
// 约束: 所有查询使用参数化
// 说明: *_tx 关联函数接受 &Connection（事务可解引用），供引擎在同一事务内组合调用
// ==========================================

use crate::db::{format_ts, DATE_FORMAT};
use crate::domain::types::{PassType, PenaltyStatus, VehicleStatus};
use crate::domain::vehicle::{NewVehicle, Vehicle};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_mapping::{opt_date, opt_text_enum, opt_ts, text_enum, ts};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const VEHICLE_COLUMNS: &str = r#"
    vehicle_id, plate_number, rfid, driver_name, route, fd, pass,
    status, penalty_status, penalty_lifted_at, expiry_date, created_at, updated_at
"#;

/// 未知线路的 FD 占位值
pub const UNKNOWN_FD: &str = "Unknown";

// ==========================================
// VehicleRepository - 车辆仓储
// ==========================================
pub struct VehicleRepository {
    conn: Arc<Mutex<Connection>>,
}

impl VehicleRepository {
    /// 创建新的车辆仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockPoisoned(e.to_string()))
    }

    // ==========================================
    // 登记（种子数据 / 外部主数据同步入口）
    // ==========================================

    /// 登记车辆
    ///
    /// # 参数
    /// - `vehicle`: 登记入参
    /// - `route_fd_map`: 线路 → FD 映射（未显式给出 FD 时使用）
    /// - `now`: 登记时间
    ///
    /// # 返回
    /// - `Ok(Vehicle)`: 已登记车辆
    /// - `Err(UniqueConstraintViolation)`: 车牌重复
    pub fn register(
        &self,
        vehicle: &NewVehicle,
        route_fd_map: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Vehicle> {
        let plate = normalize_plate(&vehicle.plate_number);
        if plate.is_empty() {
            return Err(RepositoryError::InvalidField {
                field: "plate_number".to_string(),
                message: "车牌号不能为空".to_string(),
            });
        }

        let fd = vehicle
            .fd
            .clone()
            .or_else(|| route_fd_map.get(vehicle.route.trim()).cloned())
            .unwrap_or_else(|| UNKNOWN_FD.to_string());

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO vehicle (
                vehicle_id, plate_number, rfid, driver_name, route, fd, pass,
                status, penalty_status, penalty_lifted_at, expiry_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'Ok', 'None', NULL, ?8, ?9, NULL)
            "#,
            params![
                Uuid::new_v4().to_string(),
                plate,
                vehicle.rfid.as_deref().map(str::trim),
                vehicle.driver_name.trim(),
                vehicle.route.trim(),
                fd,
                vehicle.pass.map(|p| p.as_str()),
                vehicle.expiry_date.map(|d| d.format(DATE_FORMAT).to_string()),
                format_ts(&now),
            ],
        )?;

        Self::find_by_plate_tx(&conn, &plate)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "Vehicle".to_string(),
            id: plate,
        })
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 按车牌查询
    pub fn find_by_plate(&self, plate: &str) -> RepositoryResult<Option<Vehicle>> {
        let conn = self.get_conn()?;
        Self::find_by_plate_tx(&conn, plate)
    }

    /// 按 RFID 或车牌查询
    pub fn find_by_identifier(&self, identifier: &str) -> RepositoryResult<Option<Vehicle>> {
        let conn = self.get_conn()?;
        Self::find_by_identifier_tx(&conn, identifier)
    }

    /// 查询处于处罚状态的车辆（按登记时间倒序）
    pub fn list_penalized(&self) -> RepositoryResult<Vec<Vehicle>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM vehicle WHERE penalty_status = 'Penalty' ORDER BY created_at DESC",
            VEHICLE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let vehicles = stmt
            .query_map([], map_vehicle_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(vehicles)
    }

    /// 车牌子串联想（大小写不敏感，按车牌排序）
    pub fn search_by_plate_fragment(&self, fragment: &str, limit: usize) -> RepositoryResult<Vec<Vehicle>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM vehicle
            WHERE instr(plate_number, ?1) > 0
            ORDER BY plate_number
            LIMIT ?2
            "#,
            VEHICLE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let vehicles = stmt
            .query_map(params![normalize_plate(fragment), limit as i64], map_vehicle_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(vehicles)
    }

    /// 统计处于处罚状态的车辆数
    pub fn count_penalized(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM vehicle WHERE penalty_status = 'Penalty'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==========================================
    // 事务内操作（关联函数）
    // ==========================================

    pub(crate) fn find_by_plate_tx(conn: &Connection, plate: &str) -> RepositoryResult<Option<Vehicle>> {
        let sql = format!("SELECT {} FROM vehicle WHERE plate_number = ?1", VEHICLE_COLUMNS);
        let vehicle = conn
            .query_row(&sql, params![normalize_plate(plate)], map_vehicle_row)
            .optional()?;
        Ok(vehicle)
    }

    /// RFID 精确匹配优先，其次车牌（大小写不敏感）
    pub(crate) fn find_by_identifier_tx(
        conn: &Connection,
        identifier: &str,
    ) -> RepositoryResult<Option<Vehicle>> {
        let ident = identifier.trim();
        if ident.is_empty() {
            return Ok(None);
        }

        let sql = format!(
            r#"
            SELECT {} FROM vehicle
            WHERE rfid = ?1 OR plate_number = ?2
            ORDER BY CASE WHEN rfid = ?1 THEN 0 ELSE 1 END
            LIMIT 1
            "#,
            VEHICLE_COLUMNS
        );
        let vehicle = conn
            .query_row(&sql, params![ident, normalize_plate(ident)], map_vehicle_row)
            .optional()?;
        Ok(vehicle)
    }

    /// 持久化默认通行证
    pub(crate) fn set_pass_tx(
        conn: &Connection,
        plate: &str,
        pass: PassType,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "UPDATE vehicle SET pass = ?1, updated_at = ?2 WHERE plate_number = ?3",
            params![pass.as_str(), format_ts(&now), normalize_plate(plate)],
        )?;
        Ok(rows)
    }

    /// 设置处罚状态
    ///
    /// `lifted_at` 仅在解除处罚时给出；其余情况保持原值
    pub(crate) fn set_penalty_tx(
        conn: &Connection,
        plate: &str,
        status: PenaltyStatus,
        lifted_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE vehicle
            SET penalty_status = ?1,
                penalty_lifted_at = COALESCE(?2, penalty_lifted_at),
                updated_at = ?3
            WHERE plate_number = ?4
            "#,
            params![
                status.as_str(),
                lifted_at.map(|t| format_ts(&t)),
                format_ts(&now),
                normalize_plate(plate)
            ],
        )?;
        Ok(rows)
    }

    /// 登记到期: 到期日 ≤ today 且状态仍为 Ok 的车辆 → Expired
    ///
    /// 返回 (当日到期数, 补偿的历史到期数)
    pub(crate) fn expire_registrations_tx(
        conn: &Connection,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> RepositoryResult<(usize, usize)> {
        let today_str = today.format(DATE_FORMAT).to_string();
        let now_str = format_ts(&now);

        let due_today = conn.execute(
            r#"
            UPDATE vehicle SET status = ?1, updated_at = ?2
            WHERE status = ?3 AND expiry_date = ?4
            "#,
            params![
                VehicleStatus::Expired.as_str(),
                now_str,
                VehicleStatus::Ok.as_str(),
                today_str
            ],
        )?;

        let catch_up = conn.execute(
            r#"
            UPDATE vehicle SET status = ?1, updated_at = ?2
            WHERE status = ?3 AND expiry_date IS NOT NULL AND expiry_date < ?4
            "#,
            params![
                VehicleStatus::Expired.as_str(),
                now_str,
                VehicleStatus::Ok.as_str(),
                today_str
            ],
        )?;

        Ok((due_today, catch_up))
    }

    /// 已解除处罚满期的车辆: Lifted → None
    ///
    /// 以 penalty_lifted_at 为准，缺失时依次回退 updated_at、created_at；
    /// 登记到期等其它写入只改 updated_at，不影响解除计时
    pub(crate) fn reset_lifted_penalties_tx(
        conn: &Connection,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE vehicle SET penalty_status = 'None', updated_at = ?1
            WHERE penalty_status = 'Lifted'
              AND COALESCE(penalty_lifted_at, updated_at, created_at) <= ?2
            "#,
            params![format_ts(&now), format_ts(&cutoff)],
        )?;
        Ok(rows)
    }
}

/// 车牌统一格式: 去空白 + 大写
pub fn normalize_plate(plate: &str) -> String {
    plate.trim().to_uppercase()
}

fn map_vehicle_row(row: &Row) -> SqliteResult<Vehicle> {
    Ok(Vehicle {
        vehicle_id: row.get(0)?,
        plate_number: row.get(1)?,
        rfid: row.get(2)?,
        driver_name: row.get(3)?,
        route: row.get(4)?,
        fd: row.get(5)?,
        pass: opt_text_enum(row, 6)?,
        status: text_enum(row, 7)?,
        penalty_status: text_enum(row, 8)?,
        penalty_lifted_at: opt_ts(row, 9)?,
        expiry_date: opt_date(row, 10)?,
        created_at: ts(row, 11)?,
        updated_at: opt_ts(row, 12)?,
    })
}
