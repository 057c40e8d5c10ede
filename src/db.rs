// ==========================================
// 单车道客运站 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 统一建表（幂等），部分唯一索引在存储层兜底车道互斥
// ==========================================

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// 时间戳存储格式（UTC，定长，字典序即时间序）
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 日期存储格式
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化 schema（幂等）
///
/// 表:
/// - vehicle: 车辆主数据
/// - entry_log: 通行记录（只增改不删）
/// - lane_counter: 排队号/票号/排班号原子计数器
/// - reservation: 排班预约
/// - queueing: 每日排班名单
/// - config_kv: 配置
/// - schema_version: 版本
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL DEFAULT 'global',
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS vehicle (
            plate_number TEXT PRIMARY KEY,
            vehicle_id TEXT NOT NULL UNIQUE,
            rfid TEXT,
            driver_name TEXT NOT NULL,
            route TEXT NOT NULL,
            fd TEXT,
            pass TEXT,
            status TEXT NOT NULL DEFAULT 'Ok',
            penalty_status TEXT NOT NULL DEFAULT 'None',
            penalty_lifted_at TEXT,
            expiry_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_vehicle_rfid ON vehicle(rfid);
        CREATE INDEX IF NOT EXISTS idx_vehicle_penalty ON vehicle(penalty_status);

        CREATE TABLE IF NOT EXISTS entry_log (
            entry_log_id INTEGER PRIMARY KEY AUTOINCREMENT,
            visit_id TEXT NOT NULL,
            vehicle_id TEXT NOT NULL REFERENCES vehicle(vehicle_id),
            plate_number TEXT NOT NULL,
            action TEXT NOT NULL CHECK (action IN ('entry', 'exit')),
            lane_state TEXT NOT NULL CHECK (lane_state IN ('active', 'queued')),
            logged_at TEXT NOT NULL,
            cleared INTEGER NOT NULL DEFAULT 0,
            time_in TEXT,
            time_out TEXT,
            route TEXT,
            fd TEXT,
            pass TEXT,
            queue_number INTEGER,
            touchdown TEXT NOT NULL DEFAULT 'processing',
            ticket_id TEXT,
            qr_payload TEXT
        );

        -- 每个车牌至多一条未清除记录
        CREATE UNIQUE INDEX IF NOT EXISTS uq_entry_log_open_plate
          ON entry_log(plate_number) WHERE cleared = 0;

        -- 每个检查点至多一辆 active 车辆
        CREATE UNIQUE INDEX IF NOT EXISTS uq_entry_log_active_action
          ON entry_log(action) WHERE cleared = 0 AND lane_state = 'active';

        CREATE INDEX IF NOT EXISTS idx_entry_log_queue
          ON entry_log(action, lane_state, cleared, logged_at);
        CREATE INDEX IF NOT EXISTS idx_entry_log_plate_ts
          ON entry_log(plate_number, logged_at);
        CREATE INDEX IF NOT EXISTS idx_entry_log_ticket
          ON entry_log(plate_number, ticket_id);
        CREATE INDEX IF NOT EXISTS idx_entry_log_visit
          ON entry_log(visit_id);

        CREATE TABLE IF NOT EXISTS lane_counter (
            purpose TEXT NOT NULL,
            period TEXT NOT NULL,
            value INTEGER NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (purpose, period)
        );

        CREATE TABLE IF NOT EXISTS reservation (
            reservation_id TEXT PRIMARY KEY,
            queueing_number INTEGER NOT NULL,
            driver_name TEXT NOT NULL,
            plate_number TEXT NOT NULL REFERENCES vehicle(plate_number),
            route TEXT NOT NULL,
            reservation_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'Reserved'
              CHECK (status IN ('Reserved', 'Cancelled', 'Transferred')),
            created_at TEXT NOT NULL,
            updated_at TEXT
        );

        -- 每个车牌每日至多一条有效预约
        CREATE UNIQUE INDEX IF NOT EXISTS uq_reservation_active_plate_date
          ON reservation(plate_number, reservation_date) WHERE status = 'Reserved';

        CREATE INDEX IF NOT EXISTS idx_reservation_date
          ON reservation(reservation_date, status, queueing_number);

        CREATE TABLE IF NOT EXISTS queueing (
            queueing_id TEXT PRIMARY KEY,
            queueing_number INTEGER NOT NULL,
            driver_name TEXT NOT NULL,
            plate_number TEXT NOT NULL REFERENCES vehicle(plate_number),
            fd TEXT,
            pass TEXT NOT NULL DEFAULT 'Pila',
            status TEXT,
            queue_date TEXT NOT NULL,
            time_in TEXT,
            time_out TEXT,
            from_reservation INTEGER NOT NULL DEFAULT 0,
            reservation_id TEXT REFERENCES reservation(reservation_id),
            created_at TEXT NOT NULL
        );

        -- 每个车牌每日至多一条未离列排班
        CREATE UNIQUE INDEX IF NOT EXISTS uq_queueing_open_plate_date
          ON queueing(plate_number, queue_date) WHERE time_out IS NULL;

        CREATE INDEX IF NOT EXISTS idx_queueing_date
          ON queueing(queue_date, queueing_number);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

// ==========================================
// 时间字段编解码
// ==========================================

/// UTC 时间 → 存储字符串
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// 存储字符串 → UTC 时间
///
/// 兼容无毫秒的旧格式与 RFC3339
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
}

/// 存储字符串 → 日期
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_schema_version_absent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }

    #[test]
    fn test_ts_format_preserves_order_and_millis() {
        let a = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(5);
        assert!(format_ts(&a) < format_ts(&b));
        assert_eq!(parse_ts(&format_ts(&b)), Some(b));
        assert_eq!(parse_ts("2025-03-01 10:00:00"), Some(a));
    }
}
