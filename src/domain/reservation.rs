// ==========================================
// 单车道客运站 - 预约与每日排班领域模型
// ==========================================
// 预约: 司机为某一本地日期预订排班号（每车牌每日至多一条有效预约）
// 排班: 当日排班名单，来源为预约转入或现场登记（walk-in）
// 红线: 预约与排班共用同一日期的号段，号码只增不回收
// ==========================================

use crate::domain::types::{PassType, VehicleStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 预约状态 (Reservation Status)
// ==========================================
// Reserved → Cancelled（人工取消）
// Reserved → Transferred（转入次日排班）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Reserved,
    Cancelled,
    Transferred,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "Reserved",
            ReservationStatus::Cancelled => "Cancelled",
            ReservationStatus::Transferred => "Transferred",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reserved" => Ok(ReservationStatus::Reserved),
            "cancelled" | "canceled" => Ok(ReservationStatus::Cancelled),
            "transferred" => Ok(ReservationStatus::Transferred),
            other => Err(format!("未知预约状态: {}", other)),
        }
    }
}

// ==========================================
// Reservation - 预约
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: String,      // UUID
    pub queueing_number: i64,        // 该日期内的排班号
    pub driver_name: String,
    pub plate_number: String,
    pub route: String,               // 取自车辆主数据
    pub reservation_date: NaiveDate, // 站点本地日期
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// 预约入参
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReservation {
    pub driver_name: String,
    pub plate_number: String,
    pub reservation_date: NaiveDate,
}

/// 某一天的有效预约
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationDay {
    pub date: NaiveDate,
    pub day_name: String, // 星期全称，如 "Monday"
    pub reservations: Vec<Reservation>,
}

/// 明后两天的有效预约
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpcomingReservations {
    pub tomorrow: ReservationDay,
    pub day_after_tomorrow: ReservationDay,
}

/// 历史预约过滤条件
///
/// date 为空时取今日之前的全部预约；车牌/司机为大小写不敏感的子串匹配
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PastReservationFilter {
    pub date: Option<NaiveDate>,
    pub plate_number: Option<String>,
    pub driver_name: Option<String>,
}

/// 预约前的车辆资格（车牌联想）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationCandidate {
    pub plate_number: String,
    pub driver_name: String,
    pub route: String,
    pub status: VehicleStatus,
    pub rfid: String,
    pub is_valid: bool, // status=Ok 且已绑定 RFID
}

// ==========================================
// QueueingEntry - 每日排班记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueingEntry {
    pub queueing_id: String,              // UUID
    pub queueing_number: i64,
    pub driver_name: String,
    pub plate_number: String,
    pub fd: Option<String>,
    pub pass: PassType,
    pub status: Option<VehicleStatus>,    // 入列时的登记状态快照
    pub queue_date: NaiveDate,            // 站点本地日期
    pub time_in: Option<DateTime<Utc>>,   // 现场登记时刻；预约转入为空
    pub time_out: Option<DateTime<Utc>>,  // 发车离列时刻
    pub from_reservation: bool,
    pub reservation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 排班入列参数
#[derive(Debug, Clone)]
pub struct NewQueueingEntry {
    pub queueing_number: i64,
    pub driver_name: String,
    pub plate_number: String,
    pub fd: Option<String>,
    pub pass: PassType,
    pub status: Option<VehicleStatus>,
    pub queue_date: NaiveDate,
    pub time_in: Option<DateTime<Utc>>,
    pub reservation_id: Option<String>,
}

/// 预约转入排班的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReport {
    pub queue_date: NaiveDate,
    pub transferred: Vec<QueueingEntry>,
    /// 当日已有未离列排班的车牌（预约仍标记为已转入）
    pub skipped_plates: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservation_status_parse() {
        assert_eq!("Reserved".parse::<ReservationStatus>().unwrap(), ReservationStatus::Reserved);
        assert_eq!("canceled".parse::<ReservationStatus>().unwrap(), ReservationStatus::Cancelled);
        assert_eq!(ReservationStatus::Transferred.to_string(), "Transferred");
        assert!("Pending".parse::<ReservationStatus>().is_err());
    }
}
