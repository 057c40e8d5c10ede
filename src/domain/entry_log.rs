// ==========================================
// 单车道客运站 - 通行记录领域模型
// ==========================================
// 红线: 每个车牌同一时刻至多一条 cleared=false 的记录
// 红线: 通行记录只更新不删除（审计轨迹）
// 说明: route/fd/pass 为创建时快照，车辆主数据后续修改不回溯
// ==========================================

use crate::domain::types::{LaneAction, LaneState, PassType, Touchdown};
use crate::domain::vehicle::VehicleView;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// EntryLogEntry - 通行记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryLogEntry {
    pub entry_log_id: i64,           // 自增主键（同时间戳时的插入顺序）
    pub visit_id: String,            // 同一次物理通行共享的访问ID
    pub vehicle_id: String,
    pub plate_number: String,        // 反范式: 车牌号

    // ===== 车道状态 =====
    pub action: LaneAction,
    pub lane_state: LaneState,
    pub logged_at: DateTime<Utc>,    // 分配时间（重新打开时刷新）
    pub cleared: bool,

    // ===== 时间 =====
    pub time_in: Option<DateTime<Utc>>,
    pub time_out: Option<DateTime<Utc>>,

    // ===== 创建时快照 =====
    pub route: Option<String>,
    pub fd: Option<String>,
    pub pass: Option<PassType>,

    // ===== 排号与票据 =====
    pub queue_number: Option<i64>,
    pub touchdown: Touchdown,
    pub ticket_id: Option<String>,
    pub qr_payload: Option<String>,
}

// ==========================================
// NewEntryLog - 新建通行记录入参
// ==========================================
#[derive(Debug, Clone)]
pub struct NewEntryLog {
    pub visit_id: String,
    pub vehicle_id: String,
    pub plate_number: String,
    pub action: LaneAction,
    pub lane_state: LaneState,
    pub logged_at: DateTime<Utc>,
    pub time_in: Option<DateTime<Utc>>,
    pub route: Option<String>,
    pub fd: Option<String>,
    pub pass: Option<PassType>,
    pub queue_number: Option<i64>,
}

// ==========================================
// SystemSnapshot - 车道占用快照
// ==========================================
// 用途: get_system_snapshot 返回值、推送内容
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub entry_occupied: bool,
    pub exit_occupied: bool,
    pub entry_vehicle: Option<VehicleView>,
    pub exit_vehicle: Option<VehicleView>,
    pub entry_queue: Vec<VehicleView>,
    pub exit_queue: Vec<VehicleView>,
}

// ==========================================
// DashboardCounts - 当日完成趟次统计
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardCounts {
    pub total_trips: i64,
    pub pila_count: i64,
    pub taxi_count: i64,
    pub special_pass_count: i64,
}

// ==========================================
// PenaltyVehicleRow - 处罚车辆列表行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyVehicleRow {
    pub plate_number: String,
    pub created_at: DateTime<Utc>,
    /// 最近一次通行记录的 touchdown，没有记录时为处罚状态本身
    pub reason: String,
    pub time_out: Option<DateTime<Utc>>,
    pub entry_log_id: Option<i64>,
}
