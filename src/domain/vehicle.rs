// ==========================================
// 单车道客运站 - 车辆领域模型
// ==========================================
// 职责: 车辆主数据、对外展示视图
// 红线: plate_number 为稳定外部键（统一大写存储）
// ==========================================

use crate::domain::entry_log::EntryLogEntry;
use crate::domain::types::{PassType, PenaltyStatus, VehicleStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Vehicle - 车辆主数据
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    // ===== 身份 =====
    pub vehicle_id: String,          // 内部ID (UUID)
    pub plate_number: String,        // 车牌号 (大写)
    pub rfid: Option<String>,        // RFID 标签
    pub driver_name: String,         // 司机姓名

    // ===== 分类 =====
    pub route: String,               // 线路
    pub fd: Option<String>,          // 线路代码 FD1..FD4
    pub pass: Option<PassType>,      // 通行证类型 (可为空，首次进场时补默认值)

    // ===== 状态 (相互独立) =====
    pub status: VehicleStatus,             // 登记证件状态
    pub penalty_status: PenaltyStatus,     // 处罚状态
    pub penalty_lifted_at: Option<DateTime<Utc>>,

    // ===== 登记有效期 =====
    pub expiry_date: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Vehicle {
    /// 是否被处罚阻断进场
    pub fn is_penalty_blocked(&self) -> bool {
        self.penalty_status == PenaltyStatus::Penalty
    }

    /// 生效的通行证（未设置时按 FD 推导）
    pub fn effective_pass(&self) -> PassType {
        self.pass
            .unwrap_or_else(|| PassType::default_for_fd(self.fd.as_deref()))
    }
}

// ==========================================
// NewVehicle - 车辆登记入参
// ==========================================
// 主数据维护属于外部协作方，此结构仅供登记/种子数据使用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVehicle {
    pub plate_number: String,
    pub rfid: Option<String>,
    pub driver_name: String,
    pub route: String,
    /// 显式 FD；为空时按线路映射推导
    pub fd: Option<String>,
    pub pass: Option<PassType>,
    pub expiry_date: Option<NaiveDate>,
}

impl NewVehicle {
    pub fn new(plate_number: &str, driver_name: &str, route: &str) -> Self {
        Self {
            plate_number: plate_number.to_string(),
            rfid: None,
            driver_name: driver_name.to_string(),
            route: route.to_string(),
            fd: None,
            pass: None,
            expiry_date: None,
        }
    }

    pub fn with_fd(mut self, fd: &str) -> Self {
        self.fd = Some(fd.to_string());
        self
    }

    pub fn with_pass(mut self, pass: PassType) -> Self {
        self.pass = Some(pass);
        self
    }

    pub fn with_rfid(mut self, rfid: &str) -> Self {
        self.rfid = Some(rfid.to_string());
        self
    }

    pub fn with_expiry_date(mut self, date: NaiveDate) -> Self {
        self.expiry_date = Some(date);
        self
    }
}

// ==========================================
// VehicleView - 车辆+通行记录的反范式视图
// ==========================================
// 用途: present/clear 返回值、系统快照、推送消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleView {
    pub plate_number: String,
    pub driver_name: String,
    pub route: String,
    pub fd: String,
    pub pass: PassType,
    pub queue_number: Option<i64>,
    pub time_in: Option<DateTime<Utc>>,
    pub status: VehicleStatus,
    pub penalty_status: PenaltyStatus,
    pub ticket_id: Option<String>,
    pub qr_payload: Option<String>,
}

impl VehicleView {
    /// 由车辆与通行记录组合视图
    ///
    /// 字段优先取通行记录的快照值，缺失时回退到车辆主数据
    pub fn compose(vehicle: Option<&Vehicle>, log: &EntryLogEntry) -> Self {
        let fd = log
            .fd
            .clone()
            .or_else(|| vehicle.and_then(|v| v.fd.clone()))
            .unwrap_or_default();
        let pass = log
            .pass
            .or_else(|| vehicle.and_then(|v| v.pass))
            .unwrap_or_else(|| PassType::default_for_fd(Some(fd.as_str())));

        Self {
            plate_number: log.plate_number.clone(),
            driver_name: vehicle.map(|v| v.driver_name.clone()).unwrap_or_default(),
            route: log
                .route
                .clone()
                .or_else(|| vehicle.map(|v| v.route.clone()))
                .unwrap_or_default(),
            fd,
            pass,
            queue_number: log.queue_number,
            time_in: log.time_in,
            status: vehicle.map(|v| v.status).unwrap_or(VehicleStatus::Ok),
            penalty_status: vehicle
                .map(|v| v.penalty_status)
                .unwrap_or(PenaltyStatus::None),
            ticket_id: log.ticket_id.clone(),
            qr_payload: log.qr_payload.clone(),
        }
    }
}

// ==========================================
// VehicleStatusCheck - 进场前状态查询结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleStatusCheck {
    pub plate_number: String,
    pub status: VehicleStatus,
    pub penalty_status: PenaltyStatus,
}
