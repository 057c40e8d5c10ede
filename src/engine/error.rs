// ==========================================
// 单车道客运站 - 引擎层错误类型
// ==========================================
// 说明: 业务结局（已在场、处罚阻断、重复扫码等）以返回值表达，不进入此枚举
// ==========================================

use crate::domain::reservation::ReservationStatus;
use crate::domain::ticket::QrParseError;
use crate::domain::types::VehicleStatus;
use crate::repository::error::RepositoryError;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaneError {
    #[error("车辆未找到: {0}")]
    VehicleNotFound(String),

    #[error("车牌 {0} 没有在场记录")]
    NoOpenEntry(String),

    #[error("通行记录未找到: {0}")]
    EntryLogNotFound(String),

    #[error("二维码格式错误: {0}")]
    MalformedQr(#[from] QrParseError),

    // ===== 预约与排班 =====
    #[error("预约未找到: {0}")]
    ReservationNotFound(String),

    #[error("排班记录未找到: {0}")]
    QueueingEntryNotFound(String),

    #[error("车辆 {plate} 不可预约 (status={status}, rfid={has_rfid})")]
    VehicleRestricted {
        plate: String,
        status: VehicleStatus,
        has_rfid: bool,
    },

    #[error("车辆 {plate} 在 {date} 已有预约")]
    DuplicateReservation { plate: String, date: NaiveDate },

    #[error("车辆 {plate} 在 {date} 已在排班中")]
    DuplicateQueueing { plate: String, date: NaiveDate },

    #[error("预约 {id} 当前状态为 {status}，不可取消")]
    ReservationClosed { id: String, status: ReservationStatus },

    #[error("预约日期 {0} 早于今日")]
    ReservationDateInPast(NaiveDate),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl LaneError {
    /// 是否为调用方给出的对象不存在
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LaneError::VehicleNotFound(_)
                | LaneError::NoOpenEntry(_)
                | LaneError::EntryLogNotFound(_)
                | LaneError::ReservationNotFound(_)
                | LaneError::QueueingEntryNotFound(_)
                | LaneError::Repository(RepositoryError::NotFound { .. })
        )
    }
}

impl From<rusqlite::Error> for LaneError {
    fn from(err: rusqlite::Error) -> Self {
        LaneError::Repository(err.into())
    }
}

pub type LaneResult<T> = Result<T, LaneError>;
