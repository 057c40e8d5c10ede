// ==========================================
// 单车道客运站 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod entry_log;
pub mod reservation;
pub mod ticket;
pub mod types;
pub mod vehicle;

// 重导出核心类型
pub use entry_log::{DashboardCounts, EntryLogEntry, NewEntryLog, PenaltyVehicleRow, SystemSnapshot};
pub use reservation::{
    NewReservation, PastReservationFilter, QueueingEntry, Reservation, ReservationCandidate,
    ReservationStatus, TransferReport, UpcomingReservations,
};
pub use ticket::{format_ticket_id, QrParseError, QrPayload, Ticket};
pub use types::{
    is_queue_numbered, LaneAction, LaneState, PassType, PenaltyStatus, Touchdown, VehicleStatus,
    QUEUE_FD_CODE,
};
pub use vehicle::{NewVehicle, Vehicle, VehicleStatusCheck, VehicleView};
