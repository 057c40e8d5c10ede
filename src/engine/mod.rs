// ==========================================
// 单车道客运站 - 引擎层
// ==========================================
// 职责: 实现车道仲裁、票据校验、处罚与清扫规则，以及预约排班
// 红线: 每个业务操作恰好一个事务，事件在提交后发布
// 红线: 业务结局以返回值表达，错误仅用于异常路径
// ==========================================

pub mod error;
pub mod events;
pub mod lane;
pub mod penalty;
pub mod reservation;
pub mod sweep;
pub mod ticket;
pub(crate) mod tx;

// 重导出核心引擎
pub use error::{LaneError, LaneResult};
pub use events::{
    BroadcastEventPublisher, LaneEvent, LaneEventPublisher, NoOpEventPublisher,
    OptionalEventPublisher,
};
pub use lane::{ClearResult, LaneEngine, PresentOutcome};
pub use penalty::{ApplyResult, LiftResult, PenaltyEngine};
pub use reservation::ReservationEngine;
pub use sweep::{StatusSweeper, SweepReport, SweepStatus};
pub use ticket::{ScanOutcome, ScanVerdict, TicketEngine};
