// ==========================================
// 单车道客运站 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供 HTTP 路由调用
// 约定: 入参校验在此层完成，业务规则在引擎层
// ==========================================

pub mod dashboard_api;
pub mod error;
pub mod lane_api;
pub mod penalty_api;
pub mod reservation_api;
pub mod scan_api;
pub mod sweep_api;

// 重导出核心类型
pub use dashboard_api::DashboardApi;
pub use error::{ApiError, ApiResult};
pub use lane_api::{ClearResponse, LaneApi, PresentResponse};
pub use penalty_api::{ApplyResponse, LiftResponse, PenaltyApi, PenaltyListResponse};
pub use reservation_api::{QueueingResponse, ReservationApi, ReservationResponse, TransferResponse};
pub use scan_api::{ScanApi, ScanResponse};
pub use sweep_api::{SweepApi, SweepRunResponse};
