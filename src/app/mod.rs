// ==========================================
// 单车道客运站 - 应用层
// ==========================================
// 职责: HTTP 服务集成、共享状态、后台作业
// ==========================================

pub mod jobs;
pub mod routes;
pub mod state;

// 重导出
pub use routes::router;
pub use state::{get_default_db_path, AppState};
