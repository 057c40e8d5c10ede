// ==========================================
// 单车道客运站 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约定: *_tx 关联函数在调用方事务内执行，由引擎层组合
// ==========================================

pub mod counter_repo;
pub mod entry_log_repo;
pub mod error;
pub mod queueing_repo;
pub mod reservation_repo;
pub(crate) mod row_mapping;
pub mod vehicle_repo;

// 重导出核心仓储
pub use counter_repo::{CounterPurpose, LaneCounterRepository, GLOBAL_PERIOD};
pub use entry_log_repo::EntryLogRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use queueing_repo::QueueingRepository;
pub use reservation_repo::ReservationRepository;
pub use vehicle_repo::{normalize_plate, VehicleRepository, UNKNOWN_FD};
