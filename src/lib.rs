// ==========================================
// 单车道客运站 - 核心库
// ==========================================
// 职责: 进场/出场检查点仲裁、排队与排号、出场票据与扫码、处罚生命周期
// 技术栈: Rust + SQLite + axum
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "en");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 站点参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - HTTP 服务与后台作业
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{LaneAction, LaneState, PassType, PenaltyStatus, Touchdown, VehicleStatus};

// 领域实体
pub use domain::{
    EntryLogEntry, QrPayload, QueueingEntry, Reservation, SystemSnapshot, Ticket, Vehicle,
    VehicleView,
};

// 引擎
pub use engine::{LaneEngine, PenaltyEngine, ReservationEngine, StatusSweeper, TicketEngine};

// API
pub use api::{ApiError, DashboardApi, LaneApi, PenaltyApi, ReservationApi, ScanApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "terminal-lane";
