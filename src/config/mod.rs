// ==========================================
// 单车道客运站 - 配置层
// ==========================================
// 职责: 站点运行参数管理（时区、票据有效期、处罚保留期、清扫时刻、线路映射）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;

// 重导出核心配置管理器
pub use config_manager::{config_keys, default_route_fd_map, ConfigManager, LaneSettings};
