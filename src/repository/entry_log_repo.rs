// ==========================================
// 单车道客运站 - 通行记录数据仓储
// ==========================================
// 红线: 通行记录只增改不删
// 红线: 车道互斥由部分唯一索引 + 条件 UPDATE 在存储层兜底
// ==========================================

mod core;
mod queries;

#[cfg(test)]
mod tests;

pub use core::EntryLogRepository;
