// ==========================================
// 单车道客运站 - 引擎事务辅助
// ==========================================
// 红线: 每个业务操作恰好一个 BEGIN IMMEDIATE 事务
// 红线: 持锁期间不得再次获取同一连接（std Mutex 不可重入），
//       配置等读取须在进入事务前完成
// ==========================================

use crate::repository::error::RepositoryError;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::sync::Mutex;

/// 在 IMMEDIATE 事务内执行闭包
///
/// 闭包返回 Err 时事务随 Transaction drop 回滚
pub(crate) fn with_immediate_tx<T, E, F>(conn: &Mutex<Connection>, f: F) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<RepositoryError>,
{
    let mut guard = conn
        .lock()
        .map_err(|e| RepositoryError::LockPoisoned(e.to_string()))?;
    let tx = guard
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(RepositoryError::from)?;

    let out = f(&tx)?;

    tx.commit().map_err(RepositoryError::from)?;
    Ok(out)
}

/// 只读访问（不开启显式事务）
pub(crate) fn with_conn<T, E, F>(conn: &Mutex<Connection>, f: F) -> Result<T, E>
where
    F: FnOnce(&Connection) -> Result<T, E>,
    E: From<RepositoryError>,
{
    let guard = conn
        .lock()
        .map_err(|e| RepositoryError::LockPoisoned(e.to_string()))?;
    f(&guard)
}
