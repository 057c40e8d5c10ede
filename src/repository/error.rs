// ==========================================
// 单车道客运站 - 仓储层错误类型
// ==========================================
// 说明: StoreBusy / LockPoisoned / Sqlite 对调用方均视为“存储暂不可用”
// ==========================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("连接锁已失效: {0}")]
    LockPoisoned(String),

    #[error("存储忙: {0}")]
    StoreBusy(String),

    #[error("SQLite 执行失败: {0}")]
    Sqlite(String),

    // 部分唯一索引兜底: 车牌/检查点互斥、预约去重
    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    #[error("字段值错误 (field={field}): {message}")]
    InvalidField { field: String, message: String },
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, Some(msg)) => match code.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    RepositoryError::StoreBusy(msg)
                }
                rusqlite::ErrorCode::ConstraintViolation if msg.contains("UNIQUE") => {
                    RepositoryError::UniqueConstraintViolation(msg)
                }
                rusqlite::ErrorCode::ConstraintViolation if msg.contains("FOREIGN KEY") => {
                    RepositoryError::ForeignKeyViolation(msg)
                }
                _ => RepositoryError::Sqlite(msg),
            },
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
                id: "Unknown".to_string(),
            },
            other => RepositoryError::Sqlite(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_no_rows_maps_to_not_found() {
        let err: RepositoryError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn test_constraint_failures_are_classified() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE parent (id TEXT PRIMARY KEY);
            CREATE TABLE child (id TEXT REFERENCES parent(id));
            INSERT INTO parent (id) VALUES ('a');
            "#,
        )
        .unwrap();

        let dup: RepositoryError = conn
            .execute("INSERT INTO parent (id) VALUES ('a')", [])
            .unwrap_err()
            .into();
        assert!(matches!(dup, RepositoryError::UniqueConstraintViolation(_)));

        let orphan: RepositoryError = conn
            .execute("INSERT INTO child (id) VALUES ('missing')", [])
            .unwrap_err()
            .into();
        assert!(matches!(orphan, RepositoryError::ForeignKeyViolation(_)));

        let bad: RepositoryError = conn.execute("SELECT * FROM nowhere", []).unwrap_err().into();
        assert!(matches!(bad, RepositoryError::Sqlite(_)));
    }
}
