// ==========================================
// 单车道客运站 - 行映射辅助函数
// ==========================================
// 职责: TEXT 列 → 领域枚举 / 时间 的统一转换
// 说明: 转换失败映射为 FromSqlConversionFailure，保持 query_map 链路可用 `?`
// ==========================================

use crate::db::{parse_date, parse_ts};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Result as SqliteResult, Row};
use std::str::FromStr;

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

/// 必填枚举列
pub(crate) fn text_enum<T>(row: &Row, idx: usize) -> SqliteResult<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

/// 可空枚举列
pub(crate) fn opt_text_enum<T>(row: &Row, idx: usize) -> SqliteResult<Option<T>>
where
    T: FromStr<Err = String>,
{
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) if !s.trim().is_empty() => s.parse::<T>().map(Some).map_err(|e| conversion_error(idx, e)),
        _ => Ok(None),
    }
}

/// 必填时间列
pub(crate) fn ts(row: &Row, idx: usize) -> SqliteResult<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).ok_or_else(|| conversion_error(idx, format!("无法解析时间: {}", raw)))
}

/// 可空时间列
pub(crate) fn opt_ts(row: &Row, idx: usize) -> SqliteResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => parse_ts(&s)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, format!("无法解析时间: {}", s))),
        None => Ok(None),
    }
}

/// 必填日期列
pub(crate) fn date(row: &Row, idx: usize) -> SqliteResult<NaiveDate> {
    let raw: String = row.get(idx)?;
    parse_date(&raw).ok_or_else(|| conversion_error(idx, format!("无法解析日期: {}", raw)))
}

/// 可空日期列
pub(crate) fn opt_date(row: &Row, idx: usize) -> SqliteResult<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => parse_date(&s)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, format!("无法解析日期: {}", s))),
        None => Ok(None),
    }
}
