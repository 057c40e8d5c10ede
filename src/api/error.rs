// ==========================================
// 单车道客运站 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换引擎/仓储错误为用户友好的错误消息
// 映射: 对象不存在 404，入参/二维码格式错误 422，存储不可用 503
// 说明: 已在场、处罚阻断、重复扫码等业务结局不经过此类型
// ==========================================

use crate::engine::error::LaneError;
use crate::repository::error::RepositoryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 调用方错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("二维码格式错误: {0}")]
    MalformedQr(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 存储暂不可用
    // ==========================================
    #[error("存储暂不可用: {0}")]
    StoreUnavailable(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

impl ApiError {
    /// HTTP 状态码与机器可读错误码
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::InvalidInput(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_INPUT"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::MalformedQr(_) => (StatusCode::UNPROCESSABLE_ENTITY, "MALFORMED_QR"),
            ApiError::BusinessRuleViolation(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE"),
            ApiError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::StoreBusy(msg) | RepositoryError::Sqlite(msg) => {
                ApiError::StoreUnavailable(msg)
            }
            RepositoryError::LockPoisoned(msg) => {
                ApiError::StoreUnavailable(format!("连接锁已失效: {}", msg))
            }
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::InvalidField { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
        }
    }
}

// ==========================================
// 从 LaneError 转换
// ==========================================
impl From<LaneError> for ApiError {
    fn from(err: LaneError) -> Self {
        match err {
            LaneError::VehicleNotFound(id) => ApiError::NotFound(format!("车辆 {}", id)),
            LaneError::NoOpenEntry(plate) => {
                ApiError::NotFound(format!("车牌 {} 没有在场记录", plate))
            }
            LaneError::EntryLogNotFound(id) => ApiError::NotFound(format!("通行记录 {}", id)),
            LaneError::MalformedQr(e) => ApiError::MalformedQr(e.to_string()),
            LaneError::ReservationNotFound(id) => ApiError::NotFound(format!("预约 {}", id)),
            LaneError::QueueingEntryNotFound(id) => ApiError::NotFound(format!("排班记录 {}", id)),
            LaneError::ReservationDateInPast(_) => ApiError::InvalidInput(err.to_string()),
            LaneError::VehicleRestricted { .. }
            | LaneError::DuplicateReservation { .. }
            | LaneError::DuplicateQueueing { .. }
            | LaneError::ReservationClosed { .. } => ApiError::BusinessRuleViolation(err.to_string()),
            LaneError::Repository(e) => e.into(),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

// ==========================================
// HTTP 错误响应
// ==========================================

/// JSON 错误响应体
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // 内部错误细节不返回给调用方
        let message = match &self {
            ApiError::InternalError(_) => "内部错误".to_string(),
            other => other.to_string(),
        };

        match status {
            StatusCode::SERVICE_UNAVAILABLE => tracing::error!(error = %self, "存储暂不可用"),
            StatusCode::INTERNAL_SERVER_ERROR => tracing::error!(error = %self, "内部错误"),
            _ => tracing::info!(error = %self, "请求被拒绝"),
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ticket::QrParseError;

    #[test]
    fn test_repository_error_conversion() {
        let api_err: ApiError = RepositoryError::NotFound {
            entity: "Vehicle".to_string(),
            id: "ABC-123".to_string(),
        }
        .into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("Vehicle"));
                assert!(msg.contains("ABC-123"));
            }
            other => panic!("Expected NotFound, got {:?}", other),
        }

        let api_err: ApiError = RepositoryError::LockPoisoned("poisoned".to_string()).into();
        assert_eq!(api_err.status_and_code().0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_lane_error_status_codes() {
        let not_found: ApiError = LaneError::NoOpenEntry("ABC-123".to_string()).into();
        assert_eq!(not_found.status_and_code(), (StatusCode::NOT_FOUND, "NOT_FOUND"));

        let malformed: ApiError = LaneError::MalformedQr(QrParseError::SegmentCount(2)).into();
        assert_eq!(
            malformed.status_and_code(),
            (StatusCode::UNPROCESSABLE_ENTITY, "MALFORMED_QR")
        );

        let busy: ApiError =
            LaneError::Repository(RepositoryError::StoreBusy("busy".into())).into();
        assert_eq!(busy.status_and_code().0, StatusCode::SERVICE_UNAVAILABLE);
    }
}
