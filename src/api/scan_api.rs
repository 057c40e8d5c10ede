// ==========================================
// 单车道客运站 - 扫码验证 API
// ==========================================
// 职责: 各线路终点的二维码验证入口（FD1..FD4 共用一套状态机）
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::error::ApiResult;
use crate::api::lane_api::require_non_empty;
use crate::engine::ticket::{ScanOutcome, ScanVerdict, TicketEngine};
use crate::i18n::{t, t_with_args};

/// 扫码响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub outcome: ScanOutcome,
}

pub struct ScanApi {
    tickets: Arc<TicketEngine>,
}

impl ScanApi {
    pub fn new(tickets: Arc<TicketEngine>) -> Self {
        Self { tickets }
    }

    /// 终点扫码验证
    ///
    /// # 参数
    /// - qr_data: 二维码原文
    /// - expected_fd: 当前终点的线路代码
    ///
    /// # 返回
    /// - Ok(ScanResponse): 成功 / 重复扫码 / 处罚类结局
    /// - Err(ApiError::MalformedQr): 载荷格式错误
    /// - Err(ApiError::NotFound): 车牌+票号无对应记录
    pub fn validate_qr(&self, qr_data: &str, expected_fd: &str) -> ApiResult<ScanResponse> {
        let expected_fd = require_non_empty("fd", expected_fd)?.to_ascii_uppercase();
        let outcome = self.tickets.validate_qr(qr_data, &expected_fd)?;
        Ok(ScanResponse {
            success: outcome.verdict == ScanVerdict::Success,
            message: scan_message(&outcome),
            outcome,
        })
    }
}

fn scan_message(outcome: &ScanOutcome) -> String {
    match outcome.verdict {
        ScanVerdict::Success => t("scan.success"),
        ScanVerdict::AlreadyScanned => t("scan.already_scanned"),
        ScanVerdict::NoExitRecord => t("scan.no_exit_record"),
        ScanVerdict::Expired => t("scan.expired"),
        ScanVerdict::WrongEndpoint => t_with_args(
            "scan.wrong_endpoint",
            &[
                ("expected", outcome.expected_fd.as_str()),
                ("actual", outcome.actual_fd.as_deref().unwrap_or("-")),
            ],
        ),
    }
}
