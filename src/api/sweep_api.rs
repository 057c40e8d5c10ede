// ==========================================
// 单车道客运站 - 状态清扫 API
// ==========================================
// 职责: 清扫状态查询、人工触发
// ==========================================

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiResult;
use crate::engine::sweep::{StatusSweeper, SweepReport, SweepStatus};
use crate::i18n::{t, t_with_args};

/// 人工触发响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRunResponse {
    pub ran: bool,
    pub message: String,
    pub report: Option<SweepReport>,
}

pub struct SweepApi {
    sweeper: Arc<StatusSweeper>,
}

impl SweepApi {
    pub fn new(sweeper: Arc<StatusSweeper>) -> Self {
        Self { sweeper }
    }

    pub fn get_status(&self) -> ApiResult<SweepStatus> {
        Ok(self.sweeper.status_at(Utc::now())?)
    }

    /// 人工触发（越过“当日已运行”检查，运行中则跳过）
    pub fn run_now(&self) -> ApiResult<SweepRunResponse> {
        let report = self.sweeper.run_manual()?;
        let message = match &report {
            Some(r) => t_with_args(
                "sweep.completed",
                &[("count", r.total_updates().to_string().as_str())],
            ),
            None => t("sweep.skipped"),
        };
        Ok(SweepRunResponse {
            ran: report.is_some(),
            message,
            report,
        })
    }
}
