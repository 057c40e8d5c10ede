// ==========================================
// 单车道客运站 - 处罚管理 API
// ==========================================
// 职责: 人工处罚、解除处罚、处罚车辆列表
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::lane_api::require_non_empty;
use crate::domain::entry_log::PenaltyVehicleRow;
use crate::domain::types::Touchdown;
use crate::engine::penalty::{ApplyResult, LiftResult, PenaltyEngine};
use crate::i18n::t_with_args;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub message: String,
    #[serde(flatten)]
    pub result: ApplyResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiftResponse {
    pub message: String,
    #[serde(flatten)]
    pub result: LiftResult,
}

/// 处罚车辆列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyListResponse {
    pub count: i64,
    pub vehicles: Vec<PenaltyVehicleRow>,
}

pub struct PenaltyApi {
    penalties: Arc<PenaltyEngine>,
}

impl PenaltyApi {
    pub fn new(penalties: Arc<PenaltyEngine>) -> Self {
        Self { penalties }
    }

    /// 人工处罚
    ///
    /// touchdown 须为处罚类字面值（如 "Exited/Wrong Endpoint"）
    pub fn apply_penalty(
        &self,
        plate: &str,
        touchdown: &str,
        entry_log_id: Option<i64>,
    ) -> ApiResult<ApplyResponse> {
        let plate = require_non_empty("plate_number", plate)?;
        let touchdown: Touchdown = touchdown.parse().map_err(ApiError::InvalidInput)?;
        if !touchdown.is_penalty_outcome() {
            return Err(ApiError::InvalidInput(format!(
                "touchdown {} 不是处罚类结局",
                touchdown
            )));
        }

        let result = self.penalties.apply_penalty(plate, touchdown, entry_log_id)?;
        Ok(ApplyResponse {
            message: t_with_args("penalty.applied", &[("plate", result.plate_number.as_str())]),
            result,
        })
    }

    /// 解除处罚
    pub fn lift_penalty(&self, plate: &str, entry_log_id: Option<i64>) -> ApiResult<LiftResponse> {
        let plate = require_non_empty("plate_number", plate)?;
        let result = self.penalties.lift_penalty(plate, entry_log_id)?;
        let key = if result.lifted {
            "penalty.lifted"
        } else {
            "penalty.not_penalized"
        };
        Ok(LiftResponse {
            message: t_with_args(key, &[("plate", result.plate_number.as_str())]),
            result,
        })
    }

    /// 处罚车辆列表（含数量）
    pub fn list_penalties(&self) -> ApiResult<PenaltyListResponse> {
        let vehicles = self.penalties.penalty_vehicles()?;
        let count = self.penalties.penalty_count()?;
        Ok(PenaltyListResponse { count, vehicles })
    }
}
