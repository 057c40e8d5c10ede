// ==========================================
// 单车道客运站 - 车道操作 API
// ==========================================
// 职责: 车辆到达、检查点放行、在场记录调整、车道快照
// 说明: 业务结局原样返回，并附带本地化提示文本
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::entry_log::{EntryLogEntry, SystemSnapshot};
use crate::domain::types::{LaneAction, LaneState, PassType};
use crate::domain::vehicle::VehicleStatusCheck;
use crate::engine::lane::{ClearResult, LaneEngine, PresentOutcome};
use crate::i18n::{t, t_with_args};

/// 到达检查点响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: PresentOutcome,
}

/// 放行响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub message: String,
    #[serde(flatten)]
    pub result: ClearResult,
}

// ==========================================
// LaneApi - 车道操作 API
// ==========================================
pub struct LaneApi {
    lane: Arc<LaneEngine>,
}

impl LaneApi {
    pub fn new(lane: Arc<LaneEngine>) -> Self {
        Self { lane }
    }

    /// 车辆到达（RFID 或车牌）
    ///
    /// # 返回
    /// - Ok(PresentResponse): 受理 / 已在场 / 处罚阻断
    /// - Err(ApiError::NotFound): 车辆未登记
    pub fn search_vehicle(&self, identifier: &str) -> ApiResult<PresentResponse> {
        let identifier = require_non_empty("identifier", identifier)?;
        let outcome = self.lane.present_vehicle(identifier)?;
        Ok(PresentResponse {
            message: present_message(&outcome),
            outcome,
        })
    }

    /// 检查点放行
    ///
    /// # 参数
    /// - plate: 车牌号
    /// - is_exit: true 时发票并记录出场
    pub fn clear_vehicle(&self, plate: &str, is_exit: bool) -> ApiResult<ClearResponse> {
        let plate = require_non_empty("plate_number", plate)?;
        let result = self.lane.clear_checkpoint(plate, is_exit)?;
        Ok(ClearResponse {
            message: clear_message(&result),
            result,
        })
    }

    /// 进场前状态查询
    pub fn check_vehicle_status(&self, identifier: &str) -> ApiResult<VehicleStatusCheck> {
        let identifier = require_non_empty("identifier", identifier)?;
        Ok(self.lane.check_vehicle_status(identifier)?)
    }

    /// 修改在场记录的通行证
    pub fn update_pass(
        &self,
        plate: &str,
        pass: &str,
        queue_number: Option<i64>,
    ) -> ApiResult<EntryLogEntry> {
        let plate = require_non_empty("plate_number", plate)?;
        let pass: PassType = pass.parse().map_err(ApiError::InvalidInput)?;
        if matches!(queue_number, Some(n) if n <= 0) {
            return Err(ApiError::InvalidInput("排队号必须为正整数".to_string()));
        }
        Ok(self.lane.update_active_pass(plate, pass, queue_number)?)
    }

    /// 修改在场记录的 FD
    pub fn update_fd(&self, plate: &str, fd: &str) -> ApiResult<EntryLogEntry> {
        let plate = require_non_empty("plate_number", plate)?;
        let fd = require_non_empty("fd", fd)?.to_ascii_uppercase();
        Ok(self.lane.update_active_fd(plate, &fd)?)
    }

    /// 当前车道快照
    pub fn get_system_state(&self) -> ApiResult<SystemSnapshot> {
        Ok(self.lane.snapshot()?)
    }

    /// 下一个排队号（不消耗）
    pub fn next_queue_number(&self) -> ApiResult<i64> {
        Ok(self.lane.peek_next_queue_number()?)
    }
}

pub(crate) fn require_non_empty<'a>(field: &str, value: &'a str) -> ApiResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidInput(format!("{}不能为空", field)));
    }
    Ok(trimmed)
}

fn present_message(outcome: &PresentOutcome) -> String {
    match outcome {
        PresentOutcome::Accepted {
            action,
            lane_state,
            queue_position,
            vehicle,
            ..
        } => {
            let key = match (action, lane_state) {
                (LaneAction::Entry, LaneState::Active) => "lane.entry_active",
                (LaneAction::Entry, LaneState::Queued) => "lane.entry_queued",
                (LaneAction::Exit, LaneState::Active) => "lane.exit_active",
                (LaneAction::Exit, LaneState::Queued) => "lane.exit_queued",
            };
            let position = queue_position.map(|p| p.to_string()).unwrap_or_default();
            t_with_args(
                key,
                &[("plate", vehicle.plate_number.as_str()), ("position", position.as_str())],
            )
        }
        PresentOutcome::AlreadyInSystem { .. } => t("lane.already_in_system"),
        PresentOutcome::PenaltyBlocked { plate_number, .. } => {
            t_with_args("lane.penalty_blocked", &[("plate", plate_number.as_str())])
        }
    }
}

fn clear_message(result: &ClearResult) -> String {
    let mut message = match &result.ticket {
        Some(ticket) => t_with_args(
            "lane.cleared_exit",
            &[
                ("plate", result.plate_number.as_str()),
                ("ticket", ticket.ticket_id.as_str()),
            ],
        ),
        None => t_with_args("lane.cleared_entry", &[("plate", result.plate_number.as_str())]),
    };
    if let Some(promoted) = &result.promoted_vehicle {
        message.push_str("; ");
        message.push_str(&t_with_args(
            "lane.promoted",
            &[("plate", promoted.plate_number.as_str())],
        ));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_route_fd_map, ConfigManager};
    use crate::domain::vehicle::NewVehicle;
    use crate::engine::events::OptionalEventPublisher;
    use crate::i18n::tests::LOCALE_TEST_LOCK;
    use crate::i18n::set_locale;
    use crate::repository::vehicle_repo::VehicleRepository;
    use chrono::Utc;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup() -> LaneApi {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let config = Arc::new(ConfigManager::from_connection(conn.clone()));
        VehicleRepository::new(conn.clone())
            .register(
                &NewVehicle::new("ABC-123", "Juan", "SanJose - Cabanatuan City"),
                &default_route_fd_map(),
                Utc::now(),
            )
            .unwrap();
        let lane = LaneEngine::new(conn, config, OptionalEventPublisher::none());
        LaneApi::new(Arc::new(lane))
    }

    #[test]
    fn test_search_vehicle_messages() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("en");
        let api = setup();

        let first = api.search_vehicle("abc-123").unwrap();
        assert!(first.outcome.is_accepted());
        assert_eq!(first.message, "Vehicle ABC-123 is at the entry checkpoint");

        let second = api.search_vehicle("ABC-123").unwrap();
        assert_eq!(second.outcome.kind(), "already_in_system");
        assert_eq!(second.message, "Vehicle already in system");
    }

    #[test]
    fn test_rejects_blank_and_unknown_input() {
        let api = setup();
        assert!(matches!(api.search_vehicle("  "), Err(ApiError::InvalidInput(_))));
        assert!(matches!(api.search_vehicle("ZZZ-999"), Err(ApiError::NotFound(_))));
        assert!(matches!(api.clear_vehicle("ABC-123", false), Err(ApiError::NotFound(_))));
        assert!(matches!(
            api.update_pass("ABC-123", "Bus", None),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_clear_exit_message_carries_ticket() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("en");
        let api = setup();
        api.search_vehicle("ABC-123").unwrap();
        api.clear_vehicle("ABC-123", false).unwrap();
        api.search_vehicle("ABC-123").unwrap();

        let response = api.clear_vehicle("ABC-123", true).unwrap();
        let ticket = response.result.ticket.clone().unwrap();
        assert!(response.message.contains(&ticket.ticket_id));
        assert!(!api.get_system_state().unwrap().exit_occupied);
    }
}
