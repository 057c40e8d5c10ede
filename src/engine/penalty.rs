// ==========================================
// 单车道客运站 - 处罚生命周期
// ==========================================
// 状态机: None → Penalty → Lifted → (保留期满，由清扫作业) → None
// 红线: 处罚与登记状态 (Ok/Expired) 相互独立，处罚不修改 status
// 红线: 解除处罚时在途 touchdown (ongoing/waiting/dispatch) 不得覆盖
// ==========================================

use crate::domain::entry_log::{EntryLogEntry, PenaltyVehicleRow};
use crate::domain::types::{PenaltyStatus, Touchdown};
use crate::engine::error::{LaneError, LaneResult};
use crate::engine::events::{LaneEvent, OptionalEventPublisher};
use crate::engine::tx::with_immediate_tx;
use crate::repository::entry_log_repo::EntryLogRepository;
use crate::repository::vehicle_repo::{normalize_plate, VehicleRepository};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

/// 人工处罚结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    pub plate_number: String,
    pub vehicle_id: String,
    pub entry_log_id: Option<i64>,
    pub touchdown: Touchdown,
}

/// 解除处罚结果
///
/// lifted=false 表示车辆当前不处于处罚状态，未做任何修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiftResult {
    pub lifted: bool,
    pub plate_number: String,
    pub vehicle_id: String,
    pub penalty_status: PenaltyStatus,
    pub entry_log_id: Option<i64>,
    pub touchdown: Option<Touchdown>,
    pub touchdown_rewritten: bool,
}

// ==========================================
// PenaltyEngine
// ==========================================
pub struct PenaltyEngine {
    conn: Arc<Mutex<Connection>>,
    publisher: OptionalEventPublisher,
}

impl PenaltyEngine {
    pub fn new(conn: Arc<Mutex<Connection>>, publisher: OptionalEventPublisher) -> Self {
        Self { conn, publisher }
    }

    /// 人工处罚（管理端）
    ///
    /// 车辆置为 Penalty；目标记录（给定 id 或最近一条）touchdown 改写为给定值
    pub fn apply_penalty(
        &self,
        plate: &str,
        touchdown: Touchdown,
        entry_log_id: Option<i64>,
    ) -> LaneResult<ApplyResult> {
        self.apply_penalty_at(plate, touchdown, entry_log_id, Utc::now())
    }

    #[instrument(skip(self))]
    pub fn apply_penalty_at(
        &self,
        plate: &str,
        touchdown: Touchdown,
        entry_log_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> LaneResult<ApplyResult> {
        let plate = normalize_plate(plate);

        let result = with_immediate_tx(&self.conn, |tx| -> LaneResult<ApplyResult> {
            let vehicle = VehicleRepository::find_by_plate_tx(tx, &plate)?
                .ok_or_else(|| LaneError::VehicleNotFound(plate.clone()))?;
            let target = target_log(tx, &vehicle.vehicle_id, &plate, entry_log_id)?;

            VehicleRepository::set_penalty_tx(tx, &plate, PenaltyStatus::Penalty, None, now)?;
            if let Some(log) = &target {
                EntryLogRepository::set_touchdown_tx(tx, log.entry_log_id, touchdown)?;
            }

            Ok(ApplyResult {
                plate_number: plate.clone(),
                vehicle_id: vehicle.vehicle_id,
                entry_log_id: target.map(|l| l.entry_log_id),
                touchdown,
            })
        })?;

        info!(plate = %result.plate_number, touchdown = %result.touchdown, "车辆已处罚");
        self.publisher.publish(LaneEvent::EntryLogsChanged);
        Ok(result)
    }

    /// 解除处罚
    ///
    /// 仅当车辆处于 Penalty 时生效；目标记录（给定 id 或最近一条）的 touchdown
    /// 仅在属于处罚类字面值时改写为 "Penalty Lifted"
    pub fn lift_penalty(&self, plate: &str, entry_log_id: Option<i64>) -> LaneResult<LiftResult> {
        self.lift_penalty_at(plate, entry_log_id, Utc::now())
    }

    #[instrument(skip(self))]
    pub fn lift_penalty_at(
        &self,
        plate: &str,
        entry_log_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> LaneResult<LiftResult> {
        let plate = normalize_plate(plate);

        let result = with_immediate_tx(&self.conn, |tx| -> LaneResult<LiftResult> {
            let vehicle = VehicleRepository::find_by_plate_tx(tx, &plate)?
                .ok_or_else(|| LaneError::VehicleNotFound(plate.clone()))?;

            if vehicle.penalty_status != PenaltyStatus::Penalty {
                return Ok(LiftResult {
                    lifted: false,
                    plate_number: plate.clone(),
                    vehicle_id: vehicle.vehicle_id,
                    penalty_status: vehicle.penalty_status,
                    entry_log_id: None,
                    touchdown: None,
                    touchdown_rewritten: false,
                });
            }

            let target = target_log(tx, &vehicle.vehicle_id, &plate, entry_log_id)?;
            VehicleRepository::set_penalty_tx(tx, &plate, PenaltyStatus::Lifted, Some(now), now)?;

            let mut touchdown = target.as_ref().map(|l| l.touchdown);
            let mut rewritten = false;
            if let Some(log) = &target {
                if log.touchdown.is_liftable() {
                    EntryLogRepository::set_touchdown_tx(tx, log.entry_log_id, Touchdown::PenaltyLifted)?;
                    touchdown = Some(Touchdown::PenaltyLifted);
                    rewritten = true;
                }
            }

            Ok(LiftResult {
                lifted: true,
                plate_number: plate.clone(),
                vehicle_id: vehicle.vehicle_id,
                penalty_status: PenaltyStatus::Lifted,
                entry_log_id: target.map(|l| l.entry_log_id),
                touchdown,
                touchdown_rewritten: rewritten,
            })
        })?;

        if result.lifted {
            info!(
                plate = %result.plate_number,
                touchdown_rewritten = result.touchdown_rewritten,
                "处罚已解除"
            );
            self.publisher.publish(LaneEvent::PenaltyLifted {
                plate_number: result.plate_number.clone(),
                vehicle_id: result.vehicle_id.clone(),
            });
            self.publisher.publish(LaneEvent::EntryLogsChanged);
        } else {
            info!(plate = %result.plate_number, penalty_status = %result.penalty_status, "车辆不在处罚状态，忽略解除请求");
        }

        Ok(result)
    }

    /// 处罚车辆列表（原因取最近一次出场记录的 touchdown）
    pub fn penalty_vehicles(&self) -> LaneResult<Vec<PenaltyVehicleRow>> {
        let vehicles = VehicleRepository::new(self.conn.clone()).list_penalized()?;
        let logs = EntryLogRepository::new(self.conn.clone());

        let mut rows = Vec::with_capacity(vehicles.len());
        for vehicle in vehicles {
            let latest = logs.latest_exit_for_plate(&vehicle.plate_number)?;
            rows.push(PenaltyVehicleRow {
                plate_number: vehicle.plate_number,
                created_at: vehicle.created_at,
                reason: latest
                    .as_ref()
                    .map(|l| l.touchdown.to_string())
                    .unwrap_or_else(|| vehicle.penalty_status.to_string()),
                time_out: latest.as_ref().and_then(|l| l.time_out),
                entry_log_id: latest.map(|l| l.entry_log_id),
            });
        }
        Ok(rows)
    }

    /// 处罚车辆数
    pub fn penalty_count(&self) -> LaneResult<i64> {
        Ok(VehicleRepository::new(self.conn.clone()).count_penalized()?)
    }
}

/// 目标记录: 给定 id（须属于该车牌）或车辆最近一条记录
fn target_log(
    conn: &Connection,
    vehicle_id: &str,
    plate: &str,
    entry_log_id: Option<i64>,
) -> LaneResult<Option<EntryLogEntry>> {
    match entry_log_id {
        Some(id) => {
            let log = EntryLogRepository::find_by_id_tx(conn, id)?
                .filter(|l| l.plate_number == plate)
                .ok_or_else(|| LaneError::EntryLogNotFound(id.to_string()))?;
            Ok(Some(log))
        }
        None => Ok(EntryLogRepository::latest_for_vehicle_tx(conn, vehicle_id)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entry_log::NewEntryLog;
    use crate::domain::types::{LaneAction, LaneState};
    use crate::domain::vehicle::NewVehicle;
    use crate::engine::events::BroadcastEventPublisher;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap()
    }

    fn setup(publisher: OptionalEventPublisher) -> (Arc<Mutex<Connection>>, PenaltyEngine, i64) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));

        let vehicle = VehicleRepository::new(conn.clone())
            .register(
                &NewVehicle::new("PEN-1", "driver", "SanJose - Rizal"),
                &crate::config::default_route_fd_map(),
                t0(),
            )
            .unwrap();

        let log_id = {
            let guard = conn.lock().unwrap();
            let id = EntryLogRepository::insert_tx(
                &guard,
                &NewEntryLog {
                    visit_id: "visit-1".to_string(),
                    vehicle_id: vehicle.vehicle_id.clone(),
                    plate_number: vehicle.plate_number.clone(),
                    action: LaneAction::Exit,
                    lane_state: LaneState::Active,
                    logged_at: t0(),
                    time_in: Some(t0()),
                    route: Some(vehicle.route.clone()),
                    fd: vehicle.fd.clone(),
                    pass: None,
                    queue_number: None,
                },
            )
            .unwrap();
            EntryLogRepository::clear_open_for_plate_tx(&guard, "PEN-1").unwrap();
            id
        };

        (conn.clone(), PenaltyEngine::new(conn, publisher), log_id)
    }

    fn touchdown_of(conn: &Arc<Mutex<Connection>>, id: i64) -> Touchdown {
        let guard = conn.lock().unwrap();
        EntryLogRepository::find_by_id_tx(&guard, id).unwrap().unwrap().touchdown
    }

    #[test]
    fn test_apply_then_lift_rewrites_penalty_touchdown() {
        let (conn, engine, log_id) = setup(OptionalEventPublisher::none());

        let applied = engine
            .apply_penalty_at("pen-1", Touchdown::ExitedWrongEndpoint, None, t0())
            .unwrap();
        assert_eq!(applied.entry_log_id, Some(log_id));
        assert_eq!(engine.penalty_count().unwrap(), 1);

        let rows = engine.penalty_vehicles().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reason, "Exited/Wrong Endpoint");

        let lifted = engine.lift_penalty_at("PEN-1", None, t0()).unwrap();
        assert!(lifted.lifted);
        assert!(lifted.touchdown_rewritten);
        assert_eq!(touchdown_of(&conn, log_id), Touchdown::PenaltyLifted);

        let v = VehicleRepository::new(conn.clone()).find_by_plate("PEN-1").unwrap().unwrap();
        assert_eq!(v.penalty_status, PenaltyStatus::Lifted);
        assert_eq!(v.penalty_lifted_at, Some(t0()));
        assert_eq!(engine.penalty_count().unwrap(), 0);
    }

    #[test]
    fn test_lift_keeps_in_transit_touchdown() {
        let (conn, engine, log_id) = setup(OptionalEventPublisher::none());
        engine.apply_penalty_at("PEN-1", Touchdown::Ongoing, Some(log_id), t0()).unwrap();

        let lifted = engine.lift_penalty_at("PEN-1", Some(log_id), t0()).unwrap();
        assert!(lifted.lifted);
        assert!(!lifted.touchdown_rewritten);
        assert_eq!(touchdown_of(&conn, log_id), Touchdown::Ongoing);
    }

    #[test]
    fn test_lift_without_penalty_is_noop() {
        let broadcaster = Arc::new(BroadcastEventPublisher::new(8));
        let mut rx = broadcaster.subscribe();
        let (_conn, engine, _) = setup(OptionalEventPublisher::with_publisher(broadcaster));

        let result = engine.lift_penalty_at("PEN-1", None, t0()).unwrap();
        assert!(!result.lifted);
        assert_eq!(result.penalty_status, PenaltyStatus::None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_lift_publishes_penalty_lifted() {
        let broadcaster = Arc::new(BroadcastEventPublisher::new(8));
        let mut rx = broadcaster.subscribe();
        let (_conn, engine, _) = setup(OptionalEventPublisher::with_publisher(broadcaster));

        engine.apply_penalty_at("PEN-1", Touchdown::ExitedExpiredTicket, None, t0()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), LaneEvent::EntryLogsChanged);

        engine.lift_penalty_at("PEN-1", None, t0()).unwrap();
        match rx.try_recv().unwrap() {
            LaneEvent::PenaltyLifted { plate_number, .. } => assert_eq!(plate_number, "PEN-1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_foreign_entry_log_id_rejected() {
        let (_conn, engine, log_id) = setup(OptionalEventPublisher::none());
        let err = engine
            .apply_penalty_at("PEN-1", Touchdown::ExitedWrongEndpoint, Some(log_id + 100), t0())
            .unwrap_err();
        assert!(matches!(err, LaneError::EntryLogNotFound(_)));
    }
}
