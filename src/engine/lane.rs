// ==========================================
// 单车道客运站 - 车道占用与排队引擎
// ==========================================
// 职责: 进场/出场两个互斥检查点的占用仲裁、FIFO 提升、排队号分配
// 红线: 每个检查点至多一条 cleared=0 且 active 的记录
// 红线: 排队集合按 (logged_at, entry_log_id) 全序，提升永远取最小者
// 红线: 同一车牌至多一条 cleared=0 的记录
// 说明: 互斥与唯一性在条件 UPDATE 与部分唯一索引中再次校验
// ==========================================

use crate::config::{ConfigManager, LaneSettings};
use crate::domain::entry_log::{EntryLogEntry, NewEntryLog, SystemSnapshot};
use crate::domain::ticket::Ticket;
use crate::domain::types::{
    is_queue_numbered, LaneAction, LaneState, PassType, PenaltyStatus, Touchdown,
};
use crate::domain::vehicle::{Vehicle, VehicleStatusCheck, VehicleView};
use crate::engine::error::{LaneError, LaneResult};
use crate::engine::events::{LaneEvent, OptionalEventPublisher};
use crate::engine::ticket::TicketEngine;
use crate::engine::tx::{with_conn, with_immediate_tx};
use crate::repository::counter_repo::{CounterPurpose, LaneCounterRepository};
use crate::repository::entry_log_repo::EntryLogRepository;
use crate::repository::error::RepositoryResult;
use crate::repository::vehicle_repo::{normalize_plate, VehicleRepository, UNKNOWN_FD};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};
use uuid::Uuid;

// ==========================================
// 进场/出场请求结果
// ==========================================

/// 车辆到达检查点的处理结果
///
/// 已在场、处罚阻断均为正常业务结局，不是错误
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PresentOutcome {
    Accepted {
        entry_log_id: i64,
        action: LaneAction,
        lane_state: LaneState,
        queue_position: Option<i64>,
        vehicle: VehicleView,
    },
    AlreadyInSystem {
        entry_log_id: i64,
        action: LaneAction,
        lane_state: LaneState,
        queue_position: Option<i64>,
        vehicle: VehicleView,
    },
    PenaltyBlocked {
        plate_number: String,
        driver_name: String,
        penalty_status: PenaltyStatus,
    },
}

impl PresentOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PresentOutcome::Accepted { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PresentOutcome::Accepted { .. } => "accepted",
            PresentOutcome::AlreadyInSystem { .. } => "already_in_system",
            PresentOutcome::PenaltyBlocked { .. } => "penalty_blocked",
        }
    }
}

/// 检查点放行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResult {
    pub plate_number: String,
    pub entry_log_id: i64,
    pub cleared_action: LaneAction,
    pub touchdown: Touchdown,
    pub ticket: Option<Ticket>,
    pub promoted: bool,
    pub promoted_vehicle: Option<VehicleView>,
}

// ==========================================
// LaneEngine
// ==========================================
pub struct LaneEngine {
    conn: Arc<Mutex<Connection>>,
    config: Arc<ConfigManager>,
    publisher: OptionalEventPublisher,
}

impl LaneEngine {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        config: Arc<ConfigManager>,
        publisher: OptionalEventPublisher,
    ) -> Self {
        Self {
            conn,
            config,
            publisher,
        }
    }

    // ==========================================
    // 到达检查点
    // ==========================================

    /// 车辆到达（RFID 或车牌）
    pub fn present_vehicle(&self, identifier: &str) -> LaneResult<PresentOutcome> {
        self.present_vehicle_at(identifier, Utc::now())
    }

    #[instrument(skip(self))]
    pub fn present_vehicle_at(&self, identifier: &str, now: DateTime<Utc>) -> LaneResult<PresentOutcome> {
        let settings = self.config.load_lane_settings()?;

        let outcome = with_immediate_tx(&self.conn, |tx| -> LaneResult<PresentOutcome> {
            let mut vehicle = VehicleRepository::find_by_identifier_tx(tx, identifier)?
                .ok_or_else(|| LaneError::VehicleNotFound(identifier.trim().to_string()))?;

            if vehicle.is_penalty_blocked() {
                return Ok(PresentOutcome::PenaltyBlocked {
                    plate_number: vehicle.plate_number.clone(),
                    driver_name: vehicle.driver_name.clone(),
                    penalty_status: vehicle.penalty_status,
                });
            }

            if vehicle.pass.is_none() {
                let pass = PassType::default_for_fd(vehicle.fd.as_deref());
                VehicleRepository::set_pass_tx(tx, &vehicle.plate_number, pass, now)?;
                vehicle.pass = Some(pass);
            }

            if let Some(open) = EntryLogRepository::open_for_plate_tx(tx, &vehicle.plate_number)? {
                let queue_position = queue_position_of(tx, &open)?;
                return Ok(PresentOutcome::AlreadyInSystem {
                    entry_log_id: open.entry_log_id,
                    action: open.action,
                    lane_state: open.lane_state,
                    queue_position,
                    vehicle: VehicleView::compose(Some(&vehicle), &open),
                });
            }

            let latest = EntryLogRepository::latest_for_vehicle_tx(tx, &vehicle.vehicle_id)?;
            let action = LaneAction::next_after(latest.as_ref().map(|l| l.action));
            let lane_state = if EntryLogRepository::has_open_for_action_tx(tx, action)? {
                LaneState::Queued
            } else {
                LaneState::Active
            };

            let entry_log_id = match (action, latest) {
                (LaneAction::Exit, Some(prior)) => {
                    EntryLogRepository::reopen_for_exit_tx(tx, prior.entry_log_id, lane_state, now)?;
                    prior.entry_log_id
                }
                _ => {
                    let new_log = new_entry_for(tx, &vehicle, &settings, lane_state, now)?;
                    EntryLogRepository::insert_tx(tx, &new_log)?
                }
            };

            let log = EntryLogRepository::find_by_id_tx(tx, entry_log_id)?
                .ok_or_else(|| LaneError::EntryLogNotFound(entry_log_id.to_string()))?;
            let queue_position = queue_position_of(tx, &log)?;

            Ok(PresentOutcome::Accepted {
                entry_log_id,
                action: log.action,
                lane_state: log.lane_state,
                queue_position,
                vehicle: VehicleView::compose(Some(&vehicle), &log),
            })
        })?;

        match &outcome {
            PresentOutcome::Accepted {
                action,
                lane_state,
                vehicle,
                ..
            } => {
                info!(
                    plate = %vehicle.plate_number,
                    action = %action,
                    lane_state = %lane_state,
                    queue_number = ?vehicle.queue_number,
                    "车辆进入检查点"
                );
                self.publish_state_change();
            }
            other => {
                info!(identifier, outcome = other.kind(), "车辆到达未变更车道状态");
            }
        }

        Ok(outcome)
    }

    // ==========================================
    // 放行检查点
    // ==========================================

    /// 放行车牌当前占用/排队的检查点
    ///
    /// - is_exit: 发票、写出场时间、回填同一访问的进场记录
    /// - 否则: touchdown 置为 waiting
    /// - 随后按放行后记录的动作尝试提升队首车辆
    pub fn clear_checkpoint(&self, plate: &str, is_exit: bool) -> LaneResult<ClearResult> {
        self.clear_checkpoint_at(plate, is_exit, Utc::now())
    }

    #[instrument(skip(self))]
    pub fn clear_checkpoint_at(
        &self,
        plate: &str,
        is_exit: bool,
        now: DateTime<Utc>,
    ) -> LaneResult<ClearResult> {
        let plate = normalize_plate(plate);

        let result = with_immediate_tx(&self.conn, |tx| -> LaneResult<ClearResult> {
            let cleared = EntryLogRepository::clear_open_for_plate_tx(tx, &plate)?
                .ok_or_else(|| LaneError::NoOpenEntry(plate.clone()))?;
            let vehicle = VehicleRepository::find_by_plate_tx(tx, &plate)?;

            let (touchdown, ticket, post_action) = if is_exit {
                let fd = cleared
                    .fd
                    .clone()
                    .or_else(|| vehicle.as_ref().and_then(|v| v.fd.clone()))
                    .unwrap_or_else(|| UNKNOWN_FD.to_string());
                let pass = cleared
                    .pass
                    .or_else(|| vehicle.as_ref().and_then(|v| v.pass))
                    .unwrap_or_else(|| PassType::default_for_fd(Some(fd.as_str())));
                let touchdown = Touchdown::after_exit(is_queue_numbered(Some(fd.as_str()), Some(pass)));

                let ticket = TicketEngine::issue_ticket_tx(tx, &plate, &fd, now)?;
                EntryLogRepository::stamp_exit_tx(
                    tx,
                    cleared.entry_log_id,
                    now,
                    &ticket.ticket_id,
                    &ticket.qr_payload,
                    touchdown,
                )?;
                EntryLogRepository::backfill_visit_ticket_tx(
                    tx,
                    &cleared.visit_id,
                    cleared.entry_log_id,
                    now,
                    &ticket.ticket_id,
                    &ticket.qr_payload,
                    touchdown,
                )?;
                (touchdown, Some(ticket), LaneAction::Exit)
            } else {
                EntryLogRepository::set_visit_touchdown_tx(tx, &cleared.visit_id, Touchdown::Waiting)?;
                (Touchdown::Waiting, None, cleared.action)
            };

            let promoted_vehicle = match EntryLogRepository::promote_next_tx(tx, post_action)? {
                Some(id) => promoted_view(tx, id)?,
                None => None,
            };

            Ok(ClearResult {
                plate_number: plate.clone(),
                entry_log_id: cleared.entry_log_id,
                cleared_action: post_action,
                touchdown,
                ticket,
                promoted: promoted_vehicle.is_some(),
                promoted_vehicle,
            })
        })?;

        info!(
            plate = %result.plate_number,
            action = %result.cleared_action,
            touchdown = %result.touchdown,
            ticket_id = ?result.ticket.as_ref().map(|t| t.ticket_id.as_str()),
            promoted = ?result.promoted_vehicle.as_ref().map(|v| v.plate_number.as_str()),
            "检查点已放行"
        );
        self.publish_state_change();

        Ok(result)
    }

    // ==========================================
    // 快照与查询
    // ==========================================

    /// 当前车道快照
    pub fn snapshot(&self) -> LaneResult<SystemSnapshot> {
        with_conn(&self.conn, |conn| -> LaneResult<SystemSnapshot> {
            let entry_active = open_views(conn, LaneAction::Entry, LaneState::Active)?;
            let exit_active = open_views(conn, LaneAction::Exit, LaneState::Active)?;
            Ok(SystemSnapshot {
                entry_occupied: !entry_active.is_empty(),
                exit_occupied: !exit_active.is_empty(),
                entry_vehicle: entry_active.into_iter().next(),
                exit_vehicle: exit_active.into_iter().next(),
                entry_queue: open_views(conn, LaneAction::Entry, LaneState::Queued)?,
                exit_queue: open_views(conn, LaneAction::Exit, LaneState::Queued)?,
            })
        })
    }

    /// 进场前状态查询（无副作用）
    pub fn check_vehicle_status(&self, identifier: &str) -> LaneResult<VehicleStatusCheck> {
        let vehicle = with_conn(&self.conn, |conn| -> LaneResult<Vehicle> {
            VehicleRepository::find_by_identifier_tx(conn, identifier)?
                .ok_or_else(|| LaneError::VehicleNotFound(identifier.trim().to_string()))
        })?;
        Ok(VehicleStatusCheck {
            plate_number: vehicle.plate_number,
            status: vehicle.status,
            penalty_status: vehicle.penalty_status,
        })
    }

    /// 下一辆排号车辆将获得的排队号（不消耗）
    pub fn peek_next_queue_number(&self) -> LaneResult<i64> {
        self.peek_next_queue_number_at(Utc::now())
    }

    pub fn peek_next_queue_number_at(&self, now: DateTime<Utc>) -> LaneResult<i64> {
        let settings = self.config.load_lane_settings()?;
        with_conn(&self.conn, |conn| -> LaneResult<i64> {
            let floor = EntryLogRepository::max_queue_number_since_tx(conn, settings.day_start_utc(now))?;
            let current = LaneCounterRepository::current_tx(
                conn,
                CounterPurpose::QueueNumber,
                &settings.queue_period(now),
            )?;
            Ok(floor.max(current) + 1)
        })
    }

    // ==========================================
    // 在场记录人工调整
    // ==========================================

    /// 修改在场记录的通行证（Pila 可附排队号，Taxi/SP 清空排队号）
    pub fn update_active_pass(
        &self,
        plate: &str,
        pass: PassType,
        queue_number: Option<i64>,
    ) -> LaneResult<EntryLogEntry> {
        let repo = EntryLogRepository::new(self.conn.clone());
        let log = repo
            .update_active_pass(plate, pass, queue_number)?
            .ok_or_else(|| LaneError::NoOpenEntry(normalize_plate(plate)))?;
        info!(plate = %log.plate_number, pass = %pass, queue_number = ?log.queue_number, "在场记录通行证已修改");
        self.publish_state_change();
        Ok(log)
    }

    /// 修改在场记录的 FD 快照
    pub fn update_active_fd(&self, plate: &str, fd: &str) -> LaneResult<EntryLogEntry> {
        let repo = EntryLogRepository::new(self.conn.clone());
        let log = repo
            .update_active_fd(plate, fd)?
            .ok_or_else(|| LaneError::NoOpenEntry(normalize_plate(plate)))?;
        info!(plate = %log.plate_number, fd = ?log.fd, "在场记录 FD 已修改");
        self.publish_state_change();
        Ok(log)
    }

    /// 提交后推送: 快照 + 通行记录刷新
    fn publish_state_change(&self) {
        if !self.publisher.is_configured() {
            return;
        }
        match self.snapshot() {
            Ok(snapshot) => self.publisher.publish(LaneEvent::SystemStateChanged(snapshot)),
            Err(e) => tracing::warn!(error = %e, "构建车道快照失败，跳过推送"),
        }
        self.publisher.publish(LaneEvent::EntryLogsChanged);
    }
}

// ==========================================
// 事务内辅助
// ==========================================

/// 构造新的进场记录（排号车辆在此取号，排队时同样取号）
fn new_entry_for(
    conn: &Connection,
    vehicle: &Vehicle,
    settings: &LaneSettings,
    lane_state: LaneState,
    now: DateTime<Utc>,
) -> RepositoryResult<NewEntryLog> {
    let pass = vehicle.effective_pass();
    let queue_number = if is_queue_numbered(vehicle.fd.as_deref(), Some(pass)) {
        let floor = EntryLogRepository::max_queue_number_since_tx(conn, settings.day_start_utc(now))?;
        Some(LaneCounterRepository::next_value_tx(
            conn,
            CounterPurpose::QueueNumber,
            &settings.queue_period(now),
            floor,
            now,
        )?)
    } else {
        None
    };

    Ok(NewEntryLog {
        visit_id: Uuid::new_v4().to_string(),
        vehicle_id: vehicle.vehicle_id.clone(),
        plate_number: vehicle.plate_number.clone(),
        action: LaneAction::Entry,
        lane_state,
        logged_at: now,
        time_in: Some(now),
        route: Some(vehicle.route.clone()),
        fd: vehicle.fd.clone(),
        pass: Some(pass),
        queue_number,
    })
}

fn queue_position_of(conn: &Connection, log: &EntryLogEntry) -> RepositoryResult<Option<i64>> {
    match log.lane_state {
        LaneState::Queued => Ok(Some(EntryLogRepository::queue_position_tx(conn, log)?)),
        LaneState::Active => Ok(None),
    }
}

/// 被提升车辆的视图（进场时间取自同一访问的进场记录）
fn promoted_view(conn: &Connection, entry_log_id: i64) -> RepositoryResult<Option<VehicleView>> {
    let Some(log) = EntryLogRepository::find_by_id_tx(conn, entry_log_id)? else {
        return Ok(None);
    };
    let vehicle = VehicleRepository::find_by_plate_tx(conn, &log.plate_number)?;
    let mut view = VehicleView::compose(vehicle.as_ref(), &log);
    if let Some(time_in) = EntryLogRepository::visit_time_in_tx(conn, &log.visit_id)? {
        view.time_in = Some(time_in);
    }
    Ok(Some(view))
}

fn open_views(
    conn: &Connection,
    action: LaneAction,
    lane_state: LaneState,
) -> RepositoryResult<Vec<VehicleView>> {
    EntryLogRepository::list_open_tx(conn, action, lane_state)?
        .iter()
        .map(|log| -> RepositoryResult<VehicleView> {
            let vehicle = VehicleRepository::find_by_plate_tx(conn, &log.plate_number)?;
            Ok(VehicleView::compose(vehicle.as_ref(), log))
        })
        .collect()
}
