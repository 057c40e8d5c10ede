// ==========================================
// 单车道客运站 - 票据与扫码验证引擎
// ==========================================
// 职责: 出场发票、二维码扫码验证（FD1..FD4 共用一套状态机）
// 验证顺序:
//   1. 解析载荷（失败 → MalformedQr）
//   2. 按 (车牌, 票号) 查找记录（缺失 → EntryLogNotFound）
//   3. touchdown 恰为 "Exited Successfully" → 重复扫码，不做任何修改
//   4. 无票号或无出场时间 → 处罚
//   5. 超过票据有效期 → 处罚
//   6. FD 一致 → 放行；不一致 → 处罚
// 红线: 处罚状态与 touchdown 在同一事务内写入
// ==========================================

use crate::config::ConfigManager;
use crate::domain::ticket::{format_ticket_id, QrPayload, Ticket};
use crate::domain::types::{PenaltyStatus, Touchdown};
use crate::engine::error::{LaneError, LaneResult};
use crate::engine::events::{LaneEvent, OptionalEventPublisher};
use crate::engine::tx::with_immediate_tx;
use crate::repository::counter_repo::{CounterPurpose, LaneCounterRepository, GLOBAL_PERIOD};
use crate::repository::entry_log_repo::EntryLogRepository;
use crate::repository::error::RepositoryResult;
use crate::repository::vehicle_repo::VehicleRepository;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

// ==========================================
// 扫码结果
// ==========================================

/// 扫码判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanVerdict {
    Success,
    AlreadyScanned,
    NoExitRecord,
    Expired,
    WrongEndpoint,
}

impl ScanVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanVerdict::Success => "success",
            ScanVerdict::AlreadyScanned => "already_scanned",
            ScanVerdict::NoExitRecord => "no_exit_record",
            ScanVerdict::Expired => "expired",
            ScanVerdict::WrongEndpoint => "wrong_endpoint",
        }
    }

    /// 是否触发处罚
    pub fn is_penalized(&self) -> bool {
        matches!(
            self,
            ScanVerdict::NoExitRecord | ScanVerdict::Expired | ScanVerdict::WrongEndpoint
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub verdict: ScanVerdict,
    pub plate_number: String,
    pub ticket_id: String,
    pub entry_log_id: i64,
    pub expected_fd: String,
    pub actual_fd: Option<String>,
    pub touchdown: Touchdown,
    pub time_out: Option<DateTime<Utc>>,
}

// ==========================================
// TicketEngine
// ==========================================
pub struct TicketEngine {
    conn: Arc<Mutex<Connection>>,
    config: Arc<ConfigManager>,
    publisher: OptionalEventPublisher,
}

impl TicketEngine {
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

    /// 发票: 全局票号 +1，生成二维码载荷
    ///
    /// 票号下限取已写入记录中的最大票号
    pub(crate) fn issue_ticket_tx(
        conn: &Connection,
        plate: &str,
        fd: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Ticket> {
        let floor = EntryLogRepository::max_ticket_number_tx(conn)?;
        let value = LaneCounterRepository::next_value_tx(
            conn,
            CounterPurpose::TicketId,
            GLOBAL_PERIOD,
            floor,
            now,
        )?;
        let ticket_id = format_ticket_id(value);
        let qr_payload = QrPayload::new(plate, &ticket_id, fd).to_string();

        Ok(Ticket {
            ticket_id,
            qr_payload,
        })
    }

    /// 扫码验证
    pub fn validate_qr(&self, raw: &str, expected_fd: &str) -> LaneResult<ScanOutcome> {
        self.validate_qr_at(raw, expected_fd, Utc::now())
    }

    #[instrument(skip(self, raw), fields(expected_fd = %expected_fd))]
    pub fn validate_qr_at(
        &self,
        raw: &str,
        expected_fd: &str,
        now: DateTime<Utc>,
    ) -> LaneResult<ScanOutcome> {
        let payload = QrPayload::parse(raw)?;
        let expected_fd = expected_fd.trim().to_uppercase();
        let validity = self.config.load_lane_settings()?.ticket_validity();

        let outcome = with_immediate_tx(&self.conn, |tx| -> LaneResult<ScanOutcome> {
            let row = EntryLogRepository::find_by_plate_and_ticket_tx(
                tx,
                &payload.plate_number,
                &payload.ticket_id,
            )?
            .ok_or_else(|| {
                LaneError::EntryLogNotFound(format!(
                    "{}/{}",
                    payload.plate_number, payload.ticket_id
                ))
            })?;

            let mut outcome = ScanOutcome {
                verdict: ScanVerdict::AlreadyScanned,
                plate_number: row.plate_number.clone(),
                ticket_id: payload.ticket_id.clone(),
                entry_log_id: row.entry_log_id,
                expected_fd: expected_fd.clone(),
                actual_fd: row.fd.clone(),
                touchdown: row.touchdown,
                time_out: row.time_out,
            };

            if row.touchdown == Touchdown::ExitedSuccessfully {
                return Ok(outcome);
            }

            let (verdict, touchdown) = match (row.ticket_id.as_deref(), row.time_out) {
                (None, _) | (_, None) => (ScanVerdict::NoExitRecord, Touchdown::ExitedNoExitRecord),
                (Some(_), Some(time_out)) if now - time_out > validity => {
                    (ScanVerdict::Expired, Touchdown::ExitedExpiredTicket)
                }
                _ if row
                    .fd
                    .as_deref()
                    .is_some_and(|fd| fd.eq_ignore_ascii_case(&expected_fd)) =>
                {
                    (ScanVerdict::Success, Touchdown::ExitedSuccessfully)
                }
                _ => (ScanVerdict::WrongEndpoint, Touchdown::ExitedWrongEndpoint),
            };

            EntryLogRepository::set_visit_touchdown_tx(tx, &row.visit_id, touchdown)?;
            if verdict.is_penalized() {
                VehicleRepository::set_penalty_tx(tx, &row.plate_number, PenaltyStatus::Penalty, None, now)?;
            }

            outcome.verdict = verdict;
            outcome.touchdown = touchdown;
            Ok(outcome)
        })?;

        info!(
            plate = %outcome.plate_number,
            ticket_id = %outcome.ticket_id,
            verdict = outcome.verdict.as_str(),
            touchdown = %outcome.touchdown,
            "扫码验证完成"
        );

        if outcome.verdict != ScanVerdict::AlreadyScanned {
            self.publisher.publish(LaneEvent::EntryLogsChanged);
        }

        Ok(outcome)
    }
}
