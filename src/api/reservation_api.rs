// ==========================================
// 单车道客运站 - 预约与排班 API
// ==========================================
// 职责: 预约创建/取消/查询，预约转入排班，现场入列与离列
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::lane_api::require_non_empty;
use crate::db::{parse_date, DATE_FORMAT};
use crate::domain::reservation::{
    NewReservation, PastReservationFilter, QueueingEntry, Reservation, ReservationCandidate,
    TransferReport, UpcomingReservations,
};
use crate::engine::reservation::ReservationEngine;
use crate::i18n::t_with_args;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationResponse {
    pub message: String,
    pub reservation: Reservation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResponse {
    pub message: String,
    #[serde(flatten)]
    pub report: TransferReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueingResponse {
    pub message: String,
    pub entry: QueueingEntry,
}

pub struct ReservationApi {
    reservations: Arc<ReservationEngine>,
}

impl ReservationApi {
    pub fn new(reservations: Arc<ReservationEngine>) -> Self {
        Self { reservations }
    }

    /// 创建预约
    ///
    /// # 参数
    /// - reservation_date: 本地日期 "YYYY-MM-DD"
    /// - driver_name: 可为空，为空时取车辆登记的司机
    pub fn create_reservation(
        &self,
        driver_name: &str,
        plate: &str,
        reservation_date: &str,
    ) -> ApiResult<ReservationResponse> {
        let plate = require_non_empty("plate_number", plate)?;
        let reservation_date = parse_required_date("reservation_date", reservation_date)?;

        let reservation = self.reservations.create_reservation(&NewReservation {
            driver_name: driver_name.to_string(),
            plate_number: plate.to_string(),
            reservation_date,
        })?;
        let number = reservation.queueing_number.to_string();
        let date = reservation.reservation_date.format(DATE_FORMAT).to_string();
        Ok(ReservationResponse {
            message: t_with_args(
                "reservation.created",
                &[
                    ("number", number.as_str()),
                    ("plate", reservation.plate_number.as_str()),
                    ("date", date.as_str()),
                ],
            ),
            reservation,
        })
    }

    pub fn cancel_reservation(&self, reservation_id: &str) -> ApiResult<ReservationResponse> {
        let reservation_id = require_non_empty("reservation_id", reservation_id)?;
        let reservation = self.reservations.cancel_reservation(reservation_id)?;
        let date = reservation.reservation_date.format(DATE_FORMAT).to_string();
        Ok(ReservationResponse {
            message: t_with_args(
                "reservation.cancelled",
                &[("plate", reservation.plate_number.as_str()), ("date", date.as_str())],
            ),
            reservation,
        })
    }

    pub fn upcoming_reservations(&self) -> ApiResult<UpcomingReservations> {
        Ok(self.reservations.upcoming_reservations()?)
    }

    /// 历史预约；各条件为空串时视为未指定
    pub fn past_reservations(
        &self,
        date: Option<&str>,
        plate: Option<&str>,
        driver_name: Option<&str>,
    ) -> ApiResult<Vec<Reservation>> {
        let date = match date.map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => Some(parse_required_date("date", raw)?),
            None => None,
        };
        let filter = PastReservationFilter {
            date,
            plate_number: plate.map(str::to_string),
            driver_name: driver_name.map(str::to_string),
        };
        Ok(self.reservations.past_reservations(&filter)?)
    }

    /// 预约前车牌联想
    pub fn vehicle_candidates(&self, fragment: &str) -> ApiResult<Vec<ReservationCandidate>> {
        Ok(self.reservations.search_candidates(fragment)?)
    }

    pub fn transfer_to_queueing(&self) -> ApiResult<TransferResponse> {
        let report = self.reservations.transfer_to_queueing()?;
        let count = report.transferred.len().to_string();
        let date = report.queue_date.format(DATE_FORMAT).to_string();
        Ok(TransferResponse {
            message: t_with_args(
                "reservation.transferred",
                &[("count", count.as_str()), ("date", date.as_str())],
            ),
            report,
        })
    }

    pub fn today_queueing(&self) -> ApiResult<Vec<QueueingEntry>> {
        Ok(self.reservations.today_queueing()?)
    }

    pub fn create_walk_in(&self, driver_name: &str, plate: &str) -> ApiResult<QueueingResponse> {
        let plate = require_non_empty("plate_number", plate)?;
        let entry = self.reservations.create_walk_in(plate, driver_name)?;
        let number = entry.queueing_number.to_string();
        Ok(QueueingResponse {
            message: t_with_args(
                "queueing.walk_in",
                &[("plate", entry.plate_number.as_str()), ("number", number.as_str())],
            ),
            entry,
        })
    }

    pub fn update_time_out(&self, queueing_id: &str) -> ApiResult<QueueingResponse> {
        let queueing_id = require_non_empty("queueing_id", queueing_id)?;
        let entry = self.reservations.update_time_out(queueing_id)?;
        Ok(QueueingResponse {
            message: t_with_args("queueing.timed_out", &[("plate", entry.plate_number.as_str())]),
            entry,
        })
    }
}

fn parse_required_date(field: &str, raw: &str) -> ApiResult<chrono::NaiveDate> {
    let raw = require_non_empty(field, raw)?;
    parse_date(raw).ok_or_else(|| {
        ApiError::InvalidInput(format!("{} 日期格式应为 YYYY-MM-DD: {}", field, raw))
    })
}
