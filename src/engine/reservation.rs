// ==========================================
// 单车道客运站 - 排班预约与每日排班
// ==========================================
// 预约: 登记有效（status=Ok）且已绑定 RFID 的车辆可预约某一本地日期
// 转入: 次日的有效预约批量转为次日排班（from_reservation=true）
// 现场: 未预约车辆当日现场入列，排班号接在当日已用号之后
// 红线: 预约与排班共用 lane_counter(reservation_queue, 日期) 号段，取号 floor 为业务表已用最大号
// 红线: 每个业务操作恰好一个事务；日期按站点本地时区划分
// ==========================================

use crate::config::ConfigManager;
use crate::db::DATE_FORMAT;
use crate::domain::reservation::{
    NewQueueingEntry, NewReservation, PastReservationFilter, QueueingEntry, Reservation,
    ReservationCandidate, ReservationDay, ReservationStatus, TransferReport, UpcomingReservations,
};
use crate::domain::types::{PassType, VehicleStatus};
use crate::domain::vehicle::Vehicle;
use crate::engine::error::{LaneError, LaneResult};
use crate::engine::tx::{with_conn, with_immediate_tx};
use crate::repository::counter_repo::{CounterPurpose, LaneCounterRepository};
use crate::repository::queueing_repo::QueueingRepository;
use crate::repository::reservation_repo::ReservationRepository;
use crate::repository::vehicle_repo::{normalize_plate, VehicleRepository};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

/// 车牌联想的最短输入长度
pub const MIN_CANDIDATE_FRAGMENT_LEN: usize = 2;

/// 车牌联想的最大返回条数
pub const MAX_CANDIDATES: usize = 20;

// ==========================================
// ReservationEngine
// ==========================================
pub struct ReservationEngine {
    conn: Arc<Mutex<Connection>>,
    config: Arc<ConfigManager>,
}

impl ReservationEngine {
    pub fn new(conn: Arc<Mutex<Connection>>, config: Arc<ConfigManager>) -> Self {
        Self { conn, config }
    }

    fn local_today(&self, now: DateTime<Utc>) -> LaneResult<NaiveDate> {
        Ok(self.config.load_lane_settings()?.local_date(now))
    }

    // ==========================================
    // 预约
    // ==========================================

    /// 创建预约
    ///
    /// # 返回
    /// - `Err(VehicleNotFound)`: 车辆未登记
    /// - `Err(VehicleRestricted)`: 登记状态非 Ok 或未绑定 RFID
    /// - `Err(DuplicateReservation)`: 同车牌同日已有有效预约
    /// - `Err(ReservationDateInPast)`: 预约日期早于站点今日
    pub fn create_reservation(&self, request: &NewReservation) -> LaneResult<Reservation> {
        self.create_reservation_at(request, Utc::now())
    }

    #[instrument(skip(self, request), fields(plate = %request.plate_number, date = %request.reservation_date))]
    pub fn create_reservation_at(
        &self,
        request: &NewReservation,
        now: DateTime<Utc>,
    ) -> LaneResult<Reservation> {
        let today = self.local_today(now)?;
        let date = request.reservation_date;
        if date < today {
            return Err(LaneError::ReservationDateInPast(date));
        }
        let plate = normalize_plate(&request.plate_number);

        let reservation = with_immediate_tx(&self.conn, |tx| -> LaneResult<Reservation> {
            let vehicle = VehicleRepository::find_by_plate_tx(tx, &plate)?
                .ok_or_else(|| LaneError::VehicleNotFound(plate.clone()))?;
            if !is_reservable(&vehicle) {
                return Err(LaneError::VehicleRestricted {
                    plate: plate.clone(),
                    status: vehicle.status,
                    has_rfid: has_rfid(&vehicle),
                });
            }
            if ReservationRepository::find_reserved_tx(tx, &plate, date)?.is_some() {
                return Err(LaneError::DuplicateReservation { plate: plate.clone(), date });
            }

            let number = next_day_number(tx, date, now)?;
            let driver_name = match request.driver_name.trim() {
                "" => vehicle.driver_name.as_str(),
                name => name,
            };
            Ok(ReservationRepository::insert_tx(
                tx,
                number,
                driver_name,
                &plate,
                &vehicle.route,
                date,
                now,
            )?)
        })?;

        info!(
            reservation_id = %reservation.reservation_id,
            queueing_number = reservation.queueing_number,
            "预约已创建"
        );
        Ok(reservation)
    }

    /// 取消预约（仅 Reserved 可取消，记录保留）
    pub fn cancel_reservation(&self, reservation_id: &str) -> LaneResult<Reservation> {
        self.cancel_reservation_at(reservation_id, Utc::now())
    }

    #[instrument(skip(self))]
    pub fn cancel_reservation_at(
        &self,
        reservation_id: &str,
        now: DateTime<Utc>,
    ) -> LaneResult<Reservation> {
        let id = reservation_id.trim().to_string();

        let cancelled = with_immediate_tx(&self.conn, |tx| -> LaneResult<Reservation> {
            let current = ReservationRepository::find_by_id_tx(tx, &id)?
                .ok_or_else(|| LaneError::ReservationNotFound(id.clone()))?;
            if current.status != ReservationStatus::Reserved
                || !ReservationRepository::transition_tx(
                    tx,
                    &id,
                    ReservationStatus::Reserved,
                    ReservationStatus::Cancelled,
                    now,
                )?
            {
                return Err(LaneError::ReservationClosed {
                    id: id.clone(),
                    status: current.status,
                });
            }
            ReservationRepository::find_by_id_tx(tx, &id)?
                .ok_or_else(|| LaneError::ReservationNotFound(id.clone()))
        })?;

        info!(plate = %cancelled.plate_number, date = %cancelled.reservation_date, "预约已取消");
        Ok(cancelled)
    }

    /// 明后两天的有效预约
    pub fn upcoming_reservations(&self) -> LaneResult<UpcomingReservations> {
        self.upcoming_reservations_at(Utc::now())
    }

    pub fn upcoming_reservations_at(&self, now: DateTime<Utc>) -> LaneResult<UpcomingReservations> {
        let today = self.local_today(now)?;
        let repo = ReservationRepository::new(self.conn.clone());
        let day = |offset: i64| -> LaneResult<ReservationDay> {
            let date = today + Duration::days(offset);
            Ok(ReservationDay {
                date,
                day_name: date.format("%A").to_string(),
                reservations: repo.list_by_date(date, ReservationStatus::Reserved)?,
            })
        };
        Ok(UpcomingReservations {
            tomorrow: day(1)?,
            day_after_tomorrow: day(2)?,
        })
    }

    /// 历史预约（全部状态）
    pub fn past_reservations(&self, filter: &PastReservationFilter) -> LaneResult<Vec<Reservation>> {
        self.past_reservations_at(filter, Utc::now())
    }

    pub fn past_reservations_at(
        &self,
        filter: &PastReservationFilter,
        now: DateTime<Utc>,
    ) -> LaneResult<Vec<Reservation>> {
        let today = self.local_today(now)?;
        Ok(ReservationRepository::new(self.conn.clone()).list_past(today, filter)?)
    }

    /// 车牌联想: 返回匹配车辆及其可预约资格
    ///
    /// 输入不足两个字符时返回空列表
    pub fn search_candidates(&self, fragment: &str) -> LaneResult<Vec<ReservationCandidate>> {
        let fragment = fragment.trim();
        if fragment.chars().count() < MIN_CANDIDATE_FRAGMENT_LEN {
            return Ok(Vec::new());
        }
        let vehicles = VehicleRepository::new(self.conn.clone())
            .search_by_plate_fragment(fragment, MAX_CANDIDATES)?;
        Ok(vehicles
            .into_iter()
            .map(|v| ReservationCandidate {
                is_valid: is_reservable(&v),
                rfid: v.rfid.clone().unwrap_or_default(),
                plate_number: v.plate_number,
                driver_name: v.driver_name,
                route: v.route,
                status: v.status,
            })
            .collect())
    }

    // ==========================================
    // 排班
    // ==========================================

    /// 次日有效预约转入次日排班
    ///
    /// 排班号沿用预约号；车牌当日已有未离列排班时跳过入列，预约仍标记为已转入
    pub fn transfer_to_queueing(&self) -> LaneResult<TransferReport> {
        self.transfer_to_queueing_at(Utc::now())
    }

    #[instrument(skip(self))]
    pub fn transfer_to_queueing_at(&self, now: DateTime<Utc>) -> LaneResult<TransferReport> {
        let queue_date = self.local_today(now)? + Duration::days(1);

        let report = with_immediate_tx(&self.conn, |tx| -> LaneResult<TransferReport> {
            let reservations =
                ReservationRepository::list_by_date_tx(tx, queue_date, ReservationStatus::Reserved)?;

            let mut transferred = Vec::with_capacity(reservations.len());
            let mut skipped_plates = Vec::new();
            for reservation in reservations {
                if QueueingRepository::has_open_entry_tx(tx, &reservation.plate_number, queue_date)? {
                    warn!(plate = %reservation.plate_number, "车辆已在排班中，跳过预约转入");
                    skipped_plates.push(reservation.plate_number.clone());
                } else {
                    let vehicle = VehicleRepository::find_by_plate_tx(tx, &reservation.plate_number)?;
                    let entry = NewQueueingEntry {
                        queueing_number: reservation.queueing_number,
                        driver_name: reservation.driver_name.clone(),
                        plate_number: reservation.plate_number.clone(),
                        fd: vehicle.as_ref().and_then(|v| v.fd.clone()),
                        pass: PassType::Pila,
                        status: vehicle.as_ref().map(|v| v.status),
                        queue_date,
                        time_in: None,
                        reservation_id: Some(reservation.reservation_id.clone()),
                    };
                    transferred.push(QueueingRepository::insert_tx(tx, &entry, now)?);
                }
                ReservationRepository::transition_tx(
                    tx,
                    &reservation.reservation_id,
                    ReservationStatus::Reserved,
                    ReservationStatus::Transferred,
                    now,
                )?;
            }

            Ok(TransferReport {
                queue_date,
                transferred,
                skipped_plates,
            })
        })?;

        info!(
            queue_date = %report.queue_date,
            transferred = report.transferred.len(),
            skipped = report.skipped_plates.len(),
            "预约已转入排班"
        );
        Ok(report)
    }

    /// 今日排班名单
    pub fn today_queueing(&self) -> LaneResult<Vec<QueueingEntry>> {
        self.today_queueing_at(Utc::now())
    }

    pub fn today_queueing_at(&self, now: DateTime<Utc>) -> LaneResult<Vec<QueueingEntry>> {
        let today = self.local_today(now)?;
        Ok(QueueingRepository::new(self.conn.clone()).list_for_date(today)?)
    }

    /// 现场入列（未预约车辆）
    ///
    /// # 返回
    /// - `Err(VehicleNotFound)`: 车辆未登记
    /// - `Err(DuplicateQueueing)`: 车牌今日已有未离列排班
    pub fn create_walk_in(&self, plate: &str, driver_name: &str) -> LaneResult<QueueingEntry> {
        self.create_walk_in_at(plate, driver_name, Utc::now())
    }

    #[instrument(skip(self))]
    pub fn create_walk_in_at(
        &self,
        plate: &str,
        driver_name: &str,
        now: DateTime<Utc>,
    ) -> LaneResult<QueueingEntry> {
        let today = self.local_today(now)?;
        let plate = normalize_plate(plate);

        let entry = with_immediate_tx(&self.conn, |tx| -> LaneResult<QueueingEntry> {
            let vehicle = VehicleRepository::find_by_plate_tx(tx, &plate)?
                .ok_or_else(|| LaneError::VehicleNotFound(plate.clone()))?;
            if QueueingRepository::has_open_entry_tx(tx, &plate, today)? {
                return Err(LaneError::DuplicateQueueing { plate: plate.clone(), date: today });
            }

            let number = next_day_number(tx, today, now)?;
            let driver_name = match driver_name.trim() {
                "" => vehicle.driver_name.clone(),
                name => name.to_string(),
            };
            let entry = NewQueueingEntry {
                queueing_number: number,
                driver_name,
                plate_number: plate.clone(),
                fd: vehicle.fd.clone(),
                pass: PassType::Pila,
                status: Some(vehicle.status),
                queue_date: today,
                time_in: Some(now),
                reservation_id: None,
            };
            Ok(QueueingRepository::insert_tx(tx, &entry, now)?)
        })?;

        info!(plate = %entry.plate_number, queueing_number = entry.queueing_number, "现场入列");
        Ok(entry)
    }

    /// 记录离列时刻（重复调用保持首次时刻）
    pub fn update_time_out(&self, queueing_id: &str) -> LaneResult<QueueingEntry> {
        self.update_time_out_at(queueing_id, Utc::now())
    }

    #[instrument(skip(self))]
    pub fn update_time_out_at(&self, queueing_id: &str, now: DateTime<Utc>) -> LaneResult<QueueingEntry> {
        let id = queueing_id.trim().to_string();

        let (entry, updated) = with_immediate_tx(&self.conn, |tx| -> LaneResult<(QueueingEntry, bool)> {
            if QueueingRepository::find_by_id_tx(tx, &id)?.is_none() {
                return Err(LaneError::QueueingEntryNotFound(id.clone()));
            }
            let updated = QueueingRepository::set_time_out_tx(tx, &id, now)?;
            let entry = QueueingRepository::find_by_id_tx(tx, &id)?
                .ok_or_else(|| LaneError::QueueingEntryNotFound(id.clone()))?;
            Ok((entry, updated))
        })?;

        if updated {
            info!(plate = %entry.plate_number, queueing_number = entry.queueing_number, "排班离列");
        }
        Ok(entry)
    }

    /// 某日下一个排班号（不消耗）
    pub fn peek_next_number(&self, day: NaiveDate) -> LaneResult<i64> {
        with_conn(&self.conn, |conn| -> LaneResult<i64> {
            let period = day.format(DATE_FORMAT).to_string();
            let current =
                LaneCounterRepository::current_tx(conn, CounterPurpose::ReservationQueue, &period)?;
            let floor = QueueingRepository::max_number_for_date_tx(conn, day)?;
            Ok(current.max(floor) + 1)
        })
    }
}

/// 取该日期的下一个排班号
fn next_day_number(conn: &Connection, day: NaiveDate, now: DateTime<Utc>) -> LaneResult<i64> {
    let floor = QueueingRepository::max_number_for_date_tx(conn, day)?;
    Ok(LaneCounterRepository::next_value_tx(
        conn,
        CounterPurpose::ReservationQueue,
        &day.format(DATE_FORMAT).to_string(),
        floor,
        now,
    )?)
}

fn has_rfid(vehicle: &Vehicle) -> bool {
    vehicle.rfid.as_deref().is_some_and(|r| !r.trim().is_empty())
}

/// 可预约: 登记有效且已绑定 RFID（处罚状态不影响预约）
fn is_reservable(vehicle: &Vehicle) -> bool {
    vehicle.status == VehicleStatus::Ok && has_rfid(vehicle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vehicle::NewVehicle;
    use chrono::TimeZone;

    struct Fixture {
        conn: Arc<Mutex<Connection>>,
        engine: ReservationEngine,
    }

    fn setup() -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let config = Arc::new(ConfigManager::from_connection(conn.clone()));

        let vehicles = VehicleRepository::new(conn.clone());
        let map = crate::config::default_route_fd_map();
        let registered = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        for (plate, rfid) in [("PILA-1", "RF-1"), ("PILA-2", "RF-2"), ("PILA-3", "RF-3")] {
            vehicles
                .register(
                    &NewVehicle::new(plate, "Juan", "SanJose - Cabanatuan City").with_rfid(rfid),
                    &map,
                    registered,
                )
                .unwrap();
        }
        vehicles
            .register(&NewVehicle::new("NORFID-1", "Pedro", "SanJose - Baguio"), &map, registered)
            .unwrap();

        let engine = ReservationEngine::new(conn.clone(), config);
        Fixture { conn, engine }
    }

    /// 2025-06-10 10:00 +08:00（周二）
    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 2, 0, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn reserve(fx: &Fixture, plate: &str, date: NaiveDate) -> LaneResult<Reservation> {
        fx.engine.create_reservation_at(
            &NewReservation {
                driver_name: String::new(),
                plate_number: plate.to_string(),
                reservation_date: date,
            },
            t0(),
        )
    }

    #[test]
    fn test_numbers_are_per_reservation_date() {
        let fx = setup();
        let a = reserve(&fx, "pila-1", day(11)).unwrap();
        let b = reserve(&fx, "PILA-2", day(11)).unwrap();
        let c = reserve(&fx, "PILA-1", day(12)).unwrap();
        assert_eq!((a.queueing_number, b.queueing_number, c.queueing_number), (1, 2, 1));
        assert_eq!(a.plate_number, "PILA-1");
        assert_eq!(a.driver_name, "Juan");
        assert_eq!(a.route, "SanJose - Cabanatuan City");
        assert_eq!(fx.engine.peek_next_number(day(11)).unwrap(), 3);
    }

    #[test]
    fn test_restricted_vehicles_cannot_reserve() {
        let fx = setup();
        let err = reserve(&fx, "NORFID-1", day(11)).unwrap_err();
        assert!(matches!(err, LaneError::VehicleRestricted { has_rfid: false, .. }));

        {
            let guard = fx.conn.lock().unwrap();
            guard
                .execute("UPDATE vehicle SET status = 'Expired' WHERE plate_number = 'PILA-3'", [])
                .unwrap();
        }
        let err = reserve(&fx, "PILA-3", day(11)).unwrap_err();
        assert!(matches!(
            err,
            LaneError::VehicleRestricted { status: VehicleStatus::Expired, has_rfid: true, .. }
        ));

        assert!(matches!(reserve(&fx, "NOPE", day(11)), Err(LaneError::VehicleNotFound(_))));
        assert!(matches!(
            reserve(&fx, "PILA-1", day(9)),
            Err(LaneError::ReservationDateInPast(_))
        ));
    }

    #[test]
    fn test_duplicate_then_cancel_frees_the_date() {
        let fx = setup();
        let first = reserve(&fx, "PILA-1", day(11)).unwrap();
        assert!(matches!(
            reserve(&fx, "PILA-1", day(11)),
            Err(LaneError::DuplicateReservation { .. })
        ));

        let cancelled = fx.engine.cancel_reservation_at(&first.reservation_id, t0()).unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        assert!(matches!(
            fx.engine.cancel_reservation_at(&first.reservation_id, t0()),
            Err(LaneError::ReservationClosed { status: ReservationStatus::Cancelled, .. })
        ));
        assert!(matches!(
            fx.engine.cancel_reservation_at("missing", t0()),
            Err(LaneError::ReservationNotFound(_))
        ));

        // 号码不回收
        let again = reserve(&fx, "PILA-1", day(11)).unwrap();
        assert_eq!(again.queueing_number, 2);
    }

    #[test]
    fn test_upcoming_lists_tomorrow_and_day_after() {
        let fx = setup();
        reserve(&fx, "PILA-2", day(11)).unwrap();
        reserve(&fx, "PILA-1", day(11)).unwrap();
        reserve(&fx, "PILA-1", day(12)).unwrap();
        reserve(&fx, "PILA-3", day(13)).unwrap();
        let today = reserve(&fx, "PILA-3", day(10)).unwrap();
        assert_eq!(today.queueing_number, 1);

        let upcoming = fx.engine.upcoming_reservations_at(t0()).unwrap();
        assert_eq!(upcoming.tomorrow.date, day(11));
        assert_eq!(upcoming.tomorrow.day_name, "Wednesday");
        let plates: Vec<_> =
            upcoming.tomorrow.reservations.iter().map(|r| r.plate_number.as_str()).collect();
        assert_eq!(plates, vec!["PILA-2", "PILA-1"]);
        assert_eq!(upcoming.day_after_tomorrow.date, day(12));
        assert_eq!(upcoming.day_after_tomorrow.day_name, "Thursday");
        assert_eq!(upcoming.day_after_tomorrow.reservations.len(), 1);
    }

    #[test]
    fn test_transfer_moves_tomorrow_into_queueing() {
        let fx = setup();
        let r1 = reserve(&fx, "PILA-1", day(11)).unwrap();
        let r2 = reserve(&fx, "PILA-2", day(11)).unwrap();
        fx.engine.cancel_reservation_at(&r2.reservation_id, t0()).unwrap();
        reserve(&fx, "PILA-3", day(12)).unwrap();

        let report = fx.engine.transfer_to_queueing_at(t0()).unwrap();
        assert_eq!(report.queue_date, day(11));
        assert_eq!(report.transferred.len(), 1);
        assert!(report.skipped_plates.is_empty());
        let entry = &report.transferred[0];
        assert_eq!(entry.plate_number, "PILA-1");
        assert_eq!(entry.queueing_number, r1.queueing_number);
        assert!(entry.from_reservation);
        assert_eq!(entry.reservation_id.as_deref(), Some(r1.reservation_id.as_str()));
        assert_eq!(entry.fd.as_deref(), Some("FD1"));
        assert_eq!(entry.pass, PassType::Pila);
        assert_eq!(entry.status, Some(VehicleStatus::Ok));
        assert_eq!(entry.time_in, None);

        let repo = ReservationRepository::new(fx.conn.clone());
        assert_eq!(
            repo.find_by_id(&r1.reservation_id).unwrap().unwrap().status,
            ReservationStatus::Transferred
        );
        // 已转入的预约不可取消，也不会重复转入
        assert!(matches!(
            fx.engine.cancel_reservation_at(&r1.reservation_id, t0()),
            Err(LaneError::ReservationClosed { .. })
        ));
        assert!(fx.engine.transfer_to_queueing_at(t0()).unwrap().transferred.is_empty());

        // 次日排班名单，现场入列接在预约号之后
        let next_day = t0() + Duration::days(1);
        let walk_in = fx.engine.create_walk_in_at("PILA-3", "", next_day).unwrap();
        assert_eq!(walk_in.queueing_number, 3);
        let listed = fx.engine.today_queueing_at(next_day).unwrap();
        assert_eq!(
            listed.iter().map(|e| e.plate_number.as_str()).collect::<Vec<_>>(),
            vec!["PILA-1", "PILA-3"]
        );
    }

    #[test]
    fn test_walk_in_numbering_resets_daily() {
        let fx = setup();
        let a = fx.engine.create_walk_in_at("PILA-1", "Jose", t0()).unwrap();
        let b = fx.engine.create_walk_in_at("NORFID-1", "", t0()).unwrap();
        assert_eq!((a.queueing_number, b.queueing_number), (1, 2));
        assert_eq!(a.driver_name, "Jose");
        assert_eq!(b.driver_name, "Pedro");
        assert_eq!(a.time_in, Some(t0()));
        assert!(!a.from_reservation);

        assert!(matches!(
            fx.engine.create_walk_in_at("PILA-1", "", t0()),
            Err(LaneError::DuplicateQueueing { .. })
        ));
        assert!(matches!(
            fx.engine.create_walk_in_at("NOPE", "", t0()),
            Err(LaneError::VehicleNotFound(_))
        ));

        // 本地次日 00:30 (+08:00)
        let next_day = Utc.with_ymd_and_hms(2025, 6, 10, 16, 30, 0).unwrap();
        let c = fx.engine.create_walk_in_at("PILA-1", "", next_day).unwrap();
        assert_eq!(c.queueing_number, 1);
        assert_eq!(c.queue_date, day(11));
    }

    #[test]
    fn test_time_out_recorded_once() {
        let fx = setup();
        let entry = fx.engine.create_walk_in_at("PILA-1", "", t0()).unwrap();

        let out = fx.engine.update_time_out_at(&entry.queueing_id, t0() + Duration::hours(1)).unwrap();
        assert_eq!(out.time_out, Some(t0() + Duration::hours(1)));
        let again = fx.engine.update_time_out_at(&entry.queueing_id, t0() + Duration::hours(2)).unwrap();
        assert_eq!(again.time_out, Some(t0() + Duration::hours(1)));

        // 离列后当日可再次入列
        let second = fx.engine.create_walk_in_at("PILA-1", "", t0() + Duration::hours(3)).unwrap();
        assert_eq!(second.queueing_number, 2);

        assert!(matches!(
            fx.engine.update_time_out_at("missing", t0()),
            Err(LaneError::QueueingEntryNotFound(_))
        ));
    }

    #[test]
    fn test_candidates_report_reservability() {
        let fx = setup();
        assert!(fx.engine.search_candidates("p").unwrap().is_empty());

        let hits = fx.engine.search_candidates("pila").unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|c| c.is_valid));

        let no_rfid = fx.engine.search_candidates("NORFID").unwrap();
        assert_eq!(no_rfid.len(), 1);
        assert!(!no_rfid[0].is_valid);
        assert_eq!(no_rfid[0].rfid, "");
    }
}
