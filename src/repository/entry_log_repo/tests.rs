use super::EntryLogRepository;
use crate::domain::entry_log::NewEntryLog;
use crate::domain::types::{LaneAction, LaneState, PassType, Touchdown};
use crate::repository::error::RepositoryError;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

fn setup_test_db() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();
    crate::db::init_schema(&conn).unwrap();

    for (vid, plate) in [("v-1", "AAA-111"), ("v-2", "BBB-222"), ("v-3", "CCC-333")] {
        conn.execute(
            r#"
            INSERT INTO vehicle (plate_number, vehicle_id, driver_name, route, fd, created_at)
            VALUES (?1, ?2, 'driver', 'SanJose - Cabanatuan City', 'FD1', '2025-06-01 00:00:00.000')
            "#,
            [plate, vid],
        )
        .unwrap();
    }

    Arc::new(Mutex::new(conn))
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 1, 0, 0).unwrap()
}

fn make_log(vid: &str, plate: &str, state: LaneState, at: DateTime<Utc>) -> NewEntryLog {
    NewEntryLog {
        visit_id: format!("visit-{}", plate),
        vehicle_id: vid.to_string(),
        plate_number: plate.to_string(),
        action: LaneAction::Entry,
        lane_state: state,
        logged_at: at,
        time_in: Some(at),
        route: Some("SanJose - Cabanatuan City".to_string()),
        fd: Some("FD1".to_string()),
        pass: Some(PassType::Pila),
        queue_number: None,
    }
}

#[test]
fn test_open_row_unique_per_plate() {
    let conn = setup_test_db();
    let guard = conn.lock().unwrap();

    EntryLogRepository::insert_tx(&guard, &make_log("v-1", "AAA-111", LaneState::Active, base_time()))
        .unwrap();
    let err = EntryLogRepository::insert_tx(
        &guard,
        &make_log("v-1", "AAA-111", LaneState::Queued, base_time()),
    )
    .unwrap_err();
    assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
}

#[test]
fn test_second_active_on_same_checkpoint_rejected() {
    let conn = setup_test_db();
    let guard = conn.lock().unwrap();

    EntryLogRepository::insert_tx(&guard, &make_log("v-1", "AAA-111", LaneState::Active, base_time()))
        .unwrap();
    let err = EntryLogRepository::insert_tx(
        &guard,
        &make_log("v-2", "BBB-222", LaneState::Active, base_time()),
    )
    .unwrap_err();
    assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
}

#[test]
fn test_promote_takes_oldest_and_requires_free_checkpoint() {
    let conn = setup_test_db();
    let guard = conn.lock().unwrap();
    let t0 = base_time();

    EntryLogRepository::insert_tx(&guard, &make_log("v-1", "AAA-111", LaneState::Active, t0)).unwrap();
    let second = EntryLogRepository::insert_tx(
        &guard,
        &make_log("v-2", "BBB-222", LaneState::Queued, t0 + Duration::seconds(1)),
    )
    .unwrap();
    EntryLogRepository::insert_tx(
        &guard,
        &make_log("v-3", "CCC-333", LaneState::Queued, t0 + Duration::seconds(2)),
    )
    .unwrap();

    // 检查点被占用时不提升
    assert_eq!(EntryLogRepository::promote_next_tx(&guard, LaneAction::Entry).unwrap(), None);

    let cleared = EntryLogRepository::clear_open_for_plate_tx(&guard, "aaa-111").unwrap();
    assert!(cleared.is_some());
    // 重复清除拿不到记录
    assert!(EntryLogRepository::clear_open_for_plate_tx(&guard, "AAA-111").unwrap().is_none());

    assert_eq!(
        EntryLogRepository::promote_next_tx(&guard, LaneAction::Entry).unwrap(),
        Some(second)
    );
    // 已有 active，不再提升第二辆
    assert_eq!(EntryLogRepository::promote_next_tx(&guard, LaneAction::Entry).unwrap(), None);
}

#[test]
fn test_queue_position_follows_logged_at_then_id() {
    let conn = setup_test_db();
    let guard = conn.lock().unwrap();
    let t0 = base_time();

    EntryLogRepository::insert_tx(&guard, &make_log("v-1", "AAA-111", LaneState::Active, t0)).unwrap();
    EntryLogRepository::insert_tx(&guard, &make_log("v-2", "BBB-222", LaneState::Queued, t0)).unwrap();
    EntryLogRepository::insert_tx(&guard, &make_log("v-3", "CCC-333", LaneState::Queued, t0)).unwrap();

    let queued = EntryLogRepository::list_open_tx(&guard, LaneAction::Entry, LaneState::Queued).unwrap();
    assert_eq!(queued.len(), 2);
    assert_eq!(queued[0].plate_number, "BBB-222");
    assert_eq!(EntryLogRepository::queue_position_tx(&guard, &queued[0]).unwrap(), 1);
    assert_eq!(EntryLogRepository::queue_position_tx(&guard, &queued[1]).unwrap(), 2);
}

#[test]
fn test_reopen_requires_cleared_row() {
    let conn = setup_test_db();
    let guard = conn.lock().unwrap();
    let t0 = base_time();

    let id = EntryLogRepository::insert_tx(&guard, &make_log("v-1", "AAA-111", LaneState::Active, t0))
        .unwrap();
    assert!(!EntryLogRepository::reopen_for_exit_tx(&guard, id, LaneState::Active, t0).unwrap());

    EntryLogRepository::clear_open_for_plate_tx(&guard, "AAA-111").unwrap();
    let later = t0 + Duration::minutes(30);
    assert!(EntryLogRepository::reopen_for_exit_tx(&guard, id, LaneState::Active, later).unwrap());

    let row = EntryLogRepository::find_by_id_tx(&guard, id).unwrap().unwrap();
    assert_eq!(row.action, LaneAction::Exit);
    assert!(!row.cleared);
    assert_eq!(row.logged_at, later);
    assert_eq!(row.time_in, Some(t0));
}

#[test]
fn test_stamp_exit_and_lookup_by_ticket() {
    let conn = setup_test_db();
    let guard = conn.lock().unwrap();
    let t0 = base_time();

    let id = EntryLogRepository::insert_tx(&guard, &make_log("v-1", "AAA-111", LaneState::Active, t0))
        .unwrap();
    EntryLogRepository::stamp_exit_tx(
        &guard,
        id,
        t0 + Duration::hours(1),
        "00000042",
        "vehicle:AAA-111|ticket:00000042|fd:FD1",
        Touchdown::Dispatch,
    )
    .unwrap();

    let row = EntryLogRepository::find_by_plate_and_ticket_tx(&guard, "aaa-111", "00000042")
        .unwrap()
        .unwrap();
    assert_eq!(row.entry_log_id, id);
    assert_eq!(row.touchdown, Touchdown::Dispatch);
    assert_eq!(EntryLogRepository::max_ticket_number_tx(&guard).unwrap(), 42);
    assert!(EntryLogRepository::find_by_plate_and_ticket_tx(&guard, "AAA-111", "00000043")
        .unwrap()
        .is_none());
}

#[test]
fn test_update_active_pass_clears_queue_number_for_taxi() {
    let conn = setup_test_db();
    let t0 = base_time();
    {
        let guard = conn.lock().unwrap();
        let mut log = make_log("v-1", "AAA-111", LaneState::Active, t0);
        log.queue_number = Some(5);
        EntryLogRepository::insert_tx(&guard, &log).unwrap();
    }

    let repo = EntryLogRepository::new(conn);
    let taxi = repo.update_active_pass("AAA-111", PassType::Taxi, None).unwrap().unwrap();
    assert_eq!(taxi.pass, Some(PassType::Taxi));
    assert_eq!(taxi.queue_number, None);

    let pila = repo.update_active_pass("AAA-111", PassType::Pila, Some(9)).unwrap().unwrap();
    assert_eq!(pila.queue_number, Some(9));

    let fd = repo.update_active_fd("AAA-111", "FD3").unwrap().unwrap();
    assert_eq!(fd.fd.as_deref(), Some("FD3"));

    assert!(repo.update_active_fd("ZZZ-000", "FD3").unwrap().is_none());
}

#[test]
fn test_dashboard_counts_excludes_ongoing() {
    let conn = setup_test_db();
    let t0 = base_time();
    {
        let guard = conn.lock().unwrap();
        for (vid, plate, pass, td) in [
            ("v-1", "AAA-111", PassType::Pila, Touchdown::ExitedSuccessfully),
            ("v-2", "BBB-222", PassType::Taxi, Touchdown::Ongoing),
            ("v-3", "CCC-333", PassType::SP, Touchdown::Dispatch),
        ] {
            let mut log = make_log(vid, plate, LaneState::Active, t0);
            log.pass = Some(pass);
            let id = EntryLogRepository::insert_tx(&guard, &log).unwrap();
            EntryLogRepository::clear_open_for_plate_tx(&guard, plate).unwrap();
            EntryLogRepository::stamp_exit_tx(&guard, id, t0 + Duration::hours(1), "00000001", "qr", td)
                .unwrap();
        }
    }

    let repo = EntryLogRepository::new(conn);
    let counts = repo.dashboard_counts(t0).unwrap();
    assert_eq!(counts.total_trips, 2);
    assert_eq!(counts.pila_count, 1);
    assert_eq!(counts.taxi_count, 0);
    assert_eq!(counts.special_pass_count, 1);

    let tomorrow = repo.dashboard_counts(t0 + Duration::days(1)).unwrap();
    assert_eq!(tomorrow.total_trips, 0);
}
