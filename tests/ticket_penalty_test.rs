// ==========================================
// 出场票据、扫码验证与处罚生命周期集成测试
// ==========================================
// 覆盖: 票号连续、同一访问票据一致、扫码单次有效、过期/错站处罚、
//       人工处罚与解除、每日清扫
// ==========================================


#[cfg(test)]
mod ticket_penalty_test {
    use chrono::{DateTime, Duration, NaiveDate, Utc};
    use terminal_lane::domain::types::{PenaltyStatus, Touchdown, VehicleStatus};
    use terminal_lane::domain::vehicle::NewVehicle;
    use terminal_lane::config::default_route_fd_map;
    use terminal_lane::engine::{ClearResult, LaneError, LaneEvent, PresentOutcome, ScanVerdict};

    use crate::test_helpers::{local, setup_env, TestEnv, ROUTE_FD1, ROUTE_FD2, ROUTE_FD4};

    // ==========================================
    // 测试辅助函数
    // ==========================================

    /// 完整走一遍进场放行 + 出场放行，返回出场放行结果
    fn full_visit(env: &TestEnv, plate: &str, start: DateTime<Utc>) -> ClearResult {
        env.lane.present_vehicle_at(plate, start).unwrap();
        env.lane
            .clear_checkpoint_at(plate, false, start + Duration::minutes(5))
            .unwrap();
        env.lane
            .present_vehicle_at(plate, start + Duration::minutes(30))
            .unwrap();
        env.lane
            .clear_checkpoint_at(plate, true, start + Duration::minutes(35))
            .unwrap()
    }

    fn penalty_status(env: &TestEnv, plate: &str) -> PenaltyStatus {
        env.vehicles
            .find_by_plate(plate)
            .unwrap()
            .unwrap()
            .penalty_status
    }

    // ==========================================
    // 发票
    // ==========================================

    #[test]
    fn test_exit_ticket_continues_after_imported_maximum() {
        let env = setup_env();
        env.register("OLD-1", ROUTE_FD1);
        env.register("ABC-123", ROUTE_FD1);
        env.insert_history_exit("OLD-1", "00000006", Some(3), local(2025, 6, 1, 9, 0, 0));

        let exit = full_visit(&env, "ABC-123", local(2025, 6, 2, 8, 0, 0));

        let ticket = exit.ticket.unwrap();
        assert_eq!(ticket.ticket_id, "00000007");
        assert_eq!(ticket.qr_payload, "vehicle:ABC-123|ticket:00000007|fd:FD1");
        assert_eq!(exit.touchdown, Touchdown::Dispatch);

        let log = env.entry_logs.find_by_id(exit.entry_log_id).unwrap().unwrap();
        assert_eq!(log.ticket_id.as_deref(), Some("00000007"));
        assert_eq!(log.time_out, Some(local(2025, 6, 2, 8, 35, 0)));
        assert!(log.cleared);
    }

    #[test]
    fn test_ticket_numbers_are_global_across_days() {
        let env = setup_env();
        env.register("TAXI-1", ROUTE_FD4);
        env.register("TAXI-2", ROUTE_FD4);

        let first = full_visit(&env, "TAXI-1", local(2025, 6, 2, 8, 0, 0));
        let second = full_visit(&env, "TAXI-2", local(2025, 6, 3, 8, 0, 0));

        assert_eq!(first.ticket.unwrap().ticket_id, "00000001");
        assert_eq!(second.ticket.unwrap().ticket_id, "00000002");
        assert_eq!(second.touchdown, Touchdown::Ongoing);
    }

    #[test]
    fn test_exit_ticket_backfills_paired_entry_record() {
        let env = setup_env();
        let vehicle = env.register("PAIR-1", ROUTE_FD2);
        let start = local(2025, 6, 2, 8, 0, 0);

        env.lane.present_vehicle_at("PAIR-1", start).unwrap();
        env.lane
            .clear_checkpoint_at("PAIR-1", false, start + Duration::minutes(5))
            .unwrap();
        let visit_id = env.entry_logs.find_by_id(1).unwrap().unwrap().visit_id;

        // 同一访问下的独立进场记录（历史数据按两条记录存储）
        let paired_id = {
            let conn = env.conn.lock().unwrap();
            conn.execute(
                r#"
                INSERT INTO entry_log (
                    visit_id, vehicle_id, plate_number, action, lane_state, logged_at, cleared,
                    time_in, route, fd, pass, touchdown
                ) VALUES (?1, ?2, 'PAIR-1', 'entry', 'active', ?3, 1, ?3, ?4, 'FD2', 'Taxi', 'waiting')
                "#,
                rusqlite::params![
                    visit_id,
                    vehicle.vehicle_id,
                    terminal_lane::db::format_ts(&(start - Duration::minutes(1))),
                    vehicle.route,
                ],
            )
            .unwrap();
            conn.last_insert_rowid()
        };

        env.lane
            .present_vehicle_at("PAIR-1", start + Duration::minutes(30))
            .unwrap();
        let exit = env
            .lane
            .clear_checkpoint_at("PAIR-1", true, start + Duration::minutes(35))
            .unwrap();

        let cleared = env.entry_logs.find_by_id(exit.entry_log_id).unwrap().unwrap();
        let paired = env.entry_logs.find_by_id(paired_id).unwrap().unwrap();
        assert!(cleared.ticket_id.is_some());
        assert_eq!(cleared.ticket_id, paired.ticket_id);
        assert_eq!(cleared.qr_payload, paired.qr_payload);
        assert_eq!(cleared.time_out, paired.time_out);
        assert_eq!(paired.touchdown, Touchdown::Ongoing);
    }

    // ==========================================
    // 扫码验证
    // ==========================================

    #[test]
    fn test_qr_success_then_already_scanned() {
        let env = setup_env();
        env.register("ABC-123", ROUTE_FD1);
        let exit = full_visit(&env, "ABC-123", local(2025, 6, 2, 8, 0, 0));
        let qr = exit.ticket.unwrap().qr_payload;
        let scan_at = local(2025, 6, 2, 11, 0, 0);

        let first = env.tickets.validate_qr_at(&qr, "fd1", scan_at).unwrap();
        assert_eq!(first.verdict, ScanVerdict::Success);
        assert_eq!(first.touchdown, Touchdown::ExitedSuccessfully);
        assert_eq!(penalty_status(&env, "ABC-123"), PenaltyStatus::None);

        let before = env.entry_logs.recent(10).unwrap();
        let mut rx = env.events.subscribe();

        let second = env
            .tickets
            .validate_qr_at(&qr, "FD2", scan_at + Duration::minutes(1))
            .unwrap();
        assert_eq!(second.verdict, ScanVerdict::AlreadyScanned);
        assert_eq!(env.entry_logs.recent(10).unwrap(), before);
        assert_eq!(penalty_status(&env, "ABC-123"), PenaltyStatus::None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_qr_expired_after_validity_window() {
        let env = setup_env();
        env.register("LATE-1", ROUTE_FD1);
        env.register("ONTIME-1", ROUTE_FD1);
        let start = local(2025, 6, 2, 8, 0, 0);
        let time_out = start + Duration::minutes(35);

        let late = full_visit(&env, "LATE-1", start).ticket.unwrap();
        let on_time = full_visit(&env, "ONTIME-1", start).ticket.unwrap();

        let expired = env
            .tickets
            .validate_qr_at(&late.qr_payload, "FD1", time_out + Duration::hours(25))
            .unwrap();
        assert_eq!(expired.verdict, ScanVerdict::Expired);
        assert_eq!(expired.touchdown, Touchdown::ExitedExpiredTicket);
        assert_eq!(penalty_status(&env, "LATE-1"), PenaltyStatus::Penalty);

        let ok = env
            .tickets
            .validate_qr_at(&on_time.qr_payload, "FD1", time_out + Duration::hours(23))
            .unwrap();
        assert_eq!(ok.verdict, ScanVerdict::Success);
        assert_eq!(penalty_status(&env, "ONTIME-1"), PenaltyStatus::None);
    }

    #[test]
    fn test_qr_wrong_endpoint_penalizes_and_blocks_entry() {
        let env = setup_env();
        env.register("ABC-123", ROUTE_FD1);
        let exit = full_visit(&env, "ABC-123", local(2025, 6, 2, 8, 0, 0));
        let qr = exit.ticket.unwrap().qr_payload;

        let outcome = env
            .tickets
            .validate_qr_at(&qr, "FD2", local(2025, 6, 2, 10, 0, 0))
            .unwrap();
        assert_eq!(outcome.verdict, ScanVerdict::WrongEndpoint);
        assert_eq!(outcome.expected_fd, "FD2");
        assert_eq!(outcome.actual_fd.as_deref(), Some("FD1"));
        assert_eq!(penalty_status(&env, "ABC-123"), PenaltyStatus::Penalty);

        let logs = env
            .entry_logs
            .find_by_plate_and_touchdown("ABC-123", Touchdown::ExitedWrongEndpoint)
            .unwrap();
        assert_eq!(logs.len(), 1);

        match env
            .lane
            .present_vehicle_at("ABC-123", local(2025, 6, 2, 12, 0, 0))
            .unwrap()
        {
            PresentOutcome::PenaltyBlocked { penalty_status, .. } => {
                assert_eq!(penalty_status, PenaltyStatus::Penalty)
            }
            other => panic!("expected penalty blocked, got {:?}", other),
        }
    }

    #[test]
    fn test_qr_without_exit_time_is_no_exit_record() {
        let env = setup_env();
        env.register("GHOST-1", ROUTE_FD2);
        let id = env.insert_history_exit("GHOST-1", "00000042", None, local(2025, 6, 2, 8, 0, 0));
        {
            let conn = env.conn.lock().unwrap();
            conn.execute(
                "UPDATE entry_log SET time_out = NULL, touchdown = 'ongoing' WHERE entry_log_id = ?1",
                [id],
            )
            .unwrap();
        }

        let outcome = env
            .tickets
            .validate_qr_at("vehicle:GHOST-1|ticket:00000042|fd:FD2", "FD2", local(2025, 6, 2, 9, 0, 0))
            .unwrap();
        assert_eq!(outcome.verdict, ScanVerdict::NoExitRecord);
        assert_eq!(outcome.touchdown, Touchdown::ExitedNoExitRecord);
        assert_eq!(penalty_status(&env, "GHOST-1"), PenaltyStatus::Penalty);
    }

    #[test]
    fn test_qr_malformed_and_unknown_ticket() {
        let env = setup_env();
        env.register("ABC-123", ROUTE_FD1);

        let err = env.tickets.validate_qr("not-a-ticket", "FD1").unwrap_err();
        assert!(matches!(err, LaneError::MalformedQr(_)));

        let err = env
            .tickets
            .validate_qr("vehicle:ABC-123|ticket:00000099|fd:FD1", "FD1")
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(penalty_status(&env, "ABC-123"), PenaltyStatus::None);
    }

    // ==========================================
    // 人工处罚与解除
    // ==========================================

    #[test]
    fn test_lift_keeps_in_transit_touchdown_and_sweep_resets_after_window() {
        let env = setup_env();
        env.register("TAXI-9", ROUTE_FD4);
        let history_id =
            env.insert_history_exit("TAXI-9", "00000003", None, local(2025, 6, 1, 9, 0, 0));

        let exit = full_visit(&env, "TAXI-9", local(2025, 6, 2, 8, 0, 0));
        assert_eq!(exit.touchdown, Touchdown::Ongoing);

        let applied = env
            .penalties
            .apply_penalty_at(
                "TAXI-9",
                Touchdown::ExitedWrongEndpoint,
                Some(history_id),
                local(2025, 6, 2, 9, 0, 0),
            )
            .unwrap();
        assert_eq!(applied.entry_log_id, Some(history_id));
        assert_eq!(penalty_status(&env, "TAXI-9"), PenaltyStatus::Penalty);
        let history = env.entry_logs.find_by_id(history_id).unwrap().unwrap();
        assert_eq!(history.touchdown, Touchdown::ExitedWrongEndpoint);

        let mut rx = env.events.subscribe();
        let lift_at = local(2025, 6, 2, 10, 0, 0);
        let lifted = env.penalties.lift_penalty_at("TAXI-9", None, lift_at).unwrap();
        assert!(lifted.lifted);
        assert_eq!(lifted.entry_log_id, Some(exit.entry_log_id));
        assert_eq!(lifted.touchdown, Some(Touchdown::Ongoing));
        assert!(!lifted.touchdown_rewritten);

        let vehicle = env.vehicles.find_by_plate("TAXI-9").unwrap().unwrap();
        assert_eq!(vehicle.penalty_status, PenaltyStatus::Lifted);
        assert_eq!(vehicle.penalty_lifted_at, Some(lift_at));
        assert_eq!(
            rx.try_recv().unwrap(),
            LaneEvent::PenaltyLifted {
                plate_number: "TAXI-9".to_string(),
                vehicle_id: vehicle.vehicle_id.clone(),
            }
        );

        let early = env
            .sweeper
            .run_manual_at(lift_at + Duration::hours(23))
            .unwrap()
            .unwrap();
        assert_eq!(early.penalties_reset, 0);
        assert_eq!(penalty_status(&env, "TAXI-9"), PenaltyStatus::Lifted);

        let due = env
            .sweeper
            .run_manual_at(lift_at + Duration::hours(24))
            .unwrap()
            .unwrap();
        assert_eq!(due.penalties_reset, 1);
        assert_eq!(penalty_status(&env, "TAXI-9"), PenaltyStatus::None);
    }

    #[test]
    fn test_lift_rewrites_penalty_touchdown() {
        let env = setup_env();
        env.register("ABC-123", ROUTE_FD1);
        let exit = full_visit(&env, "ABC-123", local(2025, 6, 2, 8, 0, 0));
        env.tickets
            .validate_qr_at(&exit.ticket.unwrap().qr_payload, "FD4", local(2025, 6, 2, 9, 0, 0))
            .unwrap();

        let lifted = env.penalties.lift_penalty("ABC-123", None).unwrap();
        assert!(lifted.touchdown_rewritten);
        assert_eq!(lifted.touchdown, Some(Touchdown::PenaltyLifted));

        // 解除后车辆可再次进场
        let outcome = env
            .lane
            .present_vehicle_at("ABC-123", local(2025, 6, 3, 8, 0, 0))
            .unwrap();
        assert!(outcome.is_accepted());
    }

    #[test]
    fn test_lift_on_vehicle_without_penalty_is_noop() {
        let env = setup_env();
        env.register("CLEAN-1", ROUTE_FD2);

        let result = env.penalties.lift_penalty("CLEAN-1", None).unwrap();
        assert!(!result.lifted);
        assert_eq!(result.penalty_status, PenaltyStatus::None);
        assert_eq!(penalty_status(&env, "CLEAN-1"), PenaltyStatus::None);

        let err = env.penalties.lift_penalty("NOPE-1", None).unwrap_err();
        assert!(matches!(err, LaneError::VehicleNotFound(_)));
    }

    #[test]
    fn test_apply_penalty_rejects_foreign_entry_log() {
        let env = setup_env();
        env.register("A-1", ROUTE_FD2);
        env.register("B-2", ROUTE_FD2);
        let foreign = env.insert_history_exit("B-2", "00000001", None, local(2025, 6, 1, 9, 0, 0));

        let err = env
            .penalties
            .apply_penalty("A-1", Touchdown::ExitedExpiredTicket, Some(foreign))
            .unwrap_err();
        assert!(matches!(err, LaneError::EntryLogNotFound(_)));
        assert_eq!(penalty_status(&env, "A-1"), PenaltyStatus::None);
    }

    #[test]
    fn test_penalty_listing_uses_latest_exit_reason() {
        let env = setup_env();
        env.register("ABC-123", ROUTE_FD1);
        env.register("DEF-456", ROUTE_FD2);
        let exit = full_visit(&env, "ABC-123", local(2025, 6, 2, 8, 0, 0));
        env.tickets
            .validate_qr_at(
                &exit.ticket.unwrap().qr_payload,
                "FD1",
                local(2025, 6, 4, 8, 0, 0),
            )
            .unwrap();

        let rows = env.penalties.penalty_vehicles().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].plate_number, "ABC-123");
        assert_eq!(rows[0].reason, Touchdown::ExitedExpiredTicket.to_string());
        assert_eq!(env.penalties.penalty_count().unwrap(), 1);
    }

    // ==========================================
    // 每日清扫
    // ==========================================

    #[test]
    fn test_sweep_expires_registrations_once_per_day() {
        let env = setup_env();
        let registered_at = local(2025, 1, 1, 8, 0, 0);
        for (plate, expiry) in [
            ("DUE-1", NaiveDate::from_ymd_opt(2025, 6, 3).unwrap()),
            ("PAST-1", NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()),
            ("LATER-1", NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()),
        ] {
            env.vehicles
                .register(
                    &NewVehicle::new(plate, "driver", ROUTE_FD2).with_expiry_date(expiry),
                    &default_route_fd_map(),
                    registered_at,
                )
                .unwrap();
        }

        let now = local(2025, 6, 3, 0, 30, 0);
        let report = env.sweeper.run_if_due_at(now).unwrap().unwrap();
        assert_eq!(report.expired_today, 1);
        assert_eq!(report.expired_catch_up, 1);
        assert!(!report.manual);
        assert_eq!(report.run_date, NaiveDate::from_ymd_opt(2025, 6, 3).unwrap());

        let status_of = |plate: &str| env.vehicles.find_by_plate(plate).unwrap().unwrap().status;
        assert_eq!(status_of("DUE-1"), VehicleStatus::Expired);
        assert_eq!(status_of("PAST-1"), VehicleStatus::Expired);
        assert_eq!(status_of("LATER-1"), VehicleStatus::Ok);

        // 同日再次定时触发跳过，人工触发照常执行
        assert!(env.sweeper.run_if_due_at(now + Duration::hours(1)).unwrap().is_none());
        let manual = env
            .sweeper
            .run_manual_at(now + Duration::hours(2))
            .unwrap()
            .unwrap();
        assert!(manual.manual);
        assert_eq!(manual.total_updates(), 0);

        let status = env.sweeper.status_at(now + Duration::hours(2)).unwrap();
        assert!(status.ran_today);
        assert!(!status.is_running);

        // 次日恢复定时执行
        assert!(env
            .sweeper
            .run_if_due_at(local(2025, 6, 4, 0, 30, 0))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_expired_registration_can_still_enter() {
        let env = setup_env();
        env.vehicles
            .register(
                &NewVehicle::new("OLD-REG", "driver", ROUTE_FD2)
                    .with_expiry_date(NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()),
                &default_route_fd_map(),
                local(2025, 1, 1, 8, 0, 0),
            )
            .unwrap();
        env.sweeper.run_manual_at(local(2025, 6, 3, 1, 0, 0)).unwrap();

        let outcome = env
            .lane
            .present_vehicle_at("OLD-REG", local(2025, 6, 3, 8, 0, 0))
            .unwrap();
        match outcome {
            PresentOutcome::Accepted { vehicle, .. } => {
                assert_eq!(vehicle.status, VehicleStatus::Expired)
            }
            other => panic!("expected accepted, got {:?}", other),
        }
    }
}
