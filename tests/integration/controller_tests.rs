//! End-to-end controller behaviour against the simulated clock.

use crate::mock_hw::{RecordingSink, controller_at, monday, schedules, ts};
use pumpclock::adapters::log_sink::LogEventSink;
use pumpclock::app::commands::{AppCommand, CommandReply};
use pumpclock::app::events::AppEvent;
use pumpclock::app::ports::{AlarmChannel, ClockError};
use pumpclock::app::service::WateringState;
use pumpclock::error::{Error, PersistenceError};
use pumpclock::recovery::RecoveryOutcome;
use pumpclock::schedule::{EVERY_DAY, ScheduleEntry, WEEKDAYS};

#[test]
fn full_day_lifecycle() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[
        ScheduleEntry::new(6, 0, 300, EVERY_DAY),
        ScheduleEntry::new(18, 30, 600, WEEKDAYS),
    ]))
    .unwrap();

    let report = c.startup(&mut sink).unwrap();
    assert_eq!(report.recovery, RecoveryOutcome::NothingMissed);
    let first = report.next_due.unwrap();
    assert_eq!((first.start, first.slot), (monday(6, 0, 0), 0));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Idle));

    // Start alarm fires.
    c.clock_mut().advance_to(monday(6, 0, 0));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Running));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Running));
    assert_eq!(sink.count(|e| *e == AppEvent::WateringStarted), 1);

    // Stop alarm fires; the evening window is armed next.
    c.clock_mut().advance_to(monday(6, 5, 0));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Finished));
    assert_eq!(sink.count(|e| *e == AppEvent::WateringFinished), 1);
    let next = c.next_due().unwrap();
    assert_eq!((next.start, next.slot), (monday(18, 30, 0), 1));
    assert_eq!(c.armed_times(), Ok((monday(18, 30, 0), monday(18, 40, 0))));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Idle));
    assert_eq!(sink.faults(), 0);
}

#[test]
fn programmed_pair_is_armed_and_untriggered() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();

    c.resolve_and_arm_next(&mut sink).unwrap();
    assert_eq!(c.armed_times(), Ok((monday(6, 0, 0), monday(6, 5, 0))));
    assert!(!c.currently_triggered(AlarmChannel::Start));
    assert!(!c.currently_triggered(AlarmChannel::Stop));
}

#[test]
fn after_todays_time_arms_tomorrow() {
    let mut c = controller_at(monday(7, 0, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();
    let armed = c.resolve_and_arm_next(&mut sink).unwrap().unwrap();
    assert_eq!(armed.start, ts(2024, 6, 4, 6, 0, 0));
}

#[test]
fn identical_times_pick_first_declared() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[
        ScheduleEntry::new(7, 30, 120, EVERY_DAY),
        ScheduleEntry::new(7, 30, 900, EVERY_DAY),
    ]))
    .unwrap();
    let armed = c.resolve_and_arm_next(&mut sink).unwrap().unwrap();
    assert_eq!(armed.slot, 0);
    assert_eq!(armed.duration_secs, 120);
}

#[test]
fn stop_arming_failure_leaves_nothing_armed() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();
    c.clock_mut().fail_arming(AlarmChannel::Stop, true);

    let err = c.resolve_and_arm_next(&mut sink).unwrap_err();
    assert_eq!(
        err,
        Error::AlarmProgramming {
            channel: AlarmChannel::Stop,
            cause: ClockError::Bus
        }
    );
    assert!(!c.clock().alarm(AlarmChannel::Start).enabled);
    assert!(!c.clock().alarm(AlarmChannel::Stop).enabled);
    assert!(!c.is_degraded());
    assert_eq!(sink.last(), Some(&AppEvent::Fault(err)));
}

#[test]
fn disabled_schedules_clear_alarms() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();
    c.resolve_and_arm_next(&mut sink).unwrap();

    let mut off = ScheduleEntry::new(6, 0, 300, EVERY_DAY);
    off.enabled = false;
    c.set_schedules(&schedules(&[off])).unwrap();
    assert_eq!(c.resolve_and_arm_next(&mut sink), Ok(None));
    assert_eq!(c.next_due(), None);
    assert!(!c.clock().alarm(AlarmChannel::Start).enabled);
    assert!(!c.clock().alarm(AlarmChannel::Stop).enabled);
    assert_eq!(sink.last(), Some(&AppEvent::NothingScheduled));
}

#[test]
fn transient_bus_faults_are_absorbed() {
    let mut c = controller_at(monday(5, 0, 0));
    let set = schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]);
    c.clock_mut().fail_next_bus_calls(2);
    c.set_schedules(&set).unwrap();
    assert_eq!(c.get_schedules(), Ok(set));

    let (_, delay) = c.into_parts();
    assert_eq!(delay.calls, 2);
    assert_eq!(delay.total_ms, 5 + 10);
}

#[test]
fn persistent_bus_fault_surfaces() {
    let mut c = controller_at(monday(5, 0, 0));
    c.clock_mut().fail_next_bus_calls(3);
    assert_eq!(
        c.set_schedules(&schedules(&[])),
        Err(Error::Persistence(PersistenceError::Clock(ClockError::Bus)))
    );
}

#[test]
fn manual_run_then_back_to_schedule() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();
    c.resolve_and_arm_next(&mut sink).unwrap();

    let reply = c.handle_command(AppCommand::ManualRun { duration_secs: 600 }, &mut sink);
    assert_eq!(
        reply,
        CommandReply::ManualRun {
            stop_at: monday(5, 10, 0)
        }
    );
    // The pending scheduled Start was cleared with the pair.
    assert!(!c.clock().alarm(AlarmChannel::Start).enabled);
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Running));

    c.clock_mut().advance_to(monday(5, 10, 0));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Finished));
    assert_eq!(c.next_due().map(|a| a.start), Some(monday(6, 0, 0)));
    // The stored schedules were never touched.
    assert_eq!(c.get_schedules().unwrap().len(), 1);
}

#[test]
fn oversized_manual_run_is_rejected() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();
    let reply = c.handle_command(AppCommand::ManualRun { duration_secs: 4000 }, &mut sink);
    assert!(matches!(reply, CommandReply::Failed(Error::InvalidRequest(_))));
    assert_eq!(sink.faults(), 1);
}

#[test]
fn json_commands_round_trip_through_controller() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();

    let set_cmd = AppCommand::from_json(
        r#"{"cmd":"set_schedules","entries":[
            {"hour":6,"minute":0,"duration_secs":300,"days_of_week":127,"enabled":true},
            {"hour":20,"minute":15,"duration_secs":60,"days_of_week":1,"enabled":false}
        ]}"#,
    )
    .unwrap();
    let CommandReply::Armed(Some(armed)) = c.handle_command(set_cmd, &mut sink) else {
        panic!("expected an armed window");
    };
    assert_eq!(armed.start, monday(6, 0, 0));

    let CommandReply::Schedules(stored) = c.handle_command(AppCommand::GetSchedules, &mut sink)
    else {
        panic!("expected schedules");
    };
    assert_eq!(stored.len(), 2);
    assert_eq!(stored.active_count(), 1);

    let reply = c.handle_command(AppCommand::from_json(r#"{"cmd":"recover"}"#).unwrap(), &mut sink);
    assert_eq!(reply, CommandReply::Recovered(RecoveryOutcome::NothingMissed));
}

#[test]
fn corrupted_store_fails_arm_next() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();
    // Slot 0 hour byte.
    c.clock_mut().ram_mut()[4] = 24;

    let reply = c.handle_command(AppCommand::ArmNext, &mut sink);
    assert!(matches!(
        reply,
        CommandReply::Failed(Error::Persistence(PersistenceError::Corrupted(_)))
    ));
    assert_eq!(sink.faults(), 1);
}

#[test]
fn time_sync_rearms_idle_controller() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();
    c.resolve_and_arm_next(&mut sink).unwrap();

    // 2024-06-03T01:30:00Z is 07:00 local at +05:30, past today's window.
    let reply = c.handle_command(
        AppCommand::SyncTime {
            utc_epoch_secs: 1_717_378_200,
        },
        &mut sink,
    );
    assert_eq!(reply, CommandReply::TimeSet(monday(7, 0, 0)));
    assert_eq!(
        c.next_due().map(|a| a.start),
        Some(ts(2024, 6, 4, 6, 0, 0))
    );
    assert!(sink.events.contains(&AppEvent::TimeSynced(monday(7, 0, 0))));
}

#[test]
fn timestamp_text_reads_clock() {
    let mut c = controller_at(ts(2025, 1, 9, 21, 4, 5));
    assert_eq!(
        c.current_timestamp_text().unwrap().as_str(),
        "2025-01-09 21:04:05"
    );
}

#[test]
fn log_sink_drives_controller() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = LogEventSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();
    let report = c.startup(&mut sink).unwrap();
    assert!(report.next_due.is_some());

    let reply = c.handle_command(AppCommand::ManualRun { duration_secs: 0 }, &mut sink);
    assert!(matches!(reply, CommandReply::Failed(Error::InvalidRequest(_))));
}

#[test]
fn time_sync_past_running_stop_rearms_stop() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();
    c.resolve_and_arm_next(&mut sink).unwrap();
    c.clock_mut().advance_to(monday(6, 1, 0));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Running));

    // 07:00 local, well past the 06:05 Stop.
    let reply = c.handle_command(
        AppCommand::SyncTime {
            utc_epoch_secs: 1_717_378_200,
        },
        &mut sink,
    );
    assert_eq!(reply, CommandReply::TimeSet(monday(7, 0, 0)));
    assert_eq!(c.armed_times(), Ok((monday(6, 0, 0), monday(7, 0, 2))));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Running));

    c.clock_mut().advance_to(monday(7, 0, 2));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Finished));
    assert_eq!(
        c.next_due().map(|a| a.start),
        Some(ts(2024, 6, 4, 6, 0, 0))
    );
    assert_eq!(sink.faults(), 0);
}

#[test]
fn poll_rearms_stop_left_behind_by_clock_jump() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();
    c.resolve_and_arm_next(&mut sink).unwrap();
    c.clock_mut().advance_to(monday(6, 1, 0));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Running));

    // Jump without firing anything.
    c.clock_mut().set_now(monday(7, 0, 0));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Running));
    assert_eq!(c.armed_times(), Ok((monday(6, 0, 0), monday(7, 0, 2))));

    c.clock_mut().advance_to(monday(7, 0, 2));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Finished));
}

#[test]
fn manual_run_stop_follows_clock_jump() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();
    c.arm_manual_run(600, &mut sink).unwrap();
    c.clock_mut().set_now(monday(9, 0, 0));

    assert_eq!(c.poll(&mut sink), Ok(WateringState::Running));
    assert_eq!(
        c.clock().alarm(AlarmChannel::Stop).time,
        Some(monday(9, 0, 2))
    );
}

#[test]
fn failed_startup_is_retried_by_poll() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();

    c.clock_mut().fail_next_bus_calls(3);
    assert_eq!(
        c.startup(&mut sink).unwrap_err(),
        Error::Clock(ClockError::Bus)
    );
    assert_eq!(c.next_due(), None);

    c.clock_mut().advance_to(monday(5, 0, 30));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Idle));
    assert_eq!(c.next_due().map(|a| a.start), Some(monday(6, 0, 0)));
    assert!(
        sink.events
            .contains(&AppEvent::RecoveryCompleted(RecoveryOutcome::NothingMissed))
    );

    c.clock_mut().advance_to(monday(6, 0, 0));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Running));
}

#[test]
fn failed_arming_is_retried_while_idle() {
    let mut c = controller_at(monday(5, 0, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();

    c.clock_mut().fail_arming(AlarmChannel::Start, true);
    assert!(c.resolve_and_arm_next(&mut sink).is_err());
    assert!(!c.clock().alarm(AlarmChannel::Start).enabled);

    // Still failing: the fault is reported again.
    assert!(c.poll(&mut sink).is_err());
    assert_eq!(sink.faults(), 2);

    c.clock_mut().fail_arming(AlarmChannel::Start, false);
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Idle));
    assert_eq!(c.armed_times(), Ok((monday(6, 0, 0), monday(6, 5, 0))));

    // Once armed, polling leaves the pair alone.
    sink.clear();
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Idle));
    assert!(sink.events.is_empty());
}
