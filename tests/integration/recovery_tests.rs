//! Boot-time recovery driven through `PumpController::startup`, with the
//! controller torn down and rebuilt around the surviving clock.

use crate::mock_hw::{RecordingSink, controller_at, controller_with, monday, reboot, schedules, ts};
use pumpclock::app::events::AppEvent;
use pumpclock::app::ports::{AlarmChannel, ClockError};
use pumpclock::app::service::WateringState;
use pumpclock::clock::SECS_PER_HOUR;
use pumpclock::config::ControllerConfig;
use pumpclock::error::Error;
use pumpclock::recovery::{Compensation, RecoveryOutcome};
use pumpclock::schedule::{EVERY_DAY, ScheduleEntry};

fn six_hour_threshold() -> ControllerConfig {
    ControllerConfig {
        outage_threshold_secs: 6 * SECS_PER_HOUR,
        ..ControllerConfig::default()
    }
}

#[test]
fn outage_mid_window_extends_run() {
    let mut c = controller_at(monday(5, 59, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();
    c.resolve_and_arm_next(&mut sink).unwrap();

    // Watering starts, power drops at 06:02 and returns at 06:10.
    c.clock_mut().advance_to(monday(6, 2, 0));
    c.clock_mut().record_power_cycle(monday(6, 2, 0), monday(6, 10, 0));
    c.clock_mut().set_now(monday(6, 10, 0));

    let mut c = reboot(c, ControllerConfig::default());
    sink.clear();
    let report = c.startup(&mut sink).unwrap();
    let makeup = Compensation {
        compensation_secs: 480,
        start: monday(6, 10, 2),
        stop: monday(6, 13, 2),
    };
    assert_eq!(report.recovery, RecoveryOutcome::Resumed(makeup));
    assert_eq!(report.next_due, None);
    assert_eq!(c.armed_times(), Ok((makeup.start, makeup.stop)));
    assert!(!c.clock().power_fail_latched());
    assert_eq!(
        sink.events,
        vec![AppEvent::RecoveryCompleted(RecoveryOutcome::Resumed(makeup))]
    );

    // The makeup window runs, then the schedule takes over again.
    c.clock_mut().advance_to(makeup.start);
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Running));
    c.clock_mut().advance_to(makeup.stop);
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Finished));
    assert_eq!(
        c.next_due().map(|a| a.start),
        Some(ts(2024, 6, 4, 6, 0, 0))
    );
}

fn outage_over_whole_window(config: ControllerConfig) -> crate::mock_hw::TestController {
    let mut c = controller_with(monday(4, 59, 0), config.clone());
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();
    c.resolve_and_arm_next(&mut sink).unwrap();

    // Down 05:00 to 09:00; both alarms fire on battery.
    c.clock_mut().record_power_cycle(monday(5, 0, 0), monday(9, 0, 0));
    c.clock_mut().advance_to(monday(9, 0, 0));
    assert!(c.currently_triggered(AlarmChannel::Start));
    assert!(c.currently_triggered(AlarmChannel::Stop));
    reboot(c, config)
}

#[test]
fn long_outage_is_abandoned_and_alarms_cleared() {
    let mut c = outage_over_whole_window(ControllerConfig::default());
    let mut sink = RecordingSink::new();

    let outcome = c.check_and_recover(&mut sink).unwrap();
    assert_eq!(
        outcome,
        RecoveryOutcome::Abandoned {
            outage_secs: 4 * SECS_PER_HOUR
        }
    );
    for channel in AlarmChannel::BOTH {
        let slot = c.clock().alarm(channel);
        assert!(!slot.enabled);
        assert!(!slot.triggered);
    }
}

#[test]
fn abandoned_startup_arms_next_scheduled_window() {
    let mut c = outage_over_whole_window(ControllerConfig::default());
    let mut sink = RecordingSink::new();

    let report = c.startup(&mut sink).unwrap();
    assert!(matches!(report.recovery, RecoveryOutcome::Abandoned { .. }));
    assert_eq!(
        report.next_due.map(|a| a.start),
        Some(ts(2024, 6, 4, 6, 0, 0))
    );
}

#[test]
fn outage_within_threshold_replays_full_window() {
    let mut c = outage_over_whole_window(six_hour_threshold());
    let mut sink = RecordingSink::new();

    let report = c.startup(&mut sink).unwrap();
    let makeup = Compensation {
        compensation_secs: 300,
        start: monday(9, 0, 2),
        stop: monday(9, 5, 2),
    };
    assert_eq!(report.recovery, RecoveryOutcome::Replayed(makeup));
    assert_eq!(c.armed_times(), Ok((makeup.start, makeup.stop)));
    // Flags from the missed window are gone.
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Idle));
}

#[test]
fn reset_while_running_leaves_window_alone() {
    let mut c = controller_at(monday(5, 59, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();
    c.resolve_and_arm_next(&mut sink).unwrap();
    c.clock_mut().advance_to(monday(6, 1, 0));

    let mut c = reboot(c, ControllerConfig::default());
    let report = c.startup(&mut sink).unwrap();
    assert_eq!(report.recovery, RecoveryOutcome::InProgress);
    assert_eq!(report.next_due, None);
    assert_eq!(c.armed_times(), Ok((monday(6, 0, 0), monday(6, 5, 0))));
    assert_eq!(c.poll(&mut sink), Ok(WateringState::Running));
}

#[test]
fn failed_recovery_keeps_power_fail_latch() {
    let mut c = outage_over_whole_window(six_hour_threshold());
    let mut sink = RecordingSink::new();
    c.clock_mut().fail_arming(AlarmChannel::Start, true);

    let err = c.startup(&mut sink).unwrap_err();
    assert_eq!(
        err,
        Error::AlarmProgramming {
            channel: AlarmChannel::Start,
            cause: ClockError::Bus
        }
    );
    assert!(c.clock().power_fail_latched());
    assert_eq!(sink.faults(), 1);

    // Once the bus behaves, the retry completes the makeup run.
    c.clock_mut().fail_arming(AlarmChannel::Start, false);
    c.clock_mut().force_triggered(AlarmChannel::Start, true);
    c.clock_mut().force_triggered(AlarmChannel::Stop, true);
    let report = c.startup(&mut sink).unwrap();
    assert!(matches!(report.recovery, RecoveryOutcome::Replayed(_)));
    assert!(!c.clock().power_fail_latched());
}

#[test]
fn repeat_outage_during_makeup_minute_recovers() {
    let mut c = controller_at(monday(5, 59, 0));
    let mut sink = RecordingSink::new();
    c.set_schedules(&schedules(&[ScheduleEntry::new(6, 0, 300, EVERY_DAY)]))
        .unwrap();
    c.resolve_and_arm_next(&mut sink).unwrap();
    c.clock_mut().advance_to(monday(6, 2, 0));
    c.clock_mut().record_power_cycle(monday(6, 2, 0), monday(6, 10, 0));
    c.clock_mut().set_now(monday(6, 10, 0));
    let mut c = reboot(c, ControllerConfig::default());
    c.startup(&mut sink).unwrap();

    // The makeup Start fires at 06:10:02, then power blinks again; the
    // stamps only have minute resolution.
    c.clock_mut().advance_to(monday(6, 10, 2));
    c.clock_mut().record_power_cycle(monday(6, 10, 0), monday(6, 10, 0));
    c.clock_mut().set_now(monday(6, 10, 30));
    let mut c = reboot(c, ControllerConfig::default());
    sink.clear();

    let report = c.startup(&mut sink).unwrap();
    let makeup = Compensation {
        compensation_secs: 0,
        start: monday(6, 10, 32),
        stop: monday(6, 13, 4),
    };
    assert_eq!(report.recovery, RecoveryOutcome::Resumed(makeup));
    assert_eq!(c.armed_times(), Ok((makeup.start, makeup.stop)));
    assert_eq!(sink.faults(), 0);
}
