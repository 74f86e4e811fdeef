//! Attendance status rules.
//!
//! A check-in after `workday_start + late_grace_minutes` is `late`; a day
//! whose worked time ends up shorter than `half_day_minutes` is `half_day`,
//! regardless of whether the check-in was late.

use chrono::{Duration, NaiveTime};

use crate::config::WorkPolicy;
use crate::model::attendance::AttendanceStatus;

/// Status assigned at check-in time.
pub fn status_on_check_in(policy: &WorkPolicy, check_in: NaiveTime) -> AttendanceStatus {
    let cutoff = policy.workday_start + Duration::minutes(i64::from(policy.late_grace_minutes));
    if check_in > cutoff {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    }
}

/// Minutes between check-in and check-out, clamped at zero.
pub fn worked_minutes(check_in: NaiveTime, check_out: NaiveTime) -> u32 {
    let minutes = (check_out - check_in).num_minutes();
    u32::try_from(minutes.max(0)).unwrap_or(0)
}

/// Final status once the day is closed.
pub fn status_on_check_out(
    policy: &WorkPolicy,
    current: AttendanceStatus,
    worked_minutes: u32,
) -> AttendanceStatus {
    if worked_minutes < policy.half_day_minutes {
        AttendanceStatus::HalfDay
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn check_in_within_grace_is_present() {
        let policy = WorkPolicy::default();
        assert_eq!(status_on_check_in(&policy, t(8, 30)), AttendanceStatus::Present);
        assert_eq!(status_on_check_in(&policy, t(9, 15)), AttendanceStatus::Present);
    }

    #[test]
    fn check_in_after_grace_is_late() {
        let policy = WorkPolicy::default();
        assert_eq!(status_on_check_in(&policy, t(9, 16)), AttendanceStatus::Late);
        assert_eq!(status_on_check_in(&policy, t(13, 0)), AttendanceStatus::Late);
    }

    #[test]
    fn worked_minutes_never_negative() {
        assert_eq!(worked_minutes(t(9, 0), t(17, 30)), 510);
        assert_eq!(worked_minutes(t(9, 0), t(8, 0)), 0);
    }

    #[test]
    fn short_day_becomes_half_day() {
        let policy = WorkPolicy::default();
        assert_eq!(
            status_on_check_out(&policy, AttendanceStatus::Late, 239),
            AttendanceStatus::HalfDay
        );
        assert_eq!(
            status_on_check_out(&policy, AttendanceStatus::Late, 240),
            AttendanceStatus::Late
        );
        assert_eq!(
            status_on_check_out(&policy, AttendanceStatus::Present, 480),
            AttendanceStatus::Present
        );
    }
}
