//! Hourly worksheet slots and productivity scoring.
//!
//! The work day is cut into one-hour slots starting at `workday_start`; the
//! last slot is clipped to `workday_end`. Breaks reduce the minutes a slot
//! can contribute, and each entry is weighted by its status.

use chrono::{Duration, NaiveTime};
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::WorkPolicy;
use crate::model::worksheet::EntryStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Slot {
    pub index: u8,
    #[schema(value_type = String)]
    pub start: NaiveTime,
    #[schema(value_type = String)]
    pub end: NaiveTime,
}

impl Slot {
    pub fn label(&self) -> String {
        format!("{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }

    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

pub fn hourly_slots(policy: &WorkPolicy) -> Vec<Slot> {
    let mut slots = Vec::new();
    let mut start = policy.workday_start;
    let mut index: u8 = 0;

    while start < policy.workday_end {
        let next = start + Duration::hours(1);
        // wrap past midnight means we already reached the end of the day
        let end = if next <= start || next > policy.workday_end {
            policy.workday_end
        } else {
            next
        };
        slots.push(Slot { index, start, end });
        start = end;
        index = match index.checked_add(1) {
            Some(i) => i,
            None => break,
        };
    }
    slots
}

fn overlap_minutes(a: (NaiveTime, NaiveTime), b: (NaiveTime, NaiveTime)) -> i64 {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    if end > start { (end - start).num_minutes() } else { 0 }
}

pub fn entry_weight(status: EntryStatus) -> f64 {
    match status {
        EntryStatus::Completed => 1.0,
        EntryStatus::InProgress => 0.5,
        EntryStatus::Blocked => 0.0,
    }
}

pub fn break_minutes(breaks: &[(NaiveTime, NaiveTime)]) -> i64 {
    breaks
        .iter()
        .map(|(s, e)| if e > s { (*e - *s).num_minutes() } else { 0 })
        .sum()
}

/// Productivity score in percent, rounded to one decimal.
///
/// `entries` pairs a slot index with the status recorded for it.
pub fn productivity_score(
    slots: &[Slot],
    entries: &[(u8, EntryStatus)],
    breaks: &[(NaiveTime, NaiveTime)],
) -> f64 {
    let mut available_total = 0i64;
    let mut weighted = 0.0f64;

    for slot in slots {
        let lost: i64 = breaks
            .iter()
            .map(|b| overlap_minutes((slot.start, slot.end), *b))
            .sum();
        let available = (slot.minutes() - lost).max(0);
        available_total += available;

        if let Some((_, status)) = entries.iter().find(|(idx, _)| *idx == slot.index) {
            weighted += entry_weight(*status) * available as f64;
        }
    }

    if available_total == 0 {
        return 0.0;
    }
    let score = 100.0 * weighted / available_total as f64;
    (score * 10.0).round() / 10.0
}

pub fn rating(score: f64) -> &'static str {
    if score >= 80.0 {
        "excellent"
    } else if score >= 60.0 {
        "good"
    } else if score >= 40.0 {
        "average"
    } else {
        "poor"
    }
}

/// Whether `[start, end)` lies inside the work day.
pub fn within_workday(policy: &WorkPolicy, start: NaiveTime, end: NaiveTime) -> bool {
    start >= policy.workday_start && end <= policy.workday_end && end > start
}

pub fn breaks_overlap(a: (NaiveTime, NaiveTime), b: (NaiveTime, NaiveTime)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn policy(start: NaiveTime, end: NaiveTime) -> WorkPolicy {
        WorkPolicy {
            workday_start: start,
            workday_end: end,
            ..WorkPolicy::default()
        }
    }

    #[test]
    fn nine_to_six_has_nine_slots() {
        let slots = hourly_slots(&WorkPolicy::default());
        assert_eq!(slots.len(), 9);
        assert_eq!(slots[0].label(), "09:00-10:00");
        assert_eq!(slots[8].label(), "17:00-18:00");
        assert!(slots.iter().enumerate().all(|(i, s)| s.index as usize == i));
    }

    #[test]
    fn last_slot_is_clipped() {
        let slots = hourly_slots(&policy(t(9, 0), t(12, 30)));
        assert_eq!(slots.len(), 4);
        assert_eq!(slots[3].label(), "12:00-12:30");
        assert_eq!(slots[3].minutes(), 30);
    }

    #[test]
    fn late_day_does_not_wrap_past_midnight() {
        let slots = hourly_slots(&policy(t(22, 0), t(23, 30)));
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].end, t(23, 30));
    }

    #[test]
    fn all_completed_scores_hundred() {
        let slots = hourly_slots(&WorkPolicy::default());
        let entries: Vec<_> = slots.iter().map(|s| (s.index, EntryStatus::Completed)).collect();
        assert_eq!(productivity_score(&slots, &entries, &[]), 100.0);
    }

    #[test]
    fn empty_sheet_scores_zero() {
        let slots = hourly_slots(&WorkPolicy::default());
        assert_eq!(productivity_score(&slots, &[], &[]), 0.0);
    }

    #[test]
    fn breaks_are_excluded_from_available_time() {
        let slots = hourly_slots(&policy(t(9, 0), t(11, 0)));
        // 09-10 completed, 10-11 nothing; break covers all of 10-11
        let entries = [(0, EntryStatus::Completed)];
        let breaks = [(t(10, 0), t(11, 0))];
        assert_eq!(productivity_score(&slots, &entries, &breaks), 100.0);
    }

    #[test]
    fn in_progress_counts_half() {
        let slots = hourly_slots(&policy(t(9, 0), t(11, 0)));
        let entries = [(0, EntryStatus::Completed), (1, EntryStatus::InProgress)];
        assert_eq!(productivity_score(&slots, &entries, &[]), 75.0);
    }

    #[test]
    fn score_rounds_to_one_decimal() {
        let slots = hourly_slots(&policy(t(9, 0), t(12, 0)));
        let entries = [(0, EntryStatus::Completed)];
        assert_eq!(productivity_score(&slots, &entries, &[]), 33.3);
    }

    #[test]
    fn whole_day_break_scores_zero() {
        let slots = hourly_slots(&policy(t(9, 0), t(10, 0)));
        let entries = [(0, EntryStatus::Completed)];
        let breaks = [(t(9, 0), t(10, 0))];
        assert_eq!(productivity_score(&slots, &entries, &breaks), 0.0);
    }

    #[test]
    fn ratings() {
        assert_eq!(rating(95.0), "excellent");
        assert_eq!(rating(80.0), "excellent");
        assert_eq!(rating(60.0), "good");
        assert_eq!(rating(45.5), "average");
        assert_eq!(rating(10.0), "poor");
    }

    #[test]
    fn break_overlap_is_half_open() {
        assert!(breaks_overlap((t(12, 0), t(12, 30)), (t(12, 15), t(13, 0))));
        assert!(!breaks_overlap((t(12, 0), t(12, 30)), (t(12, 30), t(13, 0))));
    }

    #[test]
    fn break_minutes_sum() {
        assert_eq!(break_minutes(&[(t(12, 0), t(12, 30)), (t(15, 0), t(15, 10))]), 40);
    }
}
