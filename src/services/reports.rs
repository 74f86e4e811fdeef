//! Aggregations behind the analytics endpoints. Rows are fetched by the
//! handlers; everything here is plain computation over them.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use strum::IntoEnumIterator;
use utoipa::ToSchema;

use crate::model::attendance::AttendanceStatus;
use crate::model::task::TaskStatus;

/// Monday to Friday days in `[from, to]`.
pub fn working_days(from: NaiveDate, to: NaiveDate) -> u32 {
    if to < from {
        return 0;
    }
    from.iter_days()
        .take_while(|d| *d <= to)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .count() as u32
}

fn one_decimal(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        one_decimal(100.0 * f64::from(part) / f64::from(whole))
    }
}

/// One attendance row as needed for reporting.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttendanceFact {
    pub user_id: u64,
    pub name: String,
    pub date: NaiveDate,
    pub status: String,
    pub worked_minutes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
pub struct AttendanceSummary {
    pub user_id: u64,
    pub name: String,
    pub present: u32,
    pub late: u32,
    pub half_day: u32,
    pub absent: u32,
    pub total_worked_minutes: u64,
    pub attendance_rate: f64,
}

/// Per-user summary over `[from, to]`. `users` lists everyone that should
/// appear, including people with no attendance rows at all.
pub fn summarize_attendance(
    users: &[(u64, String)],
    facts: &[AttendanceFact],
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<AttendanceSummary> {
    let expected = working_days(from, to);

    let mut by_user: BTreeMap<u64, AttendanceSummary> = users
        .iter()
        .map(|(id, name)| {
            (
                *id,
                AttendanceSummary {
                    user_id: *id,
                    name: name.clone(),
                    present: 0,
                    late: 0,
                    half_day: 0,
                    absent: 0,
                    total_worked_minutes: 0,
                    attendance_rate: 0.0,
                },
            )
        })
        .collect();

    for fact in facts.iter().filter(|f| f.date >= from && f.date <= to) {
        let entry = by_user.entry(fact.user_id).or_insert_with(|| AttendanceSummary {
            user_id: fact.user_id,
            name: fact.name.clone(),
            present: 0,
            late: 0,
            half_day: 0,
            absent: 0,
            total_worked_minutes: 0,
            attendance_rate: 0.0,
        });
        match fact.status.parse::<AttendanceStatus>() {
            Ok(AttendanceStatus::Present) => entry.present += 1,
            Ok(AttendanceStatus::Late) => entry.late += 1,
            Ok(AttendanceStatus::HalfDay) => entry.half_day += 1,
            Ok(AttendanceStatus::Absent) | Err(_) => continue,
        }
        entry.total_worked_minutes += u64::from(fact.worked_minutes.unwrap_or(0));
    }

    by_user
        .into_values()
        .map(|mut s| {
            let attended = s.present + s.late + s.half_day;
            s.absent = expected.saturating_sub(attended);
            s.attendance_rate = percentage(attended.min(expected), expected);
            s
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
pub struct AttendanceTrendPoint {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub present: u32,
    pub late: u32,
    pub half_day: u32,
}

/// Per-date counts, one point for every date in the range.
pub fn attendance_trend(facts: &[AttendanceFact], from: NaiveDate, to: NaiveDate) -> Vec<AttendanceTrendPoint> {
    let mut points: BTreeMap<NaiveDate, AttendanceTrendPoint> = from
        .iter_days()
        .take_while(|d| *d <= to)
        .map(|date| {
            (
                date,
                AttendanceTrendPoint {
                    date,
                    present: 0,
                    late: 0,
                    half_day: 0,
                },
            )
        })
        .collect();

    for fact in facts {
        let Some(point) = points.get_mut(&fact.date) else {
            continue;
        };
        match fact.status.parse::<AttendanceStatus>() {
            Ok(AttendanceStatus::Present) => point.present += 1,
            Ok(AttendanceStatus::Late) => point.late += 1,
            Ok(AttendanceStatus::HalfDay) => point.half_day += 1,
            _ => {}
        }
    }
    points.into_values().collect()
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskFact {
    pub assigned_to: Option<u64>,
    pub name: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
pub struct TaskSummary {
    pub user_id: Option<u64>,
    pub name: Option<String>,
    pub total: u32,
    pub pending: u32,
    pub in_progress: u32,
    pub completed: u32,
    pub completion_rate: f64,
}

/// Groups tasks by assignee; unassigned (batch) tasks form their own row.
pub fn summarize_tasks(facts: &[TaskFact]) -> Vec<TaskSummary> {
    let mut by_user: BTreeMap<Option<u64>, TaskSummary> = BTreeMap::new();

    for fact in facts {
        let entry = by_user.entry(fact.assigned_to).or_insert_with(|| TaskSummary {
            user_id: fact.assigned_to,
            name: fact.name.clone(),
            total: 0,
            pending: 0,
            in_progress: 0,
            completed: 0,
            completion_rate: 0.0,
        });
        entry.total += 1;
        match fact.status.parse::<TaskStatus>() {
            Ok(TaskStatus::Pending) => entry.pending += 1,
            Ok(TaskStatus::InProgress) => entry.in_progress += 1,
            Ok(TaskStatus::Completed) => entry.completed += 1,
            Err(_) => {}
        }
    }

    by_user
        .into_values()
        .map(|mut s| {
            s.completion_rate = percentage(s.completed, s.total);
            s
        })
        .collect()
}

/// Count of tasks per status; every status is present, zero if unused.
pub fn tasks_by_status(counts: &[(String, i64)]) -> BTreeMap<String, i64> {
    let mut out: BTreeMap<String, i64> = TaskStatus::iter().map(|s| (s.to_string(), 0)).collect();
    for (status, n) in counts {
        if let Some(slot) = out.get_mut(status) {
            *slot += n;
        }
    }
    out
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeaveFact {
    pub leave_type: String,
    pub status: String,
    pub days: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
pub struct LeaveTypeSummary {
    pub leave_type: String,
    pub requests: u32,
    pub approved: u32,
    pub pending: u32,
    pub rejected: u32,
    pub cancelled: u32,
    /// Days of every request of this type, whatever its status
    pub total_days: u32,
    pub approved_days: u32,
}

pub fn summarize_leaves(facts: &[LeaveFact]) -> Vec<LeaveTypeSummary> {
    let mut by_type: HashMap<&str, LeaveTypeSummary> = HashMap::new();
    for fact in facts {
        let entry = by_type
            .entry(fact.leave_type.as_str())
            .or_insert_with(|| LeaveTypeSummary {
                leave_type: fact.leave_type.clone(),
                requests: 0,
                approved: 0,
                pending: 0,
                rejected: 0,
                cancelled: 0,
                total_days: 0,
                approved_days: 0,
            });
        entry.requests += 1;
        entry.total_days += fact.days;
        match fact.status.as_str() {
            "approved" => {
                entry.approved += 1;
                entry.approved_days += fact.days;
            }
            "pending" => entry.pending += 1,
            "rejected" => entry.rejected += 1,
            "cancelled" => entry.cancelled += 1,
            _ => {}
        }
    }
    let mut out: Vec<_> = by_type.into_values().collect();
    out.sort_by(|a, b| a.leave_type.cmp(&b.leave_type));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn fact(user_id: u64, date: NaiveDate, status: &str, minutes: u32) -> AttendanceFact {
        AttendanceFact {
            user_id,
            name: format!("user{user_id}"),
            date,
            status: status.to_string(),
            worked_minutes: Some(minutes),
        }
    }

    #[test]
    fn working_days_skip_weekends() {
        // 2026-03-02 is a Monday
        assert_eq!(working_days(d(2026, 3, 2), d(2026, 3, 8)), 5);
        assert_eq!(working_days(d(2026, 3, 7), d(2026, 3, 8)), 0);
        assert_eq!(working_days(d(2026, 3, 2), d(2026, 3, 1)), 0);
        assert_eq!(working_days(d(2026, 3, 2), d(2026, 3, 13)), 10);
    }

    #[test]
    fn attendance_summary_counts_statuses_and_absences() {
        let users = vec![(1, "Ann".to_string()), (2, "Bob".to_string())];
        let facts = vec![
            fact(1, d(2026, 3, 2), "present", 480),
            fact(1, d(2026, 3, 3), "late", 450),
            fact(1, d(2026, 3, 4), "half_day", 200),
            // outside the range
            fact(1, d(2026, 3, 20), "present", 480),
        ];

        let summary = summarize_attendance(&users, &facts, d(2026, 3, 2), d(2026, 3, 6));
        assert_eq!(summary.len(), 2);

        let ann = &summary[0];
        assert_eq!((ann.present, ann.late, ann.half_day, ann.absent), (1, 1, 1, 2));
        assert_eq!(ann.total_worked_minutes, 1130);
        assert_eq!(ann.attendance_rate, 60.0);

        let bob = &summary[1];
        assert_eq!(bob.absent, 5);
        assert_eq!(bob.attendance_rate, 0.0);
    }

    #[test]
    fn weekend_attendance_never_drives_absent_negative() {
        let users = vec![(1, "Ann".to_string())];
        let facts = vec![
            fact(1, d(2026, 3, 7), "present", 300),
            fact(1, d(2026, 3, 8), "present", 300),
        ];
        let summary = summarize_attendance(&users, &facts, d(2026, 3, 7), d(2026, 3, 8));
        assert_eq!(summary[0].absent, 0);
        assert_eq!(summary[0].attendance_rate, 0.0);
    }

    #[test]
    fn trend_has_a_point_per_day() {
        let facts = vec![
            fact(1, d(2026, 3, 2), "present", 480),
            fact(2, d(2026, 3, 2), "late", 480),
            fact(1, d(2026, 3, 4), "half_day", 100),
        ];
        let trend = attendance_trend(&facts, d(2026, 3, 2), d(2026, 3, 4));
        assert_eq!(trend.len(), 3);
        assert_eq!((trend[0].present, trend[0].late), (1, 1));
        assert_eq!(trend[1].present + trend[1].late + trend[1].half_day, 0);
        assert_eq!(trend[2].half_day, 1);
    }

    #[test]
    fn task_summary_groups_by_assignee() {
        let facts = vec![
            TaskFact { assigned_to: Some(1), name: Some("Ann".into()), status: "completed".into() },
            TaskFact { assigned_to: Some(1), name: Some("Ann".into()), status: "in_progress".into() },
            TaskFact { assigned_to: Some(1), name: Some("Ann".into()), status: "completed".into() },
            TaskFact { assigned_to: None, name: None, status: "pending".into() },
        ];
        let summary = summarize_tasks(&facts);
        assert_eq!(summary.len(), 2);

        // None sorts before Some
        assert_eq!(summary[0].user_id, None);
        assert_eq!(summary[0].pending, 1);

        let ann = &summary[1];
        assert_eq!(ann.total, 3);
        assert_eq!(ann.completed, 2);
        assert_eq!(ann.completion_rate, 66.7);
    }

    #[test]
    fn task_status_map_is_complete() {
        let map = tasks_by_status(&[("completed".into(), 4), ("bogus".into(), 9)]);
        assert_eq!(map.len(), 3);
        assert_eq!(map["completed"], 4);
        assert_eq!(map["pending"], 0);
        assert_eq!(map["in_progress"], 0);
    }

    #[test]
    fn leave_summary_totals_days() {
        let facts = vec![
            LeaveFact { leave_type: "sick".into(), status: "approved".into(), days: 2 },
            LeaveFact { leave_type: "sick".into(), status: "approved".into(), days: 1 },
            LeaveFact { leave_type: "sick".into(), status: "rejected".into(), days: 5 },
            LeaveFact { leave_type: "annual".into(), status: "pending".into(), days: 3 },
        ];
        let summary = summarize_leaves(&facts);
        assert_eq!(summary[0].leave_type, "annual");
        assert_eq!(summary[0].pending, 1);
        assert_eq!(summary[1].requests, 3);
        assert_eq!(summary[1].approved_days, 3);
        assert_eq!(summary[1].total_days, 8);
        assert_eq!(summary[0].total_days, 3);
        assert_eq!(summary[1].rejected, 1);
    }
}
