//! Leave day counting and yearly balances.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use strum::IntoEnumIterator;
use utoipa::ToSchema;

use crate::config::WorkPolicy;
use crate::model::leave_request::{LeaveStatus, LeaveType};

/// Inclusive number of calendar days in `[start, end]`; 0 if reversed.
pub fn leave_days(start: NaiveDate, end: NaiveDate) -> u32 {
    if end < start {
        return 0;
    }
    u32::try_from((end - start).num_days() + 1).unwrap_or(u32::MAX)
}

/// Yearly allowance for a leave type. `None` means uncapped.
pub fn allowance(policy: &WorkPolicy, leave_type: LeaveType) -> Option<u32> {
    match leave_type {
        LeaveType::Annual => Some(policy.annual_leave_days),
        LeaveType::Sick => Some(policy.sick_leave_days),
        LeaveType::Casual | LeaveType::Unpaid => None,
    }
}

/// Days of a request that fall inside `year`.
pub fn days_in_year(start: NaiveDate, end: NaiveDate, year: i32) -> u32 {
    let (Some(first), Some(last)) = (
        NaiveDate::from_ymd_opt(year, 1, 1),
        NaiveDate::from_ymd_opt(year, 12, 31),
    ) else {
        return 0;
    };
    leave_days(start.max(first), end.min(last))
}

/// A leave row reduced to what balance computation needs.
#[derive(Debug, Clone)]
pub struct LeaveUsage {
    pub leave_type: LeaveType,
    pub status: LeaveStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
pub struct LeaveBalance {
    #[schema(value_type = String, example = "annual")]
    pub leave_type: LeaveType,
    /// `null` for uncapped leave types
    pub allowance: Option<u32>,
    pub used: u32,
    pub pending: u32,
    pub remaining: Option<u32>,
}

pub fn balances(policy: &WorkPolicy, year: i32, usage: &[LeaveUsage]) -> Vec<LeaveBalance> {
    let mut used: HashMap<LeaveType, u32> = HashMap::new();
    let mut pending: HashMap<LeaveType, u32> = HashMap::new();

    for u in usage {
        let days = days_in_year(u.start_date, u.end_date, year);
        match u.status {
            LeaveStatus::Approved => *used.entry(u.leave_type).or_default() += days,
            LeaveStatus::Pending => *pending.entry(u.leave_type).or_default() += days,
            LeaveStatus::Rejected | LeaveStatus::Cancelled => {}
        }
    }

    LeaveType::iter()
        .map(|leave_type| {
            let allowance = allowance(policy, leave_type);
            let used = used.get(&leave_type).copied().unwrap_or(0);
            let pending = pending.get(&leave_type).copied().unwrap_or(0);
            LeaveBalance {
                leave_type,
                allowance,
                used,
                pending,
                remaining: allowance.map(|a| a.saturating_sub(used + pending)),
            }
        })
        .collect()
}

/// Checks a new request of `requested` days against the balance for its type.
pub fn fits_allowance(balance: &LeaveBalance, requested: u32) -> bool {
    match balance.allowance {
        Some(allowance) => balance.used + balance.pending + requested <= allowance,
        None => true,
    }
}

/// Year used for balance accounting of a request.
pub fn accounting_year(start: NaiveDate) -> i32 {
    start.year()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn counts_inclusive_days() {
        assert_eq!(leave_days(d(2026, 1, 1), d(2026, 1, 1)), 1);
        assert_eq!(leave_days(d(2026, 1, 1), d(2026, 1, 3)), 3);
        assert_eq!(leave_days(d(2026, 1, 31), d(2026, 2, 2)), 3);
        assert_eq!(leave_days(d(2026, 1, 3), d(2026, 1, 1)), 0);
    }

    #[test]
    fn days_spanning_new_year_are_split() {
        assert_eq!(days_in_year(d(2025, 12, 30), d(2026, 1, 2), 2025), 2);
        assert_eq!(days_in_year(d(2025, 12, 30), d(2026, 1, 2), 2026), 2);
        assert_eq!(days_in_year(d(2025, 12, 30), d(2026, 1, 2), 2027), 0);
    }

    #[test]
    fn balance_counts_approved_and_pending() {
        let policy = WorkPolicy::default();
        let usage = vec![
            LeaveUsage {
                leave_type: LeaveType::Annual,
                status: LeaveStatus::Approved,
                start_date: d(2026, 2, 1),
                end_date: d(2026, 2, 5),
            },
            LeaveUsage {
                leave_type: LeaveType::Annual,
                status: LeaveStatus::Pending,
                start_date: d(2026, 4, 1),
                end_date: d(2026, 4, 2),
            },
            LeaveUsage {
                leave_type: LeaveType::Annual,
                status: LeaveStatus::Rejected,
                start_date: d(2026, 5, 1),
                end_date: d(2026, 5, 10),
            },
            LeaveUsage {
                leave_type: LeaveType::Unpaid,
                status: LeaveStatus::Approved,
                start_date: d(2026, 6, 1),
                end_date: d(2026, 6, 30),
            },
        ];

        let all = balances(&policy, 2026, &usage);
        let annual = all.iter().find(|b| b.leave_type == LeaveType::Annual).unwrap();
        assert_eq!(annual.used, 5);
        assert_eq!(annual.pending, 2);
        assert_eq!(annual.remaining, Some(13));
        assert!(fits_allowance(annual, 13));
        assert!(!fits_allowance(annual, 14));

        let unpaid = all.iter().find(|b| b.leave_type == LeaveType::Unpaid).unwrap();
        assert_eq!(unpaid.allowance, None);
        assert_eq!(unpaid.remaining, None);
        assert!(fits_allowance(unpaid, 365));
    }
}
