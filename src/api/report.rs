use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    services::reports::{
        AttendanceFact, AttendanceSummary, AttendanceTrendPoint, LeaveFact, LeaveTypeSummary, TaskFact,
        TaskSummary, attendance_trend, summarize_attendance, summarize_leaves, summarize_tasks,
        tasks_by_status,
    },
};
use actix_web::{HttpResponse, web};
use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

/// Longest range the attendance reports accept, in days.
const MAX_RANGE_DAYS: i64 = 366;

#[derive(Deserialize, IntoParams)]
pub struct RangeQuery {
    /// Defaults to the first day of the current month
    #[param(value_type = Option<String>)]
    pub from: Option<NaiveDate>,
    /// Defaults to today
    #[param(value_type = Option<String>)]
    pub to: Option<NaiveDate>,
    pub user_id: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
pub struct YearQuery {
    /// Defaults to the current year
    pub year: Option<i32>,
}

#[derive(Serialize, ToSchema)]
pub struct Dashboard {
    pub total_employees: i64,
    pub present_today: i64,
    pub late_today: i64,
    pub on_leave_today: i64,
    pub pending_leaves: i64,
    pub tasks_by_status: BTreeMap<String, i64>,
    pub active_projects: i64,
}

#[derive(Serialize, ToSchema)]
pub struct MyReport {
    #[schema(value_type = String, format = "date")]
    pub from: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub to: NaiveDate,
    pub attendance: Option<AttendanceSummary>,
    pub tasks: BTreeMap<String, i64>,
    /// Average score of submitted worksheets in the period
    pub average_worksheet_score: Option<f64>,
}

pub(crate) fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

/// Fills defaults and enforces ordering and the maximum span.
pub(crate) fn resolve_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> AppResult<(NaiveDate, NaiveDate)> {
    let to = to.unwrap_or(today);
    let from = from.unwrap_or_else(|| month_start(to));

    if from > to {
        return Err(AppError::bad_request("from cannot be after to"));
    }
    if (to - from).num_days() + 1 > MAX_RANGE_DAYS {
        return Err(AppError::bad_request(format!(
            "Range cannot exceed {MAX_RANGE_DAYS} days"
        )));
    }
    Ok((from, to))
}

async fn count(pool: &MySqlPool, sql: &str, date: Option<NaiveDate>) -> AppResult<i64> {
    let mut query = sqlx::query_scalar::<_, i64>(sql);
    if let Some(date) = date {
        query = query.bind(date);
    }
    Ok(query.fetch_one(pool).await?)
}

async fn attendance_facts(
    pool: &MySqlPool,
    from: NaiveDate,
    to: NaiveDate,
    user_id: Option<u64>,
) -> AppResult<Vec<AttendanceFact>> {
    let mut sql = String::from(
        r#"
        SELECT a.user_id, u.name, a.date, a.status, a.worked_minutes
        FROM attendance a
        JOIN users u ON u.id = a.user_id
        WHERE a.date BETWEEN ? AND ?
        "#,
    );
    if user_id.is_some() {
        sql.push_str(" AND a.user_id = ?");
    }

    let mut query = sqlx::query_as::<_, AttendanceFact>(&sql).bind(from).bind(to);
    if let Some(user_id) = user_id {
        query = query.bind(user_id);
    }
    Ok(query.fetch_all(pool).await?)
}

/// Attendance summary rows for active users (or one user) over a range.
pub(crate) async fn attendance_summary(
    pool: &MySqlPool,
    from: NaiveDate,
    to: NaiveDate,
    user_id: Option<u64>,
) -> AppResult<Vec<AttendanceSummary>> {
    let users = match user_id {
        Some(id) => {
            sqlx::query_as::<_, (u64, String)>("SELECT id, name FROM users WHERE id = ?")
                .bind(id)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as::<_, (u64, String)>(
                "SELECT id, name FROM users WHERE status = 'active' ORDER BY id",
            )
            .fetch_all(pool)
            .await?
        }
    };

    let facts = attendance_facts(pool, from, to, user_id).await?;
    Ok(summarize_attendance(&users, &facts, from, to))
}

#[utoipa::path(
    get,
    path = "/api/reports/dashboard",
    responses(
        (status = 200, description = "Headline numbers for today", body = Dashboard),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Report"
)]
pub async fn dashboard(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let pool = pool.get_ref();
    let today = Local::now().date_naive();

    let total_employees = count(pool, "SELECT COUNT(*) FROM users WHERE status = 'active'", None).await?;
    let present_today = count(pool, "SELECT COUNT(*) FROM attendance WHERE date = ?", Some(today)).await?;
    let late_today = count(
        pool,
        "SELECT COUNT(*) FROM attendance WHERE date = ? AND status = 'late'",
        Some(today),
    )
    .await?;
    let on_leave_today = count(
        pool,
        "SELECT COUNT(DISTINCT user_id) FROM leave_requests WHERE status = 'approved' AND ? BETWEEN start_date AND end_date",
        Some(today),
    )
    .await?;
    let pending_leaves = count(pool, "SELECT COUNT(*) FROM leave_requests WHERE status = 'pending'", None).await?;
    let active_projects = count(pool, "SELECT COUNT(*) FROM projects WHERE status = 'active'", None).await?;

    let task_counts = sqlx::query_as::<_, (String, i64)>("SELECT status, COUNT(*) FROM tasks GROUP BY status")
        .fetch_all(pool)
        .await?;

    Ok(HttpResponse::Ok().json(Dashboard {
        total_employees,
        present_today,
        late_today,
        on_leave_today,
        pending_leaves,
        tasks_by_status: tasks_by_status(&task_counts),
        active_projects,
    }))
}

#[utoipa::path(
    get,
    path = "/api/reports/attendance",
    params(RangeQuery),
    responses(
        (status = 200, description = "Per-user attendance summary", body = [AttendanceSummary]),
        (status = 400, description = "Invalid range"),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Report"
)]
pub async fn attendance_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RangeQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let (from, to) = resolve_range(query.from, query.to, Local::now().date_naive())?;

    let rows = attendance_summary(pool.get_ref(), from, to, query.user_id).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/reports/attendance/trend",
    params(RangeQuery),
    responses(
        (status = 200, description = "Per-date attendance counts", body = [AttendanceTrendPoint]),
        (status = 400, description = "Invalid range")
    ),
    security(("bearer_auth" = [])),
    tag = "Report"
)]
pub async fn attendance_trend_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RangeQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let (from, to) = resolve_range(query.from, query.to, Local::now().date_naive())?;

    let facts = attendance_facts(pool.get_ref(), from, to, query.user_id).await?;
    Ok(HttpResponse::Ok().json(attendance_trend(&facts, from, to)))
}

#[utoipa::path(
    get,
    path = "/api/reports/leaves",
    params(YearQuery),
    responses((status = 200, description = "Leave counts per type and status", body = [LeaveTypeSummary])),
    security(("bearer_auth" = [])),
    tag = "Report"
)]
pub async fn leave_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<YearQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let year = query.year.unwrap_or_else(|| Local::now().year());

    let facts = sqlx::query_as::<_, LeaveFact>(
        "SELECT leave_type, status, days FROM leave_requests WHERE YEAR(start_date) = ?",
    )
    .bind(year)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(summarize_leaves(&facts)))
}

#[utoipa::path(
    get,
    path = "/api/reports/tasks",
    responses((status = 200, description = "Per-assignee task totals", body = [TaskSummary])),
    security(("bearer_auth" = [])),
    tag = "Report"
)]
pub async fn task_report(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let facts = sqlx::query_as::<_, TaskFact>(
        r#"
        SELECT t.assigned_to, u.name, t.status
        FROM tasks t
        LEFT JOIN users u ON u.id = t.assigned_to
        "#,
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(summarize_tasks(&facts)))
}

#[utoipa::path(
    get,
    path = "/api/reports/me",
    responses((status = 200, description = "Own summary for the current month", body = MyReport)),
    security(("bearer_auth" = [])),
    tag = "Report"
)]
pub async fn my_report(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let to = Local::now().date_naive();
    let from = month_start(to);

    let attendance = attendance_summary(pool.get_ref(), from, to, Some(auth.user_id))
        .await?
        .into_iter()
        .next();

    let task_counts = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM tasks WHERE assigned_to = ? GROUP BY status",
    )
    .bind(auth.user_id)
    .fetch_all(pool.get_ref())
    .await?;

    let average_worksheet_score = sqlx::query_scalar::<_, Option<f64>>(
        r#"
        SELECT AVG(productivity_score)
        FROM worksheets
        WHERE user_id = ? AND submitted = TRUE AND date BETWEEN ? AND ?
        "#,
    )
    .bind(auth.user_id)
    .bind(from)
    .bind(to)
    .fetch_one(pool.get_ref())
    .await?
    .map(|avg| (avg * 10.0).round() / 10.0);

    Ok(HttpResponse::Ok().json(MyReport {
        from,
        to,
        attendance,
        tasks: tasks_by_status(&task_counts),
        average_worksheet_score,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn range_defaults_to_current_month() {
        let today = d(2026, 5, 17);
        assert_eq!(resolve_range(None, None, today).unwrap(), (d(2026, 5, 1), today));
        assert_eq!(
            resolve_range(None, Some(d(2026, 2, 10)), today).unwrap(),
            (d(2026, 2, 1), d(2026, 2, 10))
        );
    }

    #[test]
    fn range_limits() {
        let today = d(2026, 5, 17);
        assert!(resolve_range(Some(d(2026, 5, 2)), Some(d(2026, 5, 1)), today).is_err());
        // 2024 is a leap year: 366 days is the maximum
        assert!(resolve_range(Some(d(2024, 1, 1)), Some(d(2024, 12, 31)), today).is_ok());
        assert!(resolve_range(Some(d(2024, 1, 1)), Some(d(2025, 1, 1)), today).is_err());
    }
}
