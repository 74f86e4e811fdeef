use crate::{
    auth::auth::AuthUser,
    config::{Config, WorkPolicy},
    error::{AppError, AppResult},
    model::leave_request::{LEAVE_COLUMNS, LeaveRequest, LeaveStatus, LeaveType},
    services::leave::{
        LeaveBalance, LeaveUsage, accounting_year, balances, fits_allowance, leave_days,
    },
    utils::{
        db_utils::Filters,
        pagination::{Page, Paginated, PaginatedLeaves},
    },
};
use actix_web::{HttpResponse, web};
use chrono::{Datelike, Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use sqlx::{MySqlExecutor, MySqlPool};
use std::str::FromStr;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = "sick")]
    pub leave_type: LeaveType, // enum ensures Swagger dropdown
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-02", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = "Flu")]
    pub reason: Option<String>,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct ReviewLeave {
    /// Optional note shown to the employee
    #[schema(example = "Enjoy your time off")]
    pub note: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct LeaveFilter {
    /// Filter by employee (HR/Admin only)
    pub user_id: Option<u64>,
    /// pending, approved, rejected, cancelled
    pub status: Option<String>,
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    /// Items per page
    pub per_page: Option<u32>,
}

fn parse_status(raw: &str) -> AppResult<LeaveStatus> {
    LeaveStatus::from_str(raw).map_err(|_| AppError::bad_request("Unknown leave status"))
}

async fn list_with(pool: &MySqlPool, filters: &Filters, page: Page) -> AppResult<Paginated<LeaveRequest>> {
    let where_clause = filters.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM leave_requests{where_clause}");
    let total = filters
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool)
        .await?;

    let data_sql = format!(
        r#"
        SELECT {LEAVE_COLUMNS}
        FROM leave_requests
        {where_clause}
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#
    );
    let rows = filters
        .bind_as(sqlx::query_as::<_, LeaveRequest>(&data_sql))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok(Paginated::new(rows, page, total))
}

async fn fetch_leave(pool: &MySqlPool, leave_id: u64) -> AppResult<LeaveRequest> {
    sqlx::query_as::<_, LeaveRequest>(&format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ?"
    ))
    .bind(leave_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Leave request not found"))
}

/// Pending and approved requests of a user touching `year`.
async fn usage_for_year<'e, E>(exec: E, user_id: u64, year: i32) -> AppResult<Vec<LeaveUsage>>
where
    E: MySqlExecutor<'e>,
{
    let rows = sqlx::query_as::<_, (String, String, NaiveDate, NaiveDate)>(
        r#"
        SELECT leave_type, status, start_date, end_date
        FROM leave_requests
        WHERE user_id = ?
          AND status IN ('pending', 'approved')
          AND YEAR(start_date) <= ? AND YEAR(end_date) >= ?
        "#,
    )
    .bind(user_id)
    .bind(year)
    .bind(year)
    .fetch_all(exec)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(leave_type, status, start_date, end_date)| {
            Some(LeaveUsage {
                leave_type: LeaveType::from_str(&leave_type).ok()?,
                status: LeaveStatus::from_str(&status).ok()?,
                start_date,
                end_date,
            })
        })
        .collect())
}

/// Checks dates of a new request; `today` is passed in for testability.
fn validate_dates(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> AppResult<u32> {
    if start > end {
        return Err(AppError::bad_request("start_date cannot be after end_date"));
    }
    if start < today {
        return Err(AppError::bad_request("Leave cannot start in the past"));
    }
    Ok(leave_days(start, end))
}

/// Rejects a request that would push a capped leave type over its yearly allowance.
fn check_allowance(
    policy: &WorkPolicy,
    year: i32,
    usage: &[LeaveUsage],
    leave_type: LeaveType,
    days: u32,
) -> AppResult<()> {
    let balance = balances(policy, year, usage)
        .into_iter()
        .find(|b| b.leave_type == leave_type);
    match balance {
        Some(balance) if !fits_allowance(&balance, days) => Err(AppError::bad_request(format!(
            "Insufficient {} leave balance: {} day(s) remaining",
            leave_type,
            balance.remaining.unwrap_or(0)
        ))),
        _ => Ok(()),
    }
}

/* =========================
Create leave request
========================= */
#[utoipa::path(
    post,
    path = "/api/leaves",
    request_body(content = CreateLeave, description = "Leave request payload", content_type = "application/json"),
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveRequest),
        (status = 400, description = "Invalid dates or insufficient balance"),
        (status = 409, description = "Overlaps an existing request")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<CreateLeave>,
) -> AppResult<HttpResponse> {
    let today = Local::now().date_naive();

    // 1️⃣ validate dates
    let days = validate_dates(payload.start_date, payload.end_date, today)?;

    let reason = payload
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());

    let mut tx = pool.begin().await?;

    // 2️⃣ serialise submissions of the same user
    sqlx::query("SELECT id FROM users WHERE id = ? FOR UPDATE")
        .bind(auth.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".into()))?;

    // 3️⃣ no overlap with own pending/approved requests
    let overlapping = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM leave_requests
        WHERE user_id = ?
          AND status IN ('pending', 'approved')
          AND start_date <= ? AND end_date >= ?
        "#,
    )
    .bind(auth.user_id)
    .bind(payload.end_date)
    .bind(payload.start_date)
    .fetch_one(&mut *tx)
    .await?;

    if overlapping > 0 {
        return Err(AppError::conflict("Overlaps an existing leave request"));
    }

    // 4️⃣ yearly allowance
    let year = accounting_year(payload.start_date);
    let usage = usage_for_year(&mut *tx, auth.user_id, year).await?;
    check_allowance(&config.policy, year, &usage, payload.leave_type, days)?;

    // 5️⃣ insert request
    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests (user_id, leave_type, start_date, end_date, days, reason)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(payload.leave_type.to_string())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(days)
    .bind(reason)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let leave = fetch_leave(pool.get_ref(), result.last_insert_id()).await?;
    info!(user_id = auth.user_id, leave_id = leave.id, days, "Leave request submitted");

    Ok(HttpResponse::Created().json(leave))
}

async fn review(
    auth: &AuthUser,
    pool: &MySqlPool,
    leave_id: u64,
    decision: LeaveStatus,
    note: Option<String>,
) -> AppResult<()> {
    auth.require_hr_or_admin()?;

    let leave = fetch_leave(pool, leave_id).await?;
    if leave.user_id == auth.user_id {
        return Err(AppError::forbidden("You cannot review your own leave request"));
    }

    let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

    let result = sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = ?, reviewed_by = ?, review_note = ?, reviewed_at = NOW()
        WHERE id = ?
        AND status = 'pending'
        "#,
    )
    .bind(decision.to_string())
    .bind(auth.user_id)
    .bind(note)
    .bind(leave_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::bad_request("Leave request not found or already processed"));
    }

    info!(leave_id, reviewer = auth.user_id, decision = %decision, "Leave reviewed");
    Ok(())
}

/* =========================
Approve leave (HR/Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/leaves/{leave_id}/approve",
    params(("leave_id" = u64, Path, description = "ID of the leave request to approve")),
    request_body(content = ReviewLeave, description = "Optional review note"),
    responses(
        (status = 200, description = "Leave approved successfully", body = Object, example = json!({
            "message": "Leave approved"
        })),
        (status = 400, description = "Leave request not found or already processed"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Option<web::Json<ReviewLeave>>,
) -> AppResult<HttpResponse> {
    let note = body.and_then(|b| b.into_inner().note);
    review(&auth, pool.get_ref(), path.into_inner(), LeaveStatus::Approved, note).await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Leave approved" })))
}

/* =========================
Reject leave (HR/Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/leaves/{leave_id}/reject",
    params(("leave_id" = u64, Path, description = "ID of the leave request to reject")),
    request_body(content = ReviewLeave, description = "Optional review note"),
    responses(
        (status = 200, description = "Leave rejected successfully", body = Object, example = json!({
            "message": "Leave rejected"
        })),
        (status = 400, description = "Leave request not found or already processed"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Option<web::Json<ReviewLeave>>,
) -> AppResult<HttpResponse> {
    let note = body.and_then(|b| b.into_inner().note);
    review(&auth, pool.get_ref(), path.into_inner(), LeaveStatus::Rejected, note).await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Leave rejected" })))
}

/// Owner withdraws a request that has not been reviewed yet
#[utoipa::path(
    put,
    path = "/api/leaves/{leave_id}/cancel",
    params(("leave_id" = u64, Path, description = "ID of the leave request to cancel")),
    responses(
        (status = 200, description = "Leave cancelled"),
        (status = 400, description = "Only pending requests can be cancelled"),
        (status = 403, description = "Not the owner")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn cancel_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let leave_id = path.into_inner();
    let leave = fetch_leave(pool.get_ref(), leave_id).await?;

    if leave.user_id != auth.user_id {
        warn!(leave_id, user_id = auth.user_id, "Cancel attempt on someone else's leave");
        return Err(AppError::forbidden("Only the requester can cancel a leave request"));
    }

    let result = sqlx::query(
        "UPDATE leave_requests SET status = 'cancelled' WHERE id = ? AND status = 'pending'",
    )
    .bind(leave_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::bad_request("Only pending requests can be cancelled"));
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Leave cancelled" })))
}

/// for getting a leave application details endpoint
#[utoipa::path(
    get,
    path = "/api/leaves/{leave_id}",
    params(("leave_id" = u64, Path, description = "ID of the leave request to fetch")),
    responses(
        (status = 200, description = "Leave request found", body = LeaveRequest),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let leave = fetch_leave(pool.get_ref(), path.into_inner()).await?;
    auth.require_self_or_manager(leave.user_id)?;

    Ok(HttpResponse::Ok().json(leave))
}

/// for getting leave applications endpoint
#[utoipa::path(
    get,
    path = "/api/leaves",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave list", body = PaginatedLeaves),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let mut filters = Filters::new();
    if let Some(user_id) = query.user_id {
        filters.eq("user_id = ?", user_id);
    }
    if let Some(status) = query.status.as_deref() {
        filters.eq("status = ?", parse_status(status)?.to_string());
    }

    let page = Page::from_parts(query.page, query.per_page);
    Ok(HttpResponse::Ok().json(list_with(pool.get_ref(), &filters, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/leaves/me",
    params(LeaveFilter),
    responses((status = 200, description = "Own leave requests", body = PaginatedLeaves)),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn my_leaves(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> AppResult<HttpResponse> {
    let mut filters = Filters::new();
    filters.eq("user_id = ?", auth.user_id);
    if let Some(status) = query.status.as_deref() {
        filters.eq("status = ?", parse_status(status)?.to_string());
    }

    let page = Page::from_parts(query.page, query.per_page);
    Ok(HttpResponse::Ok().json(list_with(pool.get_ref(), &filters, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/leaves/balance",
    responses((status = 200, description = "Per-type balance for the current year", body = [LeaveBalance])),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let year = Local::now().year();
    let usage = usage_for_year(pool.get_ref(), auth.user_id, year).await?;

    Ok(HttpResponse::Ok().json(json!({
        "year": year,
        "balances": balances(&config.policy, year, &usage)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, day).unwrap()
    }

    #[test]
    fn dates_must_be_ordered_and_not_in_the_past() {
        let today = d(3, 10);
        assert_eq!(validate_dates(d(3, 10), d(3, 12), today).unwrap(), 3);
        assert!(matches!(
            validate_dates(d(3, 12), d(3, 10), today),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            validate_dates(d(3, 9), d(3, 12), today),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn pending_requests_count_against_the_allowance() {
        let policy = WorkPolicy::default();
        let usage = vec![
            LeaveUsage {
                leave_type: LeaveType::Annual,
                status: LeaveStatus::Approved,
                start_date: d(1, 5),
                end_date: d(1, 14),
            },
            LeaveUsage {
                leave_type: LeaveType::Annual,
                status: LeaveStatus::Pending,
                start_date: d(2, 2),
                end_date: d(2, 9),
            },
        ];
        // 10 approved + 8 pending of 20
        assert!(check_allowance(&policy, 2026, &usage, LeaveType::Annual, 2).is_ok());
        assert!(matches!(
            check_allowance(&policy, 2026, &usage, LeaveType::Annual, 3),
            Err(AppError::BadRequest(_))
        ));
        assert!(check_allowance(&policy, 2026, &usage, LeaveType::Unpaid, 300).is_ok());
    }

    #[test]
    fn status_filter_must_be_known() {
        assert_eq!(parse_status("approved").unwrap(), LeaveStatus::Approved);
        assert!(parse_status("maybe").is_err());
    }
}
