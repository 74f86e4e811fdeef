use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{AppError, AppResult, is_duplicate_key},
    model::attendance::{ATTENDANCE_COLUMNS, Attendance, AttendanceStatus},
    services::attendance::{status_on_check_in, status_on_check_out, worked_minutes},
    utils::{
        db_utils::Filters,
        pagination::{Page, Paginated, PaginatedAttendance},
    },
};
use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use std::str::FromStr;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, Default, ToSchema)]
pub struct CheckInReq {
    /// Free text, e.g. "working from home"
    pub note: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct MyAttendanceQuery {
    /// Inclusive start date (YYYY-MM-DD)
    #[param(value_type = Option<String>)]
    pub from: Option<NaiveDate>,
    /// Inclusive end date (YYYY-MM-DD)
    #[param(value_type = Option<String>)]
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct AttendanceQuery {
    pub user_id: Option<u64>,
    /// Single day (YYYY-MM-DD)
    #[param(value_type = Option<String>)]
    pub date: Option<NaiveDate>,
    #[param(value_type = Option<String>)]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>)]
    pub to: Option<NaiveDate>,
    /// present, late, half_day
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

async fn list_with(pool: &MySqlPool, filters: &Filters, page: Page) -> AppResult<Paginated<Attendance>> {
    let where_clause = filters.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM attendance{where_clause}");
    let total = filters
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool)
        .await?;

    let data_sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance{where_clause} ORDER BY date DESC, id DESC LIMIT ? OFFSET ?"
    );
    let rows = filters
        .bind_as(sqlx::query_as::<_, Attendance>(&data_sql))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok(Paginated::new(rows, page, total))
}

fn range_filters(filters: &mut Filters, from: Option<NaiveDate>, to: Option<NaiveDate>) -> AppResult<()> {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::bad_request("from cannot be after to"));
        }
    }
    if let Some(from) = from {
        filters.eq("date >= ?", from);
    }
    if let Some(to) = to {
        filters.eq("date <= ?", to);
    }
    Ok(())
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body(content = CheckInReq, description = "Optional note"),
    responses(
        (status = 200, description = "Checked in successfully", body = Object, example = json!({
            "message": "Checked in successfully", "status": "present", "check_in": "09:04:11"
        })),
        (status = 400, description = "Already checked in today", body = Object, example = json!({
            "message": "Already checked in today"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    body: Option<web::Json<CheckInReq>>,
) -> AppResult<HttpResponse> {
    let now = Local::now().naive_local();
    let (today, time) = (now.date(), now.time());
    let status = status_on_check_in(&config.policy, time);
    let note = body
        .and_then(|b| b.into_inner().note)
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let result = sqlx::query(
        r#"
        INSERT INTO attendance (user_id, date, check_in, status, note)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(today)
    .bind(time)
    .bind(status.to_string())
    .bind(note)
    .execute(pool.get_ref())
    .await;

    match result {
        Ok(_) => {
            info!(user_id = auth.user_id, status = %status, "Checked in");
            Ok(HttpResponse::Ok().json(json!({
                "message": "Checked in successfully",
                "status": status,
                "check_in": time.format("%H:%M:%S").to_string()
            })))
        }
        // one row per user and day
        Err(e) if is_duplicate_key(&e) => Err(AppError::bad_request("Already checked in today")),
        Err(e) => Err(e.into()),
    }
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    responses(
        (status = 200, description = "Checked out successfully", body = Attendance),
        (status = 400, description = "No active check-in found for today", body = Object, example = json!({
            "message": "No active check-in found for today"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let now = Local::now().naive_local();
    let today = now.date();

    let open = sqlx::query_as::<_, (u64, NaiveTime, String)>(
        r#"
        SELECT id, check_in, status
        FROM attendance
        WHERE user_id = ? AND date = ? AND check_out IS NULL
        "#,
    )
    .bind(auth.user_id)
    .bind(today)
    .fetch_optional(pool.get_ref())
    .await?;

    let Some((id, checked_in_at, status)) = open else {
        return Err(AppError::bad_request("No active check-in found for today"));
    };

    let worked = worked_minutes(checked_in_at, now.time());
    let current = AttendanceStatus::from_str(&status).unwrap_or(AttendanceStatus::Present);
    let final_status = status_on_check_out(&config.policy, current, worked);

    let result = sqlx::query(
        r#"
        UPDATE attendance
        SET check_out = ?, worked_minutes = ?, status = ?
        WHERE id = ? AND check_out IS NULL
        "#,
    )
    .bind(now.time())
    .bind(worked)
    .bind(final_status.to_string())
    .bind(id)
    .execute(pool.get_ref())
    .await?;

    // a concurrent check-out won the race
    if result.rows_affected() == 0 {
        return Err(AppError::bad_request("No active check-in found for today"));
    }

    info!(user_id = auth.user_id, worked, status = %final_status, "Checked out");

    let record = sqlx::query_as::<_, Attendance>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?"
    ))
    .bind(id)
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(record))
}

/// Today's record of the caller, `null` before check-in
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses((status = 200, description = "Today's attendance, `null` before check-in", body = Attendance)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let today = Local::now().date_naive();

    let record = sqlx::query_as::<_, Attendance>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE user_id = ? AND date = ?"
    ))
    .bind(auth.user_id)
    .bind(today)
    .fetch_optional(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(record))
}

#[utoipa::path(
    get,
    path = "/api/attendance/me",
    params(MyAttendanceQuery),
    responses((status = 200, description = "Own attendance history", body = PaginatedAttendance)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn my_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MyAttendanceQuery>,
) -> AppResult<HttpResponse> {
    let mut filters = Filters::new();
    filters.eq("user_id = ?", auth.user_id);
    range_filters(&mut filters, query.from, query.to)?;

    let page = Page::from_parts(query.page, query.per_page);
    Ok(HttpResponse::Ok().json(list_with(pool.get_ref(), &filters, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Attendance records", body = PaginatedAttendance),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let mut filters = Filters::new();
    if let Some(user_id) = query.user_id {
        filters.eq("user_id = ?", user_id);
    }
    if let Some(date) = query.date {
        filters.eq("date = ?", date);
    }
    range_filters(&mut filters, query.from, query.to)?;
    if let Some(status) = &query.status {
        let status = AttendanceStatus::from_str(status)
            .map_err(|_| AppError::bad_request("Unknown attendance status"))?;
        filters.eq("status = ?", status.to_string());
    }

    let page = Page::from_parts(query.page, query.per_page);
    Ok(HttpResponse::Ok().json(list_with(pool.get_ref(), &filters, page).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::db_utils::SqlValue;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, day).unwrap()
    }

    #[test]
    fn range_filters_reject_reversed_range() {
        let mut filters = Filters::new();
        assert!(range_filters(&mut filters, Some(d(3, 5)), Some(d(3, 1))).is_err());
    }

    #[test]
    fn range_filters_add_bounds() {
        let mut filters = Filters::new();
        range_filters(&mut filters, Some(d(3, 1)), Some(d(3, 31))).unwrap();
        assert_eq!(filters.where_clause(), " WHERE date >= ? AND date <= ?");
        assert_eq!(filters.values()[1], SqlValue::Date(d(3, 31)));
    }
}
