use crate::{
    auth::auth::AuthUser,
    config::{Config, WorkPolicy},
    error::{AppError, AppResult},
    model::worksheet::{EntryStatus, WORKSHEET_COLUMNS, Worksheet, WorksheetBreak, WorksheetEntry},
    services::worksheet::{
        Slot, break_minutes, breaks_overlap, hourly_slots, productivity_score, rating, within_workday,
    },
    utils::{
        db_utils::Filters,
        pagination::{Page, Paginated, PaginatedWorksheets},
    },
};
use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::str::FromStr;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct EntryReq {
    #[schema(example = "Fixed login redirect bug")]
    pub description: String,
    pub status: EntryStatus,
    pub task_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct BreakReq {
    /// HH:MM or HH:MM:SS
    #[schema(example = "13:00")]
    pub start_time: String,
    #[schema(example = "13:30")]
    pub end_time: String,
    #[schema(example = "Lunch")]
    pub reason: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct MyWorksheetQuery {
    #[param(value_type = Option<String>)]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>)]
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct WorksheetQuery {
    pub user_id: Option<u64>,
    #[param(value_type = Option<String>)]
    pub date: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SlotView {
    pub index: u8,
    #[schema(example = "09:00-10:00")]
    pub label: String,
    pub minutes: i64,
    pub entry: Option<WorksheetEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WorksheetDetail {
    #[serde(flatten)]
    pub worksheet: Worksheet,
    pub slots: Vec<SlotView>,
    pub breaks: Vec<WorksheetBreak>,
    pub break_minutes: i64,
    /// Stored score once submitted, live score before that
    pub score: f64,
    #[schema(example = "good")]
    pub rating: String,
}

fn parse_clock(raw: &str, field: &str) -> AppResult<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| AppError::bad_request(format!("{field} must be HH:MM")))
}

fn score_of(slots: &[Slot], entries: &[WorksheetEntry], breaks: &[WorksheetBreak]) -> f64 {
    let statuses: Vec<(u8, EntryStatus)> = entries
        .iter()
        .filter_map(|e| EntryStatus::from_str(&e.status).ok().map(|s| (e.slot, s)))
        .collect();
    let spans: Vec<(NaiveTime, NaiveTime)> = breaks.iter().map(|b| (b.start_time, b.end_time)).collect();
    productivity_score(slots, &statuses, &spans)
}

/// Validates a new break against the work day and the breaks already taken.
fn check_break(
    policy: &WorkPolicy,
    start: NaiveTime,
    end: NaiveTime,
    existing: &[WorksheetBreak],
) -> AppResult<()> {
    if end <= start {
        return Err(AppError::bad_request("end_time must be after start_time"));
    }
    if !within_workday(policy, start, end) {
        return Err(AppError::bad_request("Break must be within the work day"));
    }
    if existing
        .iter()
        .any(|b| breaks_overlap((start, end), (b.start_time, b.end_time)))
    {
        return Err(AppError::conflict("Break overlaps an existing break"));
    }
    Ok(())
}

/// Today's worksheet of `user_id`, created on first access.
async fn sheet_for(pool: &MySqlPool, user_id: u64, date: NaiveDate) -> AppResult<Worksheet> {
    sqlx::query("INSERT IGNORE INTO worksheets (user_id, date) VALUES (?, ?)")
        .bind(user_id)
        .bind(date)
        .execute(pool)
        .await?;

    let sheet = sqlx::query_as::<_, Worksheet>(&format!(
        "SELECT {WORKSHEET_COLUMNS} FROM worksheets WHERE user_id = ? AND date = ?"
    ))
    .bind(user_id)
    .bind(date)
    .fetch_one(pool)
    .await?;

    Ok(sheet)
}

async fn open_sheet_for_today(pool: &MySqlPool, user_id: u64) -> AppResult<Worksheet> {
    let sheet = sheet_for(pool, user_id, Local::now().date_naive()).await?;
    if sheet.submitted {
        return Err(AppError::conflict("Worksheet already submitted"));
    }
    Ok(sheet)
}

async fn entries_of(pool: &MySqlPool, worksheet_id: u64) -> AppResult<Vec<WorksheetEntry>> {
    Ok(sqlx::query_as::<_, WorksheetEntry>(
        "SELECT id, worksheet_id, slot, task_id, description, status FROM worksheet_entries WHERE worksheet_id = ? ORDER BY slot",
    )
    .bind(worksheet_id)
    .fetch_all(pool)
    .await?)
}

async fn breaks_of(pool: &MySqlPool, worksheet_id: u64) -> AppResult<Vec<WorksheetBreak>> {
    Ok(sqlx::query_as::<_, WorksheetBreak>(
        "SELECT id, worksheet_id, start_time, end_time, reason FROM worksheet_breaks WHERE worksheet_id = ? ORDER BY start_time",
    )
    .bind(worksheet_id)
    .fetch_all(pool)
    .await?)
}

async fn detail(pool: &MySqlPool, policy: &WorkPolicy, sheet: Worksheet) -> AppResult<WorksheetDetail> {
    let slots = hourly_slots(policy);
    let mut entries = entries_of(pool, sheet.id).await?;
    let breaks = breaks_of(pool, sheet.id).await?;

    let score = match (sheet.submitted, sheet.productivity_score) {
        (true, Some(stored)) => stored,
        _ => score_of(&slots, &entries, &breaks),
    };
    let spans: Vec<_> = breaks.iter().map(|b| (b.start_time, b.end_time)).collect();

    let slot_views = slots
        .iter()
        .map(|slot| {
            let entry = entries
                .iter()
                .position(|e| e.slot == slot.index)
                .map(|i| entries.swap_remove(i));
            SlotView {
                index: slot.index,
                label: slot.label(),
                minutes: slot.minutes(),
                entry,
            }
        })
        .collect();

    Ok(WorksheetDetail {
        worksheet: sheet,
        slots: slot_views,
        break_minutes: break_minutes(&spans),
        breaks,
        score,
        rating: rating(score).to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/api/worksheets/today",
    responses((status = 200, description = "Today's worksheet with slots, breaks and live score", body = WorksheetDetail)),
    security(("bearer_auth" = [])),
    tag = "Worksheet"
)]
pub async fn today_worksheet(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let sheet = sheet_for(pool.get_ref(), auth.user_id, Local::now().date_naive()).await?;
    Ok(HttpResponse::Ok().json(detail(pool.get_ref(), &config.policy, sheet).await?))
}

fn slot_index(policy: &WorkPolicy, raw: u32) -> AppResult<u8> {
    u8::try_from(raw)
        .ok()
        .filter(|slot| usize::from(*slot) < hourly_slots(policy).len())
        .ok_or_else(|| AppError::bad_request("Slot out of range"))
}

#[utoipa::path(
    put,
    path = "/api/worksheets/today/entries/{slot}",
    params(("slot" = u32, Path, description = "Slot index, 0 is the first hour of the work day")),
    request_body = EntryReq,
    responses(
        (status = 200, description = "Entry saved", body = WorksheetDetail),
        (status = 400, description = "Slot out of range or invalid entry"),
        (status = 409, description = "Worksheet already submitted")
    ),
    security(("bearer_auth" = [])),
    tag = "Worksheet"
)]
pub async fn upsert_entry(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u32>,
    payload: web::Json<EntryReq>,
) -> AppResult<HttpResponse> {
    let slot = slot_index(&config.policy, path.into_inner())?;
    let description = payload.description.trim();
    if description.is_empty() {
        return Err(AppError::bad_request("description is required"));
    }

    if let Some(task_id) = payload.task_id {
        let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_one(pool.get_ref())
            .await?;
        if found == 0 {
            return Err(AppError::bad_request("Task does not exist"));
        }
    }

    let sheet = open_sheet_for_today(pool.get_ref(), auth.user_id).await?;

    sqlx::query(
        r#"
        INSERT INTO worksheet_entries (worksheet_id, slot, task_id, description, status)
        VALUES (?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            task_id = VALUES(task_id),
            description = VALUES(description),
            status = VALUES(status)
        "#,
    )
    .bind(sheet.id)
    .bind(slot)
    .bind(payload.task_id)
    .bind(description)
    .bind(payload.status.to_string())
    .execute(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(detail(pool.get_ref(), &config.policy, sheet).await?))
}

#[utoipa::path(
    post,
    path = "/api/worksheets/today/breaks",
    request_body = BreakReq,
    responses(
        (status = 201, description = "Break recorded", body = WorksheetDetail),
        (status = 400, description = "Invalid or outside the work day"),
        (status = 409, description = "Overlaps another break, or worksheet submitted")
    ),
    security(("bearer_auth" = [])),
    tag = "Worksheet"
)]
pub async fn add_break(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<BreakReq>,
) -> AppResult<HttpResponse> {
    let start = parse_clock(&payload.start_time, "start_time")?;
    let end = parse_clock(&payload.end_time, "end_time")?;

    let sheet = open_sheet_for_today(pool.get_ref(), auth.user_id).await?;
    let existing = breaks_of(pool.get_ref(), sheet.id).await?;
    check_break(&config.policy, start, end, &existing)?;

    let reason = payload
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());

    sqlx::query("INSERT INTO worksheet_breaks (worksheet_id, start_time, end_time, reason) VALUES (?, ?, ?, ?)")
        .bind(sheet.id)
        .bind(start)
        .bind(end)
        .bind(reason)
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::Created().json(detail(pool.get_ref(), &config.policy, sheet).await?))
}

#[utoipa::path(
    post,
    path = "/api/worksheets/today/submit",
    responses(
        (status = 200, description = "Worksheet submitted with its final score", body = WorksheetDetail),
        (status = 409, description = "Already submitted")
    ),
    security(("bearer_auth" = [])),
    tag = "Worksheet"
)]
pub async fn submit_worksheet(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let sheet = open_sheet_for_today(pool.get_ref(), auth.user_id).await?;

    let slots = hourly_slots(&config.policy);
    let entries = entries_of(pool.get_ref(), sheet.id).await?;
    let breaks = breaks_of(pool.get_ref(), sheet.id).await?;
    let score = score_of(&slots, &entries, &breaks);

    let result = sqlx::query(
        "UPDATE worksheets SET submitted = TRUE, productivity_score = ? WHERE id = ? AND submitted = FALSE",
    )
    .bind(score)
    .bind(sheet.id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::conflict("Worksheet already submitted"));
    }

    info!(user_id = auth.user_id, worksheet_id = sheet.id, score, "Worksheet submitted");

    let sheet = Worksheet {
        submitted: true,
        productivity_score: Some(score),
        ..sheet
    };
    Ok(HttpResponse::Ok().json(detail(pool.get_ref(), &config.policy, sheet).await?))
}

async fn list_with(pool: &MySqlPool, filters: &Filters, page: Page) -> AppResult<Paginated<Worksheet>> {
    let where_clause = filters.where_clause();

    let total = filters
        .bind_scalar(sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM worksheets{where_clause}"
        )))
        .fetch_one(pool)
        .await?;

    let rows = filters
        .bind_as(sqlx::query_as::<_, Worksheet>(&format!(
            "SELECT {WORKSHEET_COLUMNS} FROM worksheets{where_clause} ORDER BY date DESC, id DESC LIMIT ? OFFSET ?"
        )))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok(Paginated::new(rows, page, total))
}

#[utoipa::path(
    get,
    path = "/api/worksheets/me",
    params(MyWorksheetQuery),
    responses((status = 200, description = "Own worksheet history", body = PaginatedWorksheets)),
    security(("bearer_auth" = [])),
    tag = "Worksheet"
)]
pub async fn my_worksheets(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MyWorksheetQuery>,
) -> AppResult<HttpResponse> {
    let mut filters = Filters::new();
    filters.eq("user_id = ?", auth.user_id);
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::bad_request("from cannot be after to"));
        }
    }
    if let Some(from) = query.from {
        filters.eq("date >= ?", from);
    }
    if let Some(to) = query.to {
        filters.eq("date <= ?", to);
    }

    let page = Page::from_parts(query.page, query.per_page);
    Ok(HttpResponse::Ok().json(list_with(pool.get_ref(), &filters, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/worksheets",
    params(WorksheetQuery),
    responses(
        (status = 200, description = "Worksheets", body = PaginatedWorksheets),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Worksheet"
)]
pub async fn list_worksheets(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<WorksheetQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let mut filters = Filters::new();
    if let Some(user_id) = query.user_id {
        filters.eq("user_id = ?", user_id);
    }
    if let Some(date) = query.date {
        filters.eq("date = ?", date);
    }

    let page = Page::from_parts(query.page, query.per_page);
    Ok(HttpResponse::Ok().json(list_with(pool.get_ref(), &filters, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/worksheets/{worksheet_id}",
    params(("worksheet_id" = u64, Path, description = "Worksheet ID")),
    responses(
        (status = 200, description = "Worksheet detail", body = WorksheetDetail),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Worksheet not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Worksheet"
)]
pub async fn get_worksheet(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let sheet = sqlx::query_as::<_, Worksheet>(&format!(
        "SELECT {WORKSHEET_COLUMNS} FROM worksheets WHERE id = ?"
    ))
    .bind(path.into_inner())
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::not_found("Worksheet not found"))?;

    auth.require_self_or_manager(sheet.user_id)?;

    Ok(HttpResponse::Ok().json(detail(pool.get_ref(), &config.policy, sheet).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn brk(start: NaiveTime, end: NaiveTime) -> WorksheetBreak {
        WorksheetBreak {
            id: 1,
            worksheet_id: 1,
            start_time: start,
            end_time: end,
            reason: None,
        }
    }

    #[test]
    fn slot_index_bounds() {
        let policy = WorkPolicy::default();
        assert_eq!(slot_index(&policy, 0).unwrap(), 0);
        assert_eq!(slot_index(&policy, 8).unwrap(), 8);
        assert!(slot_index(&policy, 9).is_err());
        assert!(slot_index(&policy, 300).is_err());
    }

    #[actix_web::test]
    async fn large_slot_is_bad_request() {
        use crate::auth::jwt::generate_access_token;
        use actix_web::{App, http::StatusCode, test as actix_test};
        use serde_json::json;
        use sqlx::mysql::MySqlPoolOptions;

        let config = Config::for_tests();
        let token = generate_access_token(3, "ann@company.com", 3, &config.jwt_secret, 60).unwrap();
        let pool = MySqlPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(pool))
                .app_data(web::Data::new(config))
                .route("/worksheets/today/entries/{slot}", web::put().to(upsert_entry)),
        )
        .await;

        for slot in [9, 300, 70000] {
            let req = actix_test::TestRequest::put()
                .uri(&format!("/worksheets/today/entries/{slot}"))
                .insert_header(("Authorization", format!("Bearer {token}")))
                .set_json(json!({"description": "Code review", "status": "completed"}))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "slot {slot}");
        }
    }

    #[test]
    fn clock_accepts_minutes_and_seconds() {
        assert_eq!(parse_clock("13:00", "start_time").unwrap(), t(13, 0));
        assert_eq!(parse_clock(" 13:05:00 ", "start_time").unwrap(), t(13, 5));
        assert!(parse_clock("1pm", "start_time").is_err());
    }

    #[test]
    fn break_rules() {
        let policy = WorkPolicy::default();
        let lunch = [brk(t(13, 0), t(13, 30))];

        assert!(check_break(&policy, t(15, 0), t(15, 15), &lunch).is_ok());
        // touching the previous break is fine
        assert!(check_break(&policy, t(13, 30), t(13, 45), &lunch).is_ok());
        assert!(matches!(
            check_break(&policy, t(13, 15), t(13, 45), &lunch),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            check_break(&policy, t(14, 0), t(14, 0), &lunch),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            check_break(&policy, t(8, 0), t(9, 30), &lunch),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn score_ignores_unknown_entry_status() {
        let slots = hourly_slots(&WorkPolicy::default());
        let entries = vec![
            WorksheetEntry {
                id: 1,
                worksheet_id: 1,
                slot: 0,
                task_id: None,
                description: "standup".into(),
                status: "completed".into(),
            },
            WorksheetEntry {
                id: 2,
                worksheet_id: 1,
                slot: 1,
                task_id: None,
                description: "???".into(),
                status: "bogus".into(),
            },
        ];
        // one of nine hours completed
        assert_eq!(score_of(&slots, &entries, &[]), 11.1);
    }
}
