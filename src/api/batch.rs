use crate::{
    api::task::{CreateTask, insert_task},
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::{
        batch::{BATCH_COLUMNS, Batch, LearningMaterial, MaterialKind},
        task::{TASK_COLUMNS, Task, TaskPriority},
        user::{SUMMARY_COLUMNS, UserSummary},
    },
    utils::db_utils::{build_update_sql, execute_update, insert_members, patched_date},
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

const UPDATABLE_COLUMNS: &[&str] = &["name", "description", "start_date", "end_date"];

#[derive(Deserialize, ToSchema)]
pub struct CreateBatch {
    #[schema(example = "Backend Bootcamp 2026")]
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct BatchMembersReq {
    #[schema(example = json!([4, 7, 9]))]
    pub user_ids: Vec<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateMaterial {
    #[schema(example = "Ownership and borrowing")]
    pub title: String,
    #[schema(example = "https://doc.rust-lang.org/book/ch04-00-understanding-ownership.html")]
    pub url: String,
    pub kind: MaterialKind,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateBatchTask {
    #[schema(example = "Build a CLI todo app")]
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    #[schema(value_type = Option<String>, format = "date")]
    pub due_date: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct BatchDetail {
    #[serde(flatten)]
    pub batch: Batch,
    pub members: Vec<UserSummary>,
    pub materials: Vec<LearningMaterial>,
    pub tasks: Vec<Task>,
}

fn check_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> AppResult<()> {
    match (start, end) {
        (Some(s), Some(e)) if e < s => Err(AppError::bad_request("end_date cannot be before start_date")),
        _ => Ok(()),
    }
}

fn check_url(url: &str) -> AppResult<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| AppError::bad_request("url must start with http:// or https://"))?;
    if rest.is_empty() {
        return Err(AppError::bad_request("url has no host"));
    }
    Ok(())
}

fn validate_update(current: &Batch, payload: &Value) -> AppResult<()> {
    let Some(obj) = payload.as_object() else {
        return Err(AppError::bad_request("Payload must be a JSON object"));
    };
    if let Some(name) = obj.get("name") {
        if name.as_str().map(|s| s.trim().is_empty()).unwrap_or(true) {
            return Err(AppError::bad_request("name must be a non-empty string"));
        }
    }
    let start = patched_date(obj, "start_date")?.unwrap_or(current.start_date);
    let end = patched_date(obj, "end_date")?.unwrap_or(current.end_date);
    check_range(start, end)
}

async fn fetch_batch(pool: &MySqlPool, batch_id: u64) -> AppResult<Batch> {
    sqlx::query_as::<_, Batch>(&format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?"))
        .bind(batch_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Batch not found"))
}

async fn is_member(pool: &MySqlPool, batch_id: u64, user_id: u64) -> AppResult<bool> {
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM batch_members WHERE batch_id = ? AND user_id = ?",
    )
    .bind(batch_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(found > 0)
}

#[utoipa::path(
    post,
    path = "/api/batches",
    request_body = CreateBatch,
    responses(
        (status = 201, description = "Batch created", body = Batch),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Batch name already used")
    ),
    security(("bearer_auth" = [])),
    tag = "Batch"
)]
pub async fn create_batch(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateBatch>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name is required"));
    }
    check_range(payload.start_date, payload.end_date)?;

    // unique name; duplicate key maps to 409
    let result = sqlx::query(
        "INSERT INTO batches (name, description, start_date, end_date, created_by) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(payload.description.as_deref())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await?;

    let batch = fetch_batch(pool.get_ref(), result.last_insert_id()).await?;
    info!(batch_id = batch.id, name = %batch.name, "Batch created");

    Ok(HttpResponse::Created().json(batch))
}

#[utoipa::path(
    get,
    path = "/api/batches",
    responses((status = 200, description = "Visible batches", body = [Batch])),
    security(("bearer_auth" = [])),
    tag = "Batch"
)]
pub async fn list_batches(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let rows = if auth.is_manager() {
        sqlx::query_as::<_, Batch>(&format!("SELECT {BATCH_COLUMNS} FROM batches ORDER BY id DESC"))
            .fetch_all(pool.get_ref())
            .await?
    } else {
        sqlx::query_as::<_, Batch>(&format!(
            r#"
            SELECT {BATCH_COLUMNS}
            FROM batches
            WHERE id IN (SELECT batch_id FROM batch_members WHERE user_id = ?)
            ORDER BY id DESC
            "#
        ))
        .bind(auth.user_id)
        .fetch_all(pool.get_ref())
        .await?
    };

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/batches/{batch_id}",
    params(("batch_id" = u64, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Batch with members, materials and tasks", body = BatchDetail),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Batch not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Batch"
)]
pub async fn get_batch(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let batch_id = path.into_inner();
    let batch = fetch_batch(pool.get_ref(), batch_id).await?;

    if !auth.is_manager() && !is_member(pool.get_ref(), batch_id, auth.user_id).await? {
        return Err(AppError::forbidden("You are not a member of this batch"));
    }

    let members = sqlx::query_as::<_, UserSummary>(&format!(
        r#"
        SELECT {SUMMARY_COLUMNS}
        FROM batch_members bm
        JOIN users u ON u.id = bm.user_id
        WHERE bm.batch_id = ?
        ORDER BY u.name
        "#
    ))
    .bind(batch_id)
    .fetch_all(pool.get_ref())
    .await?;

    let materials = sqlx::query_as::<_, LearningMaterial>(
        "SELECT id, batch_id, title, url, kind, created_at FROM learning_materials WHERE batch_id = ? ORDER BY id",
    )
    .bind(batch_id)
    .fetch_all(pool.get_ref())
    .await?;

    let tasks = sqlx::query_as::<_, Task>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE batch_id = ? ORDER BY id DESC"
    ))
    .bind(batch_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(BatchDetail {
        batch,
        members,
        materials,
        tasks,
    }))
}

#[utoipa::path(
    put,
    path = "/api/batches/{batch_id}",
    params(("batch_id" = u64, Path, description = "Batch ID")),
    request_body(content = Object, description = "Any subset of name, description, start_date, end_date"),
    responses(
        (status = 200, description = "Batch updated", body = Batch),
        (status = 400, description = "Invalid field or value"),
        (status = 409, description = "Batch name already used")
    ),
    security(("bearer_auth" = [])),
    tag = "Batch"
)]
pub async fn update_batch(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let batch_id = path.into_inner();
    let current = fetch_batch(pool.get_ref(), batch_id).await?;

    validate_update(&current, &body)?;
    let update = build_update_sql("batches", &body, UPDATABLE_COLUMNS, "id", batch_id)?;
    execute_update(pool.get_ref(), update).await?;

    Ok(HttpResponse::Ok().json(fetch_batch(pool.get_ref(), batch_id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/batches/{batch_id}",
    params(("batch_id" = u64, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Batch deleted"),
        (status = 404, description = "Batch not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Batch"
)]
pub async fn delete_batch(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let batch_id = path.into_inner();

    let result = sqlx::query("DELETE FROM batches WHERE id = ?")
        .bind(batch_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Batch not found"));
    }

    info!(batch_id, deleted_by = auth.user_id, "Batch deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Batch deleted" })))
}

#[utoipa::path(
    post,
    path = "/api/batches/{batch_id}/members",
    params(("batch_id" = u64, Path, description = "Batch ID")),
    request_body = BatchMembersReq,
    responses(
        (status = 200, description = "Members added", body = Object, example = json!({"added": 3})),
        (status = 400, description = "Unknown user"),
        (status = 404, description = "Batch not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Batch"
)]
pub async fn add_batch_members(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<BatchMembersReq>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let batch_id = path.into_inner();
    fetch_batch(pool.get_ref(), batch_id).await?;

    let added = insert_members(pool.get_ref(), "batch_members", "batch_id", batch_id, &payload.user_ids).await?;

    Ok(HttpResponse::Ok().json(json!({ "added": added })))
}

#[utoipa::path(
    delete,
    path = "/api/batches/{batch_id}/members/{user_id}",
    params(
        ("batch_id" = u64, Path, description = "Batch ID"),
        ("user_id" = u64, Path, description = "Member to remove")
    ),
    responses(
        (status = 200, description = "Member removed"),
        (status = 404, description = "Not a member")
    ),
    security(("bearer_auth" = [])),
    tag = "Batch"
)]
pub async fn remove_batch_member(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let (batch_id, user_id) = path.into_inner();

    let result = sqlx::query("DELETE FROM batch_members WHERE batch_id = ? AND user_id = ?")
        .bind(batch_id)
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("User is not a member of this batch"));
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Member removed" })))
}

#[utoipa::path(
    post,
    path = "/api/batches/{batch_id}/materials",
    params(("batch_id" = u64, Path, description = "Batch ID")),
    request_body = CreateMaterial,
    responses(
        (status = 201, description = "Material added", body = LearningMaterial),
        (status = 400, description = "Invalid url or title"),
        (status = 404, description = "Batch not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Batch"
)]
pub async fn add_material(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<CreateMaterial>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let batch_id = path.into_inner();

    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title is required"));
    }
    let url = payload.url.trim();
    check_url(url)?;
    fetch_batch(pool.get_ref(), batch_id).await?;

    let result = sqlx::query("INSERT INTO learning_materials (batch_id, title, url, kind) VALUES (?, ?, ?, ?)")
        .bind(batch_id)
        .bind(title)
        .bind(url)
        .bind(payload.kind.to_string())
        .execute(pool.get_ref())
        .await?;

    let material = sqlx::query_as::<_, LearningMaterial>(
        "SELECT id, batch_id, title, url, kind, created_at FROM learning_materials WHERE id = ?",
    )
    .bind(result.last_insert_id())
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Created().json(material))
}

#[utoipa::path(
    delete,
    path = "/api/batches/{batch_id}/materials/{material_id}",
    params(
        ("batch_id" = u64, Path, description = "Batch ID"),
        ("material_id" = u64, Path, description = "Material ID")
    ),
    responses(
        (status = 200, description = "Material removed"),
        (status = 404, description = "Material not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Batch"
)]
pub async fn delete_material(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let (batch_id, material_id) = path.into_inner();

    let result = sqlx::query("DELETE FROM learning_materials WHERE id = ? AND batch_id = ?")
        .bind(material_id)
        .bind(batch_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Material not found"));
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Material removed" })))
}

/// Creates a task shared by every member of the batch
#[utoipa::path(
    post,
    path = "/api/batches/{batch_id}/tasks",
    params(("batch_id" = u64, Path, description = "Batch ID")),
    request_body = CreateBatchTask,
    responses(
        (status = 201, description = "Batch task created", body = Task),
        (status = 404, description = "Batch not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Batch"
)]
pub async fn create_batch_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<CreateBatchTask>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let batch_id = path.into_inner();
    fetch_batch(pool.get_ref(), batch_id).await?;

    let payload = payload.into_inner();
    let task = CreateTask {
        title: payload.title,
        description: payload.description,
        project_id: None,
        assigned_to: None,
        priority: payload.priority,
        due_date: payload.due_date,
    };
    let task = insert_task(pool.get_ref(), &task, Some(batch_id), auth.user_id).await?;

    info!(batch_id, task_id = task.id, "Batch task created");
    Ok(HttpResponse::Created().json(task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_url_needs_http_scheme() {
        assert!(check_url("https://example.com/video").is_ok());
        assert!(check_url("http://intranet/doc.pdf").is_ok());
        assert!(check_url("ftp://example.com").is_err());
        assert!(check_url("example.com").is_err());
        assert!(check_url("https://").is_err());
    }

    #[test]
    fn batch_range() {
        let d = |m, day| NaiveDate::from_ymd_opt(2026, m, day);
        assert!(check_range(d(1, 10), d(1, 1)).is_err());
        assert!(check_range(d(1, 1), d(3, 1)).is_ok());
        assert!(check_range(None, d(3, 1)).is_ok());
    }

    #[test]
    fn update_checks_name_and_merged_dates() {
        let current = Batch {
            id: 1,
            name: "Cohort A".into(),
            description: None,
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1),
            end_date: None,
            created_by: 1,
            created_at: chrono::Utc::now(),
        };
        assert!(validate_update(&current, &json!({"name": ""})).is_err());
        assert!(validate_update(&current, &json!({"description": "x"})).is_ok());
        assert!(validate_update(&current, &json!({"end_date": "2026-02-01"})).is_err());
        assert!(validate_update(&current, &json!({"end_date": "2026-05-01"})).is_ok());
    }
}
