use crate::{
    api::project::ensure_member,
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::task::{TASK_COLUMNS, Task, TaskPriority, TaskStatus},
    services::task::can_transition,
    utils::{
        db_utils::{Filters, SqlValue, build_update_sql, execute_update, patched_date},
        pagination::{Page, Paginated, PaginatedTasks},
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use std::str::FromStr;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

const UPDATABLE_COLUMNS: &[&str] = &[
    "title",
    "description",
    "priority",
    "due_date",
    "assigned_to",
    "project_id",
];

/// Tasks an employee may see: own assignments and tasks of their batches.
const VISIBLE_TO_EMPLOYEE: &str =
    "(assigned_to = ? OR batch_id IN (SELECT batch_id FROM batch_members WHERE user_id = ?))";

#[derive(Deserialize, ToSchema)]
pub struct CreateTask {
    #[schema(example = "Prepare onboarding deck")]
    pub title: String,
    pub description: Option<String>,
    pub project_id: Option<u64>,
    pub assigned_to: Option<u64>,
    pub priority: Option<TaskPriority>,
    #[schema(value_type = Option<String>, format = "date", example = "2026-02-01")]
    pub due_date: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
pub struct TaskQuery {
    pub project_id: Option<u64>,
    pub batch_id: Option<u64>,
    pub assigned_to: Option<u64>,
    /// pending, in_progress, completed
    pub status: Option<String>,
    /// low, medium, high
    pub priority: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize, ToSchema)]
pub struct TaskStatusReq {
    pub status: TaskStatus,
}

pub(crate) async fn fetch_task(pool: &MySqlPool, task_id: u64) -> AppResult<Task> {
    sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
        .bind(task_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Task not found"))
}

/// Fails unless `user_id` belongs to an active account.
pub(crate) async fn require_active_user(pool: &MySqlPool, user_id: u64) -> AppResult<()> {
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE id = ? AND status = 'active'",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    if found == 0 {
        return Err(AppError::bad_request("assigned_to must be an active user"));
    }
    Ok(())
}

async fn require_project(pool: &MySqlPool, project_id: u64) -> AppResult<()> {
    let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM projects WHERE id = ?")
        .bind(project_id)
        .fetch_one(pool)
        .await?;

    if found == 0 {
        return Err(AppError::bad_request("Project does not exist"));
    }
    Ok(())
}

async fn in_task_batch(pool: &MySqlPool, task: &Task, user_id: u64) -> AppResult<bool> {
    let Some(batch_id) = task.batch_id else {
        return Ok(false);
    };
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM batch_members WHERE batch_id = ? AND user_id = ?",
    )
    .bind(batch_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(found > 0)
}

/// Managers see everything; others their own and their batches' tasks.
async fn can_see(auth: &AuthUser, pool: &MySqlPool, task: &Task) -> AppResult<bool> {
    if auth.is_manager() || task.assigned_to == Some(auth.user_id) {
        return Ok(true);
    }
    in_task_batch(pool, task, auth.user_id).await
}

/// Checks the requested move and returns the new status.
fn next_status(current: &str, requested: TaskStatus) -> AppResult<TaskStatus> {
    let current = TaskStatus::from_str(current)
        .map_err(|_| AppError::Internal(format!("Unknown stored task status '{current}'")))?;

    if current == requested {
        return Err(AppError::bad_request(format!("Task is already {requested}")));
    }
    if !can_transition(current, requested) {
        return Err(AppError::bad_request(format!(
            "Cannot move task from {current} to {requested}"
        )));
    }
    Ok(requested)
}

fn validate_update(payload: &Value) -> AppResult<()> {
    let Some(obj) = payload.as_object() else {
        return Err(AppError::bad_request("Payload must be a JSON object"));
    };

    if let Some(title) = obj.get("title") {
        if title.as_str().map(|s| s.trim().is_empty()).unwrap_or(true) {
            return Err(AppError::bad_request("title must be a non-empty string"));
        }
    }

    if let Some(priority) = obj.get("priority") {
        let valid = priority
            .as_str()
            .map(|s| TaskPriority::from_str(s).is_ok())
            .unwrap_or(false);
        if !valid {
            return Err(AppError::bad_request("priority must be low, medium or high"));
        }
    }

    for key in ["assigned_to", "project_id"] {
        if let Some(v) = obj.get(key) {
            if !(v.is_null() || v.is_u64()) {
                return Err(AppError::bad_request(format!("{key} must be an id or null")));
            }
        }
    }

    patched_date(obj, "due_date")?;

    Ok(())
}

/// Inserts a task row and returns it. Shared with batch tasks.
pub(crate) async fn insert_task(
    pool: &MySqlPool,
    payload: &CreateTask,
    batch_id: Option<u64>,
    assigned_by: u64,
) -> AppResult<Task> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title is required"));
    }

    let priority = payload.priority.unwrap_or(TaskPriority::Medium);
    let result = sqlx::query(
        r#"
        INSERT INTO tasks (title, description, project_id, batch_id, assigned_to, assigned_by, priority, due_date)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(title)
    .bind(payload.description.as_deref())
    .bind(payload.project_id)
    .bind(batch_id)
    .bind(payload.assigned_to)
    .bind(assigned_by)
    .bind(priority.to_string())
    .bind(payload.due_date)
    .execute(pool)
    .await?;

    fetch_task(pool, result.last_insert_id()).await
}

#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = CreateTask,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Task"
)]
pub async fn create_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTask>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    if let Some(assignee) = payload.assigned_to {
        require_active_user(pool.get_ref(), assignee).await?;
    }
    if let Some(project_id) = payload.project_id {
        require_project(pool.get_ref(), project_id).await?;
    }

    let task = insert_task(pool.get_ref(), &payload, None, auth.user_id).await?;

    if let (Some(project_id), Some(assignee)) = (task.project_id, task.assigned_to) {
        ensure_member(pool.get_ref(), project_id, assignee).await?;
    }

    info!(task_id = task.id, assigned_to = ?task.assigned_to, "Task created");
    Ok(HttpResponse::Created().json(task))
}

#[utoipa::path(
    get,
    path = "/api/tasks",
    params(TaskQuery),
    responses((status = 200, description = "Visible tasks", body = PaginatedTasks)),
    security(("bearer_auth" = [])),
    tag = "Task"
)]
pub async fn list_tasks(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TaskQuery>,
) -> AppResult<HttpResponse> {
    let mut filters = Filters::new();

    if !auth.is_manager() {
        filters.raw(
            VISIBLE_TO_EMPLOYEE,
            vec![SqlValue::U64(auth.user_id), SqlValue::U64(auth.user_id)],
        );
    }
    if let Some(project_id) = query.project_id {
        filters.eq("project_id = ?", project_id);
    }
    if let Some(batch_id) = query.batch_id {
        filters.eq("batch_id = ?", batch_id);
    }
    if let Some(assigned_to) = query.assigned_to {
        filters.eq("assigned_to = ?", assigned_to);
    }
    if let Some(status) = query.status.as_deref() {
        let status = TaskStatus::from_str(status).map_err(|_| AppError::bad_request("Unknown task status"))?;
        filters.eq("status = ?", status.to_string());
    }
    if let Some(priority) = query.priority.as_deref() {
        let priority =
            TaskPriority::from_str(priority).map_err(|_| AppError::bad_request("Unknown task priority"))?;
        filters.eq("priority = ?", priority.to_string());
    }

    let page = Page::from_parts(query.page, query.per_page);
    let where_clause = filters.where_clause();

    let total = filters
        .bind_scalar(sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM tasks{where_clause}"
        )))
        .fetch_one(pool.get_ref())
        .await?;

    let rows = filters
        .bind_as(sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks{where_clause} ORDER BY id DESC LIMIT ? OFFSET ?"
        )))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Paginated::new(rows, page, total)))
}

#[utoipa::path(
    get,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task found", body = Task),
        (status = 403, description = "Not visible to caller"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Task"
)]
pub async fn get_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let task = fetch_task(pool.get_ref(), path.into_inner()).await?;

    if !can_see(&auth, pool.get_ref(), &task).await? {
        return Err(AppError::forbidden("Not allowed to access this task"));
    }

    Ok(HttpResponse::Ok().json(task))
}

#[utoipa::path(
    put,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    request_body(content = Object, description = "Any subset of title, description, priority, due_date, assigned_to, project_id"),
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Invalid field or value"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Task"
)]
pub async fn update_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let task_id = path.into_inner();
    fetch_task(pool.get_ref(), task_id).await?;

    validate_update(&body)?;
    if let Some(assignee) = body.get("assigned_to").and_then(Value::as_u64) {
        require_active_user(pool.get_ref(), assignee).await?;
    }
    if let Some(project_id) = body.get("project_id").and_then(Value::as_u64) {
        require_project(pool.get_ref(), project_id).await?;
    }

    let update = build_update_sql("tasks", &body, UPDATABLE_COLUMNS, "id", task_id)?;
    execute_update(pool.get_ref(), update).await?;

    let task = fetch_task(pool.get_ref(), task_id).await?;
    if let (Some(project_id), Some(assignee)) = (task.project_id, task.assigned_to) {
        ensure_member(pool.get_ref(), project_id, assignee).await?;
    }

    info!(task_id, updated_by = auth.user_id, "Task updated");
    Ok(HttpResponse::Ok().json(task))
}

#[utoipa::path(
    put,
    path = "/api/tasks/{task_id}/status",
    params(("task_id" = u64, Path, description = "Task ID")),
    request_body = TaskStatusReq,
    responses(
        (status = 200, description = "Status changed", body = Task),
        (status = 400, description = "Transition not allowed"),
        (status = 403, description = "Not the assignee"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Task"
)]
pub async fn update_task_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<TaskStatusReq>,
) -> AppResult<HttpResponse> {
    let task_id = path.into_inner();
    let task = fetch_task(pool.get_ref(), task_id).await?;

    // batch tasks have no single assignee and are worked on by every member
    let allowed = auth.is_manager()
        || task.assigned_to == Some(auth.user_id)
        || (task.assigned_to.is_none() && in_task_batch(pool.get_ref(), &task, auth.user_id).await?);
    if !allowed {
        warn!(task_id, user_id = auth.user_id, "Status change by non-assignee");
        return Err(AppError::forbidden("Only the assignee can change the status"));
    }

    let next = next_status(&task.status, payload.status)?;

    let sql = if next == TaskStatus::Completed {
        "UPDATE tasks SET status = ?, completed_at = NOW() WHERE id = ? AND status = ?"
    } else {
        "UPDATE tasks SET status = ?, completed_at = NULL WHERE id = ? AND status = ?"
    };
    let result = sqlx::query(sql)
        .bind(next.to_string())
        .bind(task_id)
        .bind(&task.status)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::conflict("Task status changed concurrently, reload and retry"));
    }

    info!(task_id, from = %task.status, to = %next, "Task status changed");
    Ok(HttpResponse::Ok().json(fetch_task(pool.get_ref(), task_id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task deleted"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Task"
)]
pub async fn delete_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let task_id = path.into_inner();

    let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(task_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Task not found"));
    }

    info!(task_id, deleted_by = auth.user_id, "Task deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Task deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_status_is_rejected() {
        let err = next_status("pending", TaskStatus::Pending).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn allowed_and_forbidden_moves() {
        assert_eq!(next_status("pending", TaskStatus::Completed).unwrap(), TaskStatus::Completed);
        assert_eq!(next_status("completed", TaskStatus::InProgress).unwrap(), TaskStatus::InProgress);
        assert!(next_status("completed", TaskStatus::Pending).is_err());
    }

    #[test]
    fn corrupt_stored_status_is_internal() {
        assert!(matches!(next_status("done", TaskStatus::Pending), Err(AppError::Internal(_))));
    }

    #[test]
    fn update_validation() {
        assert!(validate_update(&json!({"priority": "high", "assigned_to": 3})).is_ok());
        assert!(validate_update(&json!({"assigned_to": null})).is_ok());
        assert!(validate_update(&json!({"priority": "urgent"})).is_err());
        assert!(validate_update(&json!({"project_id": "x"})).is_err());
        assert!(validate_update(&json!({"title": " "})).is_err());
        assert!(validate_update(&json!({"due_date": "2026-05-31"})).is_ok());
        assert!(matches!(
            validate_update(&json!({"due_date": "soon"})),
            Err(AppError::BadRequest(_))
        ));
    }
}
