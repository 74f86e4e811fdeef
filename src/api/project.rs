use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::{
        project::{PROJECT_COLUMNS, Project, ProjectStatus},
        user::{SUMMARY_COLUMNS, UserSummary},
    },
    services::reports::tasks_by_status,
    utils::{
        db_utils::{Filters, build_update_sql, execute_update, insert_members, patched_date},
        pagination::{Page, Paginated, PaginatedProjects},
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const UPDATABLE_COLUMNS: &[&str] = &["name", "description", "status", "start_date", "deadline"];

#[derive(Deserialize, ToSchema)]
pub struct CreateProject {
    #[schema(example = "Website redesign")]
    pub name: String,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    #[schema(value_type = Option<String>, format = "date", example = "2026-02-01")]
    pub start_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date", example = "2026-06-30")]
    pub deadline: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
pub struct ProjectQuery {
    /// planned, active, on_hold, completed
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize, ToSchema)]
pub struct MembersReq {
    #[schema(example = json!([4, 7]))]
    pub user_ids: Vec<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub members: Vec<UserSummary>,
    /// Task count per status, e.g. `{"pending": 3, "completed": 1}`
    pub task_counts: BTreeMap<String, i64>,
}

fn check_dates(start: Option<NaiveDate>, deadline: Option<NaiveDate>) -> AppResult<()> {
    match (start, deadline) {
        (Some(start), Some(deadline)) if deadline < start => {
            Err(AppError::bad_request("deadline cannot be before start_date"))
        }
        _ => Ok(()),
    }
}

/// Validates a partial update against the stored project.
fn validate_update(current: &Project, payload: &Value) -> AppResult<()> {
    let Some(obj) = payload.as_object() else {
        return Err(AppError::bad_request("Payload must be a JSON object"));
    };

    if let Some(name) = obj.get("name") {
        if name.as_str().map(|s| s.trim().is_empty()).unwrap_or(true) {
            return Err(AppError::bad_request("name must be a non-empty string"));
        }
    }

    if let Some(status) = obj.get("status") {
        let valid = status
            .as_str()
            .map(|s| ProjectStatus::from_str(s).is_ok())
            .unwrap_or(false);
        if !valid {
            return Err(AppError::bad_request("Unknown project status"));
        }
    }

    let start = patched_date(obj, "start_date")?.unwrap_or(current.start_date);
    let deadline = patched_date(obj, "deadline")?.unwrap_or(current.deadline);
    check_dates(start, deadline)
}

async fn fetch_project(pool: &MySqlPool, project_id: u64) -> AppResult<Project> {
    sqlx::query_as::<_, Project>(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"))
        .bind(project_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Project not found"))
}

async fn is_member(pool: &MySqlPool, project_id: u64, user_id: u64) -> AppResult<bool> {
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM project_members WHERE project_id = ? AND user_id = ?",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(found > 0)
}

/// Adds one user to a project's members if not already there.
pub(crate) async fn ensure_member(pool: &MySqlPool, project_id: u64, user_id: u64) -> AppResult<()> {
    sqlx::query("INSERT IGNORE INTO project_members (project_id, user_id) VALUES (?, ?)")
        .bind(project_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProject,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn create_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateProject>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let payload = payload.into_inner();

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name is required"));
    }
    check_dates(payload.start_date, payload.deadline)?;

    let status = payload.status.unwrap_or(ProjectStatus::Planned);
    let result = sqlx::query(
        r#"
        INSERT INTO projects (name, description, status, start_date, deadline, created_by)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(payload.description)
    .bind(status.to_string())
    .bind(payload.start_date)
    .bind(payload.deadline)
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await?;

    let project = fetch_project(pool.get_ref(), result.last_insert_id()).await?;
    info!(project_id = project.id, created_by = auth.user_id, "Project created");

    Ok(HttpResponse::Created().json(project))
}

#[utoipa::path(
    get,
    path = "/api/projects",
    params(ProjectQuery),
    responses((status = 200, description = "Visible projects", body = PaginatedProjects)),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn list_projects(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ProjectQuery>,
) -> AppResult<HttpResponse> {
    let mut filters = Filters::new();
    if !auth.is_manager() {
        filters.eq(
            "id IN (SELECT project_id FROM project_members WHERE user_id = ?)",
            auth.user_id,
        );
    }
    if let Some(status) = query.status.as_deref() {
        let status =
            ProjectStatus::from_str(status).map_err(|_| AppError::bad_request("Unknown project status"))?;
        filters.eq("status = ?", status.to_string());
    }

    let page = Page::from_parts(query.page, query.per_page);
    let where_clause = filters.where_clause();

    let total = filters
        .bind_scalar(sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM projects{where_clause}"
        )))
        .fetch_one(pool.get_ref())
        .await?;

    let rows = filters
        .bind_as(sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects{where_clause} ORDER BY id DESC LIMIT ? OFFSET ?"
        )))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Paginated::new(rows, page, total)))
}

#[utoipa::path(
    get,
    path = "/api/projects/{project_id}",
    params(("project_id" = u64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project with members and task counts", body = ProjectDetail),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn get_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    let project = fetch_project(pool.get_ref(), project_id).await?;

    if !auth.is_manager() && !is_member(pool.get_ref(), project_id, auth.user_id).await? {
        return Err(AppError::forbidden("You are not a member of this project"));
    }

    let members = sqlx::query_as::<_, UserSummary>(&format!(
        r#"
        SELECT {SUMMARY_COLUMNS}
        FROM project_members pm
        JOIN users u ON u.id = pm.user_id
        WHERE pm.project_id = ?
        ORDER BY u.name
        "#
    ))
    .bind(project_id)
    .fetch_all(pool.get_ref())
    .await?;

    let counts = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM tasks WHERE project_id = ? GROUP BY status",
    )
    .bind(project_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(ProjectDetail {
        project,
        members,
        task_counts: tasks_by_status(&counts),
    }))
}

#[utoipa::path(
    put,
    path = "/api/projects/{project_id}",
    params(("project_id" = u64, Path, description = "Project ID")),
    request_body(content = Object, description = "Any subset of name, description, status, start_date, deadline"),
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 400, description = "Invalid field or value"),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn update_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let project_id = path.into_inner();

    let current = fetch_project(pool.get_ref(), project_id).await?;
    validate_update(&current, &body)?;

    let update = build_update_sql("projects", &body, UPDATABLE_COLUMNS, "id", project_id)?;
    execute_update(pool.get_ref(), update).await?;

    info!(project_id, updated_by = auth.user_id, "Project updated");
    Ok(HttpResponse::Ok().json(fetch_project(pool.get_ref(), project_id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{project_id}",
    params(("project_id" = u64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn delete_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let project_id = path.into_inner();

    let result = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(project_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Project not found"));
    }

    info!(project_id, deleted_by = auth.user_id, "Project deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Project deleted" })))
}

#[utoipa::path(
    post,
    path = "/api/projects/{project_id}/members",
    params(("project_id" = u64, Path, description = "Project ID")),
    request_body = MembersReq,
    responses(
        (status = 200, description = "Members added", body = Object, example = json!({"added": 2})),
        (status = 400, description = "Unknown user"),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn add_project_members(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<MembersReq>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let project_id = path.into_inner();
    fetch_project(pool.get_ref(), project_id).await?;

    let added = insert_members(
        pool.get_ref(),
        "project_members",
        "project_id",
        project_id,
        &payload.user_ids,
    )
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "added": added })))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{project_id}/members/{user_id}",
    params(
        ("project_id" = u64, Path, description = "Project ID"),
        ("user_id" = u64, Path, description = "Member to remove")
    ),
    responses(
        (status = 200, description = "Member removed"),
        (status = 404, description = "Not a member")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn remove_project_member(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let (project_id, user_id) = path.into_inner();

    let result = sqlx::query("DELETE FROM project_members WHERE project_id = ? AND user_id = ?")
        .bind(project_id)
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("User is not a member of this project"));
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Member removed" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn project(start: Option<NaiveDate>, deadline: Option<NaiveDate>) -> Project {
        Project {
            id: 1,
            name: "Apollo".into(),
            description: None,
            status: "planned".into(),
            start_date: start,
            deadline,
            created_by: 1,
            created_at: Utc::now(),
        }
    }

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, day).unwrap()
    }

    #[test]
    fn deadline_cannot_precede_start() {
        assert!(check_dates(Some(d(3, 1)), Some(d(2, 1))).is_err());
        assert!(check_dates(Some(d(3, 1)), Some(d(3, 1))).is_ok());
        assert!(check_dates(None, Some(d(2, 1))).is_ok());
    }

    #[test]
    fn update_is_checked_against_stored_dates() {
        let current = project(Some(d(3, 1)), Some(d(6, 1)));
        assert!(validate_update(&current, &json!({"deadline": "2026-02-01"})).is_err());
        assert!(validate_update(&current, &json!({"deadline": "2026-04-01"})).is_ok());
        assert!(validate_update(&current, &json!({"start_date": null, "deadline": "2026-01-01"})).is_ok());
        assert!(validate_update(&current, &json!({"deadline": "soon"})).is_err());
    }

    #[test]
    fn update_checks_status_and_name() {
        let current = project(None, None);
        assert!(validate_update(&current, &json!({"status": "on_hold"})).is_ok());
        assert!(validate_update(&current, &json!({"status": "paused"})).is_err());
        assert!(validate_update(&current, &json!({"name": ""})).is_err());
    }
}
