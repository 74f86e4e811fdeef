use crate::{
    auth::{
        auth::AuthUser,
        handlers::{NewAccount, fetch_profile, insert_user},
    },
    error::{AppError, AppResult},
    model::{
        role::Role,
        user::{PROFILE_COLUMNS, UserProfile, UserStatus},
    },
    utils::{
        db_utils::{build_update_sql, execute_update, patched_date},
        email_cache, email_filter,
        pagination::{Page, Paginated, PaginatedUsers},
    },
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use std::str::FromStr;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

/// Columns an admin may change through `PUT /employees/{id}`.
const UPDATABLE_COLUMNS: &[&str] = &[
    "name",
    "department",
    "designation",
    "phone",
    "joining_date",
    "status",
    "role_id",
];

#[derive(Deserialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "John Doe")]
    pub name: String,
    #[schema(example = "john@company.com", format = "email")]
    pub email: String,
    #[schema(example = "initial-pass")]
    pub password: String,
    #[schema(example = "employee")]
    pub role: Option<Role>,
    #[schema(example = "Sales")]
    pub department: Option<String>,
    #[schema(example = "Account Manager")]
    pub designation: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmployeeQuery {
    /// Page number (starts at 1)
    pub page: Option<u32>,
    /// Items per page (max 100)
    pub per_page: Option<u32>,
    /// Exact department name
    pub department: Option<String>,
    /// `admin`, `hr` or `employee`
    pub role: Option<String>,
    /// `active` or `inactive`
    pub status: Option<String>,
    /// Substring of name or email
    pub search: Option<String>,
}

/// Checks the values of an update payload that the builder cannot know about.
fn validate_update(payload: &Value) -> AppResult<()> {
    let Some(obj) = payload.as_object() else {
        return Err(AppError::bad_request("Payload must be a JSON object"));
    };

    if let Some(role) = obj.get("role_id") {
        let valid = role
            .as_u64()
            .and_then(|id| u8::try_from(id).ok())
            .and_then(Role::from_id)
            .is_some();
        if !valid {
            return Err(AppError::bad_request("role_id must be 1 (admin), 2 (hr) or 3 (employee)"));
        }
    }

    if let Some(status) = obj.get("status") {
        let valid = status
            .as_str()
            .map(|s| UserStatus::from_str(s).is_ok())
            .unwrap_or(false);
        if !valid {
            return Err(AppError::bad_request("status must be active or inactive"));
        }
    }

    if let Some(name) = obj.get("name") {
        if name.as_str().map(|s| s.trim().is_empty()).unwrap_or(true) {
            return Err(AppError::bad_request("name must be a non-empty string"));
        }
    }

    patched_date(obj, "joining_date")?;

    Ok(())
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created successfully", body = Object, example = json!({
            "message": "Employee created", "id": 31
        })),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Email already registered")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployee>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let payload = payload.into_inner();

    let account = NewAccount::validate(
        &payload.name,
        &payload.email,
        &payload.password,
        payload.role.unwrap_or(Role::Employee),
        payload.department,
        payload.designation,
        payload.phone,
    )?;

    let id = insert_user(&account, pool.get_ref()).await?;
    info!(user_id = id, created_by = auth.user_id, "Employee created");

    Ok(HttpResponse::Created().json(json!({
        "message": "Employee created",
        "id": id
    })))
}

#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = PaginatedUsers),
        (status = 403, description = "HR/Admin only")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let page = Page::from_parts(query.page, query.per_page);

    // ---------- build WHERE clause dynamically ----------
    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(department) = &query.department {
        conditions.push("department = ?");
        bindings.push(department.clone());
    }

    if let Some(role) = &query.role {
        let role = Role::from_str(role).map_err(|_| AppError::bad_request("Unknown role"))?;
        conditions.push("role_id = ?");
        bindings.push(role.id().to_string());
    }

    if let Some(status) = &query.status {
        let status =
            UserStatus::from_str(status).map_err(|_| AppError::bad_request("Unknown status"))?;
        conditions.push("status = ?");
        bindings.push(status.to_string());
    }

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push("(name LIKE ? OR email LIKE ?)");
        let like = format!("%{}%", search);
        bindings.push(like.clone());
        bindings.push(like);
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    // ---------- total count ----------
    let count_sql = format!("SELECT COUNT(*) FROM users {}", where_clause);
    debug!(sql = %count_sql, bindings = ?bindings, "Counting employees");

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for b in &bindings {
        count_query = count_query.bind(b);
    }
    let total = count_query.fetch_one(pool.get_ref()).await?;

    // ---------- data query ----------
    let data_sql = format!(
        "SELECT {PROFILE_COLUMNS} FROM users {} ORDER BY id DESC LIMIT ? OFFSET ?",
        where_clause
    );

    let mut data_query = sqlx::query_as::<_, UserProfile>(&data_sql);
    for b in &bindings {
        data_query = data_query.bind(b);
    }
    let employees = data_query
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Paginated::new(employees, page, total)))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = UserProfile),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let employee_id = path.into_inner();
    auth.require_self_or_manager(employee_id)?;

    let profile = fetch_profile(pool.get_ref(), employee_id).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    request_body(content = Object, description = "Any subset of name, department, designation, phone, joining_date, status, role_id"),
    responses(
        (status = 200, description = "Employee updated successfully"),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let employee_id = path.into_inner();

    validate_update(&body)?;
    let update = build_update_sql("users", &body, UPDATABLE_COLUMNS, "id", employee_id)?;

    let affected = execute_update(pool.get_ref(), update).await?;
    if affected == 0 {
        // MySQL reports 0 for unchanged rows too, so confirm existence
        fetch_profile(pool.get_ref(), employee_id).await?;
    }

    info!(employee_id, updated_by = auth.user_id, "Employee updated");
    Ok(HttpResponse::Ok().json(json!({ "message": "Employee updated successfully" })))
}

/// Delete Employee
#[utoipa::path(
    delete,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 400, description = "Cannot delete own account"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let employee_id = path.into_inner();

    if employee_id == auth.user_id {
        return Err(AppError::bad_request("You cannot delete your own account"));
    }

    let profile = fetch_profile(pool.get_ref(), employee_id).await?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(employee_id)
        .execute(pool.get_ref())
        .await?;

    email_filter::remove(&profile.email);
    email_cache::forget(&profile.email).await;

    info!(employee_id, deleted_by = auth.user_id, "Employee deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_validation_checks_role_and_status() {
        assert!(validate_update(&json!({"role_id": 2, "status": "inactive"})).is_ok());
        assert!(validate_update(&json!({"role_id": 9})).is_err());
        assert!(validate_update(&json!({"role_id": "admin"})).is_err());
        assert!(validate_update(&json!({"status": "fired"})).is_err());
        assert!(validate_update(&json!({"name": "   "})).is_err());
        assert!(validate_update(&json!("not an object")).is_err());
        assert!(validate_update(&json!({"joining_date": "2026-02-01"})).is_ok());
        assert!(validate_update(&json!({"joining_date": null})).is_ok());
        assert!(matches!(
            validate_update(&json!({"joining_date": "soon"})),
            Err(AppError::BadRequest(_))
        ));
    }
}
