use crate::{
    api::report::resolve_range,
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::role::Role,
    services::export::{Cell, ExportFormat, Table, file_name, to_csv, to_xlsx},
};
use actix_web::{
    HttpResponse,
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    web,
};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::IntoParams;

#[derive(Deserialize, IntoParams)]
pub struct AttendanceExportQuery {
    #[param(value_type = Option<String>)]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>)]
    pub to: Option<NaiveDate>,
    /// xlsx (default) or csv
    #[param(inline)]
    #[serde(default)]
    pub format: ExportFormat,
}

#[derive(Deserialize, IntoParams)]
pub struct FormatQuery {
    #[param(inline)]
    #[serde(default)]
    pub format: ExportFormat,
}

#[derive(Deserialize, IntoParams)]
pub struct TaskExportQuery {
    pub project_id: Option<u64>,
    #[param(inline)]
    #[serde(default)]
    pub format: ExportFormat,
}

#[derive(Deserialize, IntoParams)]
pub struct LeaveExportQuery {
    pub year: Option<i32>,
    #[param(inline)]
    #[serde(default)]
    pub format: ExportFormat,
}

fn clock(t: NaiveTime) -> String {
    t.format("%H:%M:%S").to_string()
}

fn stamp(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Encodes `table` off the async executor and wraps it as a download.
async fn download(kind: &'static str, format: ExportFormat, table: Table) -> AppResult<HttpResponse> {
    let rows = table.rows.len();
    let body = web::block(move || -> AppResult<Vec<u8>> {
        Ok(match format {
            ExportFormat::Xlsx => to_xlsx(kind, &table)?,
            ExportFormat::Csv => to_csv(&table)?,
        })
    })
    .await
    .map_err(|e| AppError::Export(e.to_string()))??;

    let filename = file_name(kind, Local::now().date_naive(), format);
    info!(kind, rows, bytes = body.len(), %filename, "Export generated");

    Ok(HttpResponse::Ok()
        .content_type(format.content_type())
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .body(body))
}

#[utoipa::path(
    get,
    path = "/api/exports/attendance",
    params(AttendanceExportQuery),
    responses(
        (status = 200, description = "Attendance sheet", content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        (status = 400, description = "Invalid range"),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Export"
)]
pub async fn export_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceExportQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let (from, to) = resolve_range(query.from, query.to, Local::now().date_naive())?;

    let rows = sqlx::query_as::<
        _,
        (String, String, NaiveDate, NaiveTime, Option<NaiveTime>, Option<u32>, String, Option<String>),
    >(
        r#"
        SELECT u.name, u.email, a.date, a.check_in, a.check_out, a.worked_minutes, a.status, a.note
        FROM attendance a
        JOIN users u ON u.id = a.user_id
        WHERE a.date BETWEEN ? AND ?
        ORDER BY a.date, u.name
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool.get_ref())
    .await?;

    let mut table = Table::new(vec![
        "Employee", "Email", "Date", "Check in", "Check out", "Worked minutes", "Status", "Note",
    ]);
    for (name, email, date, check_in, check_out, worked, status, note) in rows {
        table.push(vec![
            name.into(),
            email.into(),
            date.into(),
            clock(check_in).into(),
            check_out.map(clock).into(),
            worked.into(),
            status.into(),
            note.into(),
        ]);
    }

    download("attendance", query.format, table).await
}

#[utoipa::path(
    get,
    path = "/api/exports/employees",
    params(FormatQuery),
    responses(
        (status = 200, description = "Employee directory", content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Export"
)]
pub async fn export_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<FormatQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let rows = sqlx::query_as::<
        _,
        (u64, String, String, u8, Option<String>, Option<String>, Option<String>, Option<NaiveDate>, String),
    >(
        r#"
        SELECT id, name, email, role_id, department, designation, phone, joining_date, status
        FROM users
        ORDER BY id
        "#,
    )
    .fetch_all(pool.get_ref())
    .await?;

    let mut table = Table::new(vec![
        "ID", "Name", "Email", "Role", "Department", "Designation", "Phone", "Joining date", "Status",
    ]);
    for (id, name, email, role_id, department, designation, phone, joining_date, status) in rows {
        let role = Role::from_id(role_id).map(|r| r.to_string());
        table.push(vec![
            id.into(),
            name.into(),
            email.into(),
            role.into(),
            department.into(),
            designation.into(),
            phone.into(),
            joining_date.into(),
            status.into(),
        ]);
    }

    download("employees", query.format, table).await
}

#[utoipa::path(
    get,
    path = "/api/exports/tasks",
    params(TaskExportQuery),
    responses(
        (status = 200, description = "Task list", content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Export"
)]
pub async fn export_tasks(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TaskExportQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let mut sql = String::from(
        r#"
        SELECT t.id, t.title, p.name, b.name, u.name, t.priority, t.status, t.due_date, t.completed_at
        FROM tasks t
        LEFT JOIN projects p ON p.id = t.project_id
        LEFT JOIN batches b ON b.id = t.batch_id
        LEFT JOIN users u ON u.id = t.assigned_to
        "#,
    );
    if query.project_id.is_some() {
        sql.push_str(" WHERE t.project_id = ?");
    }
    sql.push_str(" ORDER BY t.id");

    let mut rows_query = sqlx::query_as::<
        _,
        (
            u64,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            String,
            String,
            Option<NaiveDate>,
            Option<NaiveDateTime>,
        ),
    >(&sql);
    if let Some(project_id) = query.project_id {
        rows_query = rows_query.bind(project_id);
    }
    let rows = rows_query.fetch_all(pool.get_ref()).await?;

    let mut table = Table::new(vec![
        "ID", "Title", "Project", "Batch", "Assignee", "Priority", "Status", "Due date", "Completed at",
    ]);
    for (id, title, project, batch, assignee, priority, status, due_date, completed_at) in rows {
        table.push(vec![
            id.into(),
            title.into(),
            project.into(),
            batch.into(),
            assignee.into(),
            priority.into(),
            status.into(),
            due_date.into(),
            completed_at.map(stamp).into(),
        ]);
    }

    download("tasks", query.format, table).await
}

#[utoipa::path(
    get,
    path = "/api/exports/leaves",
    params(LeaveExportQuery),
    responses(
        (status = 200, description = "Leave requests of a year", content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Export"
)]
pub async fn export_leaves(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveExportQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let year = query.year.unwrap_or_else(|| Local::now().year());

    let rows = sqlx::query_as::<
        _,
        (String, String, NaiveDate, NaiveDate, u32, String, Option<String>, Option<String>),
    >(
        r#"
        SELECT u.name, l.leave_type, l.start_date, l.end_date, l.days, l.status, l.reason, r.name
        FROM leave_requests l
        JOIN users u ON u.id = l.user_id
        LEFT JOIN users r ON r.id = l.reviewed_by
        WHERE YEAR(l.start_date) = ?
        ORDER BY l.start_date, u.name
        "#,
    )
    .bind(year)
    .fetch_all(pool.get_ref())
    .await?;

    let mut table = Table::new(vec![
        "Employee", "Type", "Start", "End", "Days", "Status", "Reason", "Reviewed by",
    ]);
    for (name, leave_type, start, end, days, status, reason, reviewer) in rows {
        table.push(vec![
            name.into(),
            leave_type.into(),
            start.into(),
            end.into(),
            days.into(),
            status.into(),
            reason.into(),
            reviewer.into(),
        ]);
    }

    download("leaves", query.format, table).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{body::to_bytes, http::header};

    fn one_row() -> Table {
        let mut table = Table::new(vec!["Name", "Days"]);
        table.push(vec![Cell::from("Ann"), Cell::from(3u32)]);
        table
    }

    #[actix_web::test]
    async fn csv_download_has_attachment_headers() {
        let resp = download("leaves", ExportFormat::Csv, one_row()).await.unwrap();
        let headers = resp.headers().clone();

        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            ExportFormat::Csv.content_type()
        );
        let disposition = headers.get(header::CONTENT_DISPOSITION).unwrap().to_str().unwrap();
        let expected = file_name("leaves", Local::now().date_naive(), ExportFormat::Csv);
        assert!(disposition.starts_with("attachment"));
        assert!(disposition.contains(&expected));

        let body = to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(std::str::from_utf8(&body).unwrap(), "Name,Days\nAnn,3\n");
    }

    #[actix_web::test]
    async fn xlsx_download_is_a_zip() {
        let resp = download("tasks", ExportFormat::Xlsx, one_row()).await.unwrap();
        let body = to_bytes(resp.into_body()).await.unwrap();
        // xlsx files are zip archives
        assert_eq!(&body[..2], b"PK");
    }

    #[test]
    fn time_formatting() {
        assert_eq!(clock(NaiveTime::from_hms_opt(9, 5, 0).unwrap()), "09:05:00");
    }
}
