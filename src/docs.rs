use crate::api::{
    attendance::CheckInReq,
    batch::{BatchDetail, BatchMembersReq, CreateBatch, CreateBatchTask, CreateMaterial},
    chat::{Contact, SendMessageReq},
    employee::CreateEmployee,
    leave_request::{CreateLeave, ReviewLeave},
    project::{CreateProject, MembersReq, ProjectDetail},
    report::{Dashboard, MyReport},
    task::{CreateTask, TaskStatusReq},
    worksheet::{BreakReq, EntryReq, SlotView, WorksheetDetail},
};
use crate::model::{
    attendance::{Attendance, AttendanceStatus},
    batch::{Batch, LearningMaterial, MaterialKind},
    leave_request::{LeaveRequest, LeaveStatus, LeaveType},
    message::Message,
    project::{Project, ProjectStatus},
    role::Role,
    task::{Task, TaskPriority, TaskStatus},
    user::{UserProfile, UserStatus, UserSummary},
    worksheet::{EntryStatus, Worksheet, WorksheetBreak, WorksheetEntry},
};
use crate::models::{ChangePasswordReq, LoginReqDto, LoginResponse, RegisterReq, TokenPair};
use crate::services::{
    export::ExportFormat,
    leave::LeaveBalance,
    reports::{AttendanceSummary, AttendanceTrendPoint, LeaveTypeSummary, TaskSummary},
};
use crate::utils::pagination::{
    PaginatedAttendance, PaginatedLeaves, PaginatedMessages, PaginatedProjects, PaginatedTasks,
    PaginatedUsers, PaginatedWorksheets,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Employee Management System API",
        version = "1.0.0",
        description = r#"
## Employee Management System (EMS)

Backend for day-to-day people operations inside an organization.

### 🔹 Key Features
- **Employees**: accounts, roles (admin, hr, employee) and profiles
- **Attendance**: daily check-in/check-out with late and half-day detection
- **Leave**: requests, yearly balances, approval workflow
- **Projects & Tasks**: membership, assignment and status tracking
- **Chat**: one-to-one messages with unread counters
- **Worksheets**: hourly work log with a productivity score
- **Batches**: cohorts with shared tasks and learning materials
- **Reports & Exports**: analytics and Excel/CSV downloads

### 🔐 Security
All `/api` endpoints require a **JWT Bearer** access token obtained from `/auth/login`.
HR and Admin roles unlock management operations.

### 📦 Response Format
- JSON responses; errors are `{"message": "..."}`
- List endpoints return `{data, page, per_page, total}`
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,
        crate::auth::handlers::change_password,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::today,
        crate::api::attendance::my_attendance,
        crate::api::attendance::list_attendance,

        crate::api::leave_request::create_leave,
        crate::api::leave_request::my_leaves,
        crate::api::leave_request::leave_balance,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::cancel_leave,

        crate::api::project::create_project,
        crate::api::project::list_projects,
        crate::api::project::get_project,
        crate::api::project::update_project,
        crate::api::project::delete_project,
        crate::api::project::add_project_members,
        crate::api::project::remove_project_member,

        crate::api::task::create_task,
        crate::api::task::list_tasks,
        crate::api::task::get_task,
        crate::api::task::update_task,
        crate::api::task::update_task_status,
        crate::api::task::delete_task,

        crate::api::chat::send_message,
        crate::api::chat::conversation,
        crate::api::chat::contacts,
        crate::api::chat::unread_count,

        crate::api::worksheet::today_worksheet,
        crate::api::worksheet::upsert_entry,
        crate::api::worksheet::add_break,
        crate::api::worksheet::submit_worksheet,
        crate::api::worksheet::my_worksheets,
        crate::api::worksheet::list_worksheets,
        crate::api::worksheet::get_worksheet,

        crate::api::batch::create_batch,
        crate::api::batch::list_batches,
        crate::api::batch::get_batch,
        crate::api::batch::update_batch,
        crate::api::batch::delete_batch,
        crate::api::batch::add_batch_members,
        crate::api::batch::remove_batch_member,
        crate::api::batch::add_material,
        crate::api::batch::delete_material,
        crate::api::batch::create_batch_task,

        crate::api::report::dashboard,
        crate::api::report::attendance_report,
        crate::api::report::attendance_trend_report,
        crate::api::report::leave_report,
        crate::api::report::task_report,
        crate::api::report::my_report,

        crate::api::export::export_attendance,
        crate::api::export::export_employees,
        crate::api::export::export_tasks,
        crate::api::export::export_leaves
    ),
    components(
        schemas(
            RegisterReq,
            LoginReqDto,
            LoginResponse,
            TokenPair,
            ChangePasswordReq,
            Role,
            UserStatus,
            UserProfile,
            UserSummary,
            PaginatedUsers,
            CreateEmployee,
            CheckInReq,
            Attendance,
            AttendanceStatus,
            PaginatedAttendance,
            CreateLeave,
            ReviewLeave,
            LeaveType,
            LeaveStatus,
            LeaveRequest,
            LeaveBalance,
            PaginatedLeaves,
            CreateProject,
            MembersReq,
            Project,
            ProjectStatus,
            ProjectDetail,
            PaginatedProjects,
            CreateTask,
            TaskStatusReq,
            Task,
            TaskPriority,
            TaskStatus,
            PaginatedTasks,
            SendMessageReq,
            Message,
            Contact,
            PaginatedMessages,
            EntryReq,
            BreakReq,
            EntryStatus,
            Worksheet,
            WorksheetEntry,
            WorksheetBreak,
            SlotView,
            WorksheetDetail,
            PaginatedWorksheets,
            CreateBatch,
            BatchMembersReq,
            CreateMaterial,
            CreateBatchTask,
            Batch,
            BatchDetail,
            LearningMaterial,
            MaterialKind,
            Dashboard,
            MyReport,
            AttendanceSummary,
            AttendanceTrendPoint,
            LeaveTypeSummary,
            TaskSummary,
            ExportFormat
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Registration, login and token rotation"),
        (name = "Employee", description = "Employee account management"),
        (name = "Attendance", description = "Check-in/check-out and history"),
        (name = "Leave", description = "Leave requests, balances and approval"),
        (name = "Project", description = "Projects and their members"),
        (name = "Task", description = "Task assignment and status"),
        (name = "Chat", description = "One-to-one messaging"),
        (name = "Worksheet", description = "Hourly work log and productivity score"),
        (name = "Batch", description = "Cohorts, learning materials and shared tasks"),
        (name = "Report", description = "Analytics"),
        (name = "Export", description = "Excel/CSV downloads"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by `security(...)` on paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_every_module() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        for path in [
            "/auth/login",
            "/api/employees",
            "/api/attendance/check-in",
            "/api/leaves/{leave_id}/approve",
            "/api/projects/{project_id}/members",
            "/api/tasks/{task_id}/status",
            "/api/chat/contacts",
            "/api/worksheets/today/submit",
            "/api/batches/{batch_id}/materials",
            "/api/reports/dashboard",
            "/api/exports/leaves",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
