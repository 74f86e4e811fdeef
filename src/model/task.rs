use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 42,
    "title": "Prepare onboarding deck",
    "description": null,
    "project_id": 3,
    "batch_id": null,
    "assigned_to": 7,
    "assigned_by": 1,
    "priority": "high",
    "status": "in_progress",
    "due_date": "2026-02-01",
    "completed_at": null,
    "created_at": "2026-01-10T09:00:00Z"
}))]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub project_id: Option<u64>,
    pub batch_id: Option<u64>,
    pub assigned_to: Option<u64>,
    pub assigned_by: u64,
    pub priority: String,
    pub status: String,
    #[schema(value_type = Option<String>, format = "date")]
    pub due_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub completed_at: Option<NaiveDateTime>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

pub const TASK_COLUMNS: &str = "id, title, description, project_id, batch_id, assigned_to, assigned_by, \
     priority, status, due_date, completed_at, created_at";
