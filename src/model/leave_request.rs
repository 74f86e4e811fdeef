use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Annual,
    Sick,
    Casual,
    Unpaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "user_id": 1000,
    "leave_type": "sick",
    "start_date": "2026-01-01",
    "end_date": "2026-01-03",
    "days": 3,
    "reason": "Flu",
    "status": "pending",
    "reviewed_by": null,
    "review_note": null,
    "reviewed_at": null,
    "created_at": "2025-12-30T10:00:00Z"
}))]
pub struct LeaveRequest {
    pub id: u64,
    pub user_id: u64,
    pub leave_type: String,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    pub days: u32,
    pub reason: Option<String>,
    pub status: String,
    pub reviewed_by: Option<u64>,
    pub review_note: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub reviewed_at: Option<NaiveDateTime>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

pub const LEAVE_COLUMNS: &str = "id, user_id, leave_type, start_date, end_date, days, reason, status, \
     reviewed_by, review_note, reviewed_at, created_at";
