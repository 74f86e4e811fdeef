use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntryStatus {
    Completed,
    InProgress,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Worksheet {
    pub id: u64,
    pub user_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub submitted: bool,
    pub productivity_score: Option<f64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct WorksheetEntry {
    pub id: u64,
    pub worksheet_id: u64,
    pub slot: u8,
    pub task_id: Option<u64>,
    pub description: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct WorksheetBreak {
    pub id: u64,
    pub worksheet_id: u64,
    #[schema(value_type = String)]
    pub start_time: NaiveTime,
    #[schema(value_type = String)]
    pub end_time: NaiveTime,
    pub reason: Option<String>,
}

pub const WORKSHEET_COLUMNS: &str = "id, user_id, date, submitted, productivity_score, created_at";
