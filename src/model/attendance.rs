use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    HalfDay,
    Absent,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 11,
    "user_id": 7,
    "date": "2026-03-02",
    "check_in": "09:05:12",
    "check_out": "17:58:40",
    "worked_minutes": 533,
    "status": "present",
    "note": null
}))]
pub struct Attendance {
    pub id: u64,
    pub user_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = String)]
    pub check_in: NaiveTime,
    #[schema(value_type = Option<String>)]
    pub check_out: Option<NaiveTime>,
    pub worked_minutes: Option<u32>,
    pub status: String,
    pub note: Option<String>,
}

pub const ATTENDANCE_COLUMNS: &str =
    "id, user_id, date, check_in, check_out, worked_minutes, status, note";
