use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeaveType {
    Annual,
    Sick,
    Unpaid,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "user_id": 7,
    "start_date": "2026-01-05",
    "end_date": "2026-01-07",
    "leave_type": "annual",
    "reason": "Family event",
    "status": "pending",
    "reviewer_id": null,
    "review_note": null,
    "reviewed_at": null,
    "created_at": "2026-01-01T09:00:00"
}))]
pub struct LeaveRequest {
    pub id: u64,
    pub user_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: String,
    pub reason: Option<String>,
    pub status: String,
    pub reviewer_id: Option<u64>,
    pub review_note: Option<String>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

pub const LEAVE_COLUMNS: &str = "id, user_id, start_date, end_date, leave_type, reason, status, \
     reviewer_id, review_note, reviewed_at, created_at";
