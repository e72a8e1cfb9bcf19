use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ShiftChangeRequest {
    pub id: u64,
    pub requester_id: u64,
    pub target_id: u64,
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub status: String,
    pub reviewer_id: Option<u64>,
    pub review_note: Option<String>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

pub const SHIFT_CHANGE_COLUMNS: &str = "id, requester_id, target_id, date, reason, status, \
     reviewer_id, review_note, reviewed_at, created_at";
