use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A request to amend one day's attendance punches.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Correction {
    pub id: u64,
    pub user_id: u64,
    pub date: NaiveDate,
    pub check_in_at: Option<NaiveDateTime>,
    pub check_out_at: Option<NaiveDateTime>,
    pub reason: String,
    pub status: String,
    pub reviewer_id: Option<u64>,
    pub review_note: Option<String>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

pub const CORRECTION_COLUMNS: &str = "id, user_id, date, check_in_at, check_out_at, reason, status, \
     reviewer_id, review_note, reviewed_at, created_at";
