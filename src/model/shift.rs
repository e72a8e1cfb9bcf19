use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::attendance::ShiftWindow;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "name": "Pagi",
    "start_time": "08:00:00",
    "end_time": "16:00:00",
    "late_tolerance_minutes": 10,
    "is_active": true
}))]
pub struct Shift {
    pub id: u64,
    pub name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub late_tolerance_minutes: i32,
    pub is_active: bool,
}

impl Shift {
    pub fn window(&self) -> ShiftWindow {
        ShiftWindow {
            start: self.start_time,
            end: self.end_time,
            late_tolerance_minutes: i64::from(self.late_tolerance_minutes),
        }
    }
}

/// One row of the roster: which shift a user works on a date, or an off day.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Schedule {
    pub id: u64,
    pub user_id: u64,
    pub date: NaiveDate,
    pub shift_id: Option<u64>,
    pub is_off: bool,
}
