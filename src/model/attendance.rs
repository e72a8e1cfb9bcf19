use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Status persisted on the attendance row.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    /// Checked in on time.
    Masuk,
    /// Checked in after the shift's late tolerance.
    Terlambat,
    /// Checked out.
    Pulang,
    /// Scheduled but never checked in.
    Mangkir,
    /// Amended by an approved correction.
    Koreksi,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecord {
    pub id: u64,
    pub user_id: u64,
    pub date: NaiveDate,
    pub shift_id: Option<u64>,
    pub check_in_at: Option<NaiveDateTime>,
    pub check_in_photo: Option<String>,
    pub check_in_lat: Option<f64>,
    pub check_in_lon: Option<f64>,
    pub check_in_outlet_id: Option<u64>,
    pub check_out_at: Option<NaiveDateTime>,
    pub check_out_photo: Option<String>,
    pub check_out_lat: Option<f64>,
    pub check_out_lon: Option<f64>,
    pub check_out_outlet_id: Option<u64>,
    pub note: Option<String>,
    pub status: String,
    pub late_minutes: i64,
    pub corrected: bool,
}

pub const ATTENDANCE_COLUMNS: &str = "id, user_id, date, shift_id, check_in_at, check_in_photo, \
     check_in_lat, check_in_lon, check_in_outlet_id, check_out_at, check_out_photo, check_out_lat, \
     check_out_lon, check_out_outlet_id, note, status, late_minutes, corrected";

impl AttendanceRecord {
    pub fn marked_absent(&self) -> bool {
        self.status == AttendanceStatus::Mangkir.as_ref()
    }
}
