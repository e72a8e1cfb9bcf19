use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::domain::payroll::SlipFigures;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SlipStatus {
    Draft,
    Published,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 11,
    "user_id": 7,
    "period": "2026-01-01",
    "base_salary": 4500000.0,
    "allowance": 300000.0,
    "overtime": 150000.0,
    "bonus": 0.0,
    "deductions": 50000.0,
    "net_salary": 4900000.0,
    "days_present": 22,
    "days_late": 2,
    "days_absent": 1,
    "days_leave": 1,
    "status": "published",
    "created_at": "2026-02-01T08:00:00"
}))]
pub struct PayrollSlip {
    pub id: u64,
    pub user_id: u64,
    pub period: NaiveDate,
    pub base_salary: f64,
    pub allowance: f64,
    pub overtime: f64,
    pub bonus: f64,
    pub deductions: f64,
    pub net_salary: f64,
    pub days_present: i64,
    pub days_late: i64,
    pub days_absent: i64,
    pub days_leave: i64,
    pub status: String,
    pub created_at: NaiveDateTime,
}

pub const SLIP_COLUMNS: &str = "id, user_id, period, base_salary, allowance, overtime, bonus, \
     deductions, net_salary, days_present, days_late, days_absent, days_leave, status, created_at";

impl PayrollSlip {
    pub fn figures(&self) -> SlipFigures {
        SlipFigures {
            base_salary: self.base_salary,
            allowance: self.allowance,
            overtime: self.overtime,
            bonus: self.bonus,
            deductions: self.deductions,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == SlipStatus::Published.as_ref()
    }
}
