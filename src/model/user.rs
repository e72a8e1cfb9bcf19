use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::role::Role;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: u64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub nik: Option<String>,
    pub role_id: u8,
    pub outlet_id: Option<u64>,
    pub supervisor_id: Option<u64>,
    pub base_salary: f64,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// Public view of a user; never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 7,
    "username": "sari",
    "full_name": "Sari Wulandari",
    "nik": "3201010101900001",
    "role": "employee",
    "outlet_id": 2,
    "supervisor_id": 3,
    "is_active": true
}))]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    pub full_name: String,
    pub nik: Option<String>,
    pub role: Option<Role>,
    pub outlet_id: Option<u64>,
    pub supervisor_id: Option<u64>,
    pub is_active: bool,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            full_name: u.full_name,
            nik: u.nik,
            role: Role::from_id(u.role_id),
            outlet_id: u.outlet_id,
            supervisor_id: u.supervisor_id,
            is_active: u.is_active,
        }
    }
}

pub const USER_COLUMNS: &str = "id, username, password_hash, full_name, nik, role_id, outlet_id, \
     supervisor_id, base_salary, is_active, last_login_at, created_at";
