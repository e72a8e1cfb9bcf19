use std::collections::HashSet;

use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::access::{ensure_can_review, ensure_can_view},
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::shift::Shift,
    utils::db_utils::{Column, ColumnKind, build_update_sql, execute_update},
};

const SHIFT_COLUMNS: &str = "id, name, start_time, end_time, late_tolerance_minutes, is_active";
const MAX_SCHEDULE_ENTRIES: usize = 500;
const MAX_SCHEDULE_DAYS: i64 = 93;

const UPDATABLE: &[Column] = &[
    Column::new("name", ColumnKind::Text),
    Column::new("start_time", ColumnKind::Time),
    Column::new("end_time", ColumnKind::Time),
    Column::new("late_tolerance_minutes", ColumnKind::Int),
    Column::new("is_active", ColumnKind::Bool),
];

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "name": "Pagi",
    "start_time": "08:00:00",
    "end_time": "16:00:00",
    "late_tolerance_minutes": 10
}))]
pub struct CreateShift {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[schema(value_type = String, example = "08:00:00")]
    pub start_time: NaiveTime,
    #[schema(value_type = String, example = "16:00:00")]
    pub end_time: NaiveTime,
    #[serde(default)]
    #[validate(range(min = 0, max = 240))]
    pub late_tolerance_minutes: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ScheduleInput {
    pub user_id: u64,
    pub date: NaiveDate,
    /// Required unless `is_off`
    pub shift_id: Option<u64>,
    #[serde(default)]
    pub is_off: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[schema(example = json!({
    "entries": [
        { "user_id": 7, "date": "2026-03-02", "shift_id": 1 },
        { "user_id": 7, "date": "2026-03-03", "is_off": true }
    ]
}))]
pub struct ScheduleUpsert {
    pub entries: Vec<ScheduleInput>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScheduleQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Another user's roster (their supervisor, manager and above)
    pub user_id: Option<u64>,
}

/// A roster day with its shift spelled out.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ScheduleEntry {
    pub user_id: u64,
    pub date: NaiveDate,
    pub is_off: bool,
    pub shift_id: Option<u64>,
    pub shift_name: Option<String>,
    #[schema(value_type = Option<String>)]
    pub start_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>)]
    pub end_time: Option<NaiveTime>,
}

fn check_window(start: NaiveTime, end: NaiveTime) -> ApiResult<()> {
    if start == end {
        return Err(ApiError::validation("Shift start and end cannot be equal"));
    }
    Ok(())
}

/// Shape checks on a bulk upsert that need no database.
fn check_entries(entries: &[ScheduleInput]) -> ApiResult<()> {
    if entries.is_empty() {
        return Err(ApiError::validation("entries cannot be empty"));
    }
    if entries.len() > MAX_SCHEDULE_ENTRIES {
        return Err(ApiError::validation(format!(
            "At most {MAX_SCHEDULE_ENTRIES} entries per request"
        )));
    }

    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert((entry.user_id, entry.date)) {
            return Err(ApiError::validation(format!(
                "Duplicate entry for user {} on {}",
                entry.user_id, entry.date
            )));
        }
        if entry.is_off == entry.shift_id.is_some() {
            return Err(ApiError::validation(format!(
                "Entry for user {} on {} needs exactly one of shift_id or is_off",
                entry.user_id, entry.date
            )));
        }
    }
    Ok(())
}

async fn fetch_shift(pool: &MySqlPool, id: u64) -> ApiResult<Shift> {
    let sql = format!("SELECT {SHIFT_COLUMNS} FROM shifts WHERE id = ?");
    sqlx::query_as::<_, Shift>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Shift not found"))
}

/// Create shift
#[utoipa::path(
    post,
    path = "/api/shifts",
    request_body = CreateShift,
    responses((status = 201, body = Shift), (status = 400)),
    security(("bearer_auth" = [])),
    tag = "Shifts"
)]
#[instrument(skip(pool, payload), fields(admin = auth.user_id))]
pub async fn create_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateShift>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    payload.validate()?;
    check_window(payload.start_time, payload.end_time)?;

    let id = sqlx::query(
        "INSERT INTO shifts (name, start_time, end_time, late_tolerance_minutes) VALUES (?, ?, ?, ?)",
    )
    .bind(payload.name.trim())
    .bind(payload.start_time)
    .bind(payload.end_time)
    .bind(payload.late_tolerance_minutes)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    info!(shift_id = id, "Shift created");
    Ok(HttpResponse::Created().json(fetch_shift(pool.get_ref(), id).await?))
}

/// Active shifts
#[utoipa::path(
    get,
    path = "/api/shifts",
    responses((status = 200, body = [Shift])),
    security(("bearer_auth" = [])),
    tag = "Shifts"
)]
pub async fn list_shifts(pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let sql = format!("SELECT {SHIFT_COLUMNS} FROM shifts WHERE is_active = 1 ORDER BY start_time");
    let shifts = sqlx::query_as::<_, Shift>(&sql)
        .fetch_all(pool.get_ref())
        .await?;
    Ok(HttpResponse::Ok().json(shifts))
}

/// Partial update
#[utoipa::path(
    put,
    path = "/api/shifts/{id}",
    params(("id", Path, description = "Shift ID")),
    request_body(content = Object, example = json!({ "late_tolerance_minutes": 15 })),
    responses((status = 200, body = Shift), (status = 400), (status = 404)),
    security(("bearer_auth" = [])),
    tag = "Shifts"
)]
#[instrument(skip(pool, body), fields(admin = auth.user_id))]
pub async fn update_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let current = fetch_shift(pool.get_ref(), id).await?;
    let update = build_update_sql("shifts", &body, UPDATABLE, "id", id)?;

    let parse = |key: &str, fallback: NaiveTime| -> NaiveTime {
        body.get(key)
            .and_then(Value::as_str)
            .and_then(|raw| {
                NaiveTime::parse_from_str(raw, "%H:%M:%S")
                    .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
                    .ok()
            })
            .unwrap_or(fallback)
    };
    check_window(parse("start_time", current.start_time), parse("end_time", current.end_time))?;
    if body
        .get("late_tolerance_minutes")
        .and_then(Value::as_i64)
        .is_some_and(|m| !(0..=240).contains(&m))
    {
        return Err(ApiError::validation("late_tolerance_minutes must be within 0..=240"));
    }

    execute_update(pool.get_ref(), update).await?;
    info!(shift_id = id, "Shift updated");
    Ok(HttpResponse::Ok().json(fetch_shift(pool.get_ref(), id).await?))
}

/// Deactivate shift
#[utoipa::path(
    delete,
    path = "/api/shifts/{id}",
    params(("id", Path, description = "Shift ID")),
    responses((status = 204, description = "Deactivated"), (status = 404)),
    security(("bearer_auth" = [])),
    tag = "Shifts"
)]
pub async fn delete_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();
    fetch_shift(pool.get_ref(), id).await?;

    sqlx::query("UPDATE shifts SET is_active = 0 WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    info!(shift_id = id, "Shift deactivated");
    Ok(HttpResponse::NoContent().finish())
}

/// Bulk roster upsert
#[utoipa::path(
    put,
    path = "/api/shifts/schedule",
    request_body = ScheduleUpsert,
    responses(
        (status = 200, body = Object, example = json!({ "saved": 2 })),
        (status = 400),
        (status = 403, description = "Not the supervisor of a listed user")
    ),
    security(("bearer_auth" = [])),
    tag = "Shifts"
)]
#[instrument(skip(pool, payload), fields(reviewer = auth.user_id))]
pub async fn upsert_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<ScheduleUpsert>,
) -> ApiResult<HttpResponse> {
    auth.require_reviewer()?;
    let entries = payload.into_inner().entries;
    check_entries(&entries)?;

    let users: HashSet<u64> = entries.iter().map(|e| e.user_id).collect();
    for user_id in &users {
        if *user_id == auth.user_id && !auth.role.is_hr_or_admin() {
            return Err(ApiError::forbidden("You cannot schedule yourself"));
        }
        if *user_id != auth.user_id {
            ensure_can_review(&auth, pool.get_ref(), *user_id).await?;
        }
    }

    let shift_ids: HashSet<u64> = entries.iter().filter_map(|e| e.shift_id).collect();
    for shift_id in shift_ids {
        let shift = fetch_shift(pool.get_ref(), shift_id).await?;
        if !shift.is_active {
            return Err(ApiError::validation(format!("Shift {shift_id} is inactive")));
        }
    }

    let mut tx = pool.begin().await?;
    for entry in &entries {
        sqlx::query(
            r#"
            INSERT INTO shift_schedules (user_id, date, shift_id, is_off)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE shift_id = VALUES(shift_id), is_off = VALUES(is_off)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.date)
        .bind(entry.shift_id)
        .bind(entry.is_off)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    info!(saved = entries.len(), users = users.len(), "Schedule saved");
    Ok(HttpResponse::Ok().json(json!({ "saved": entries.len() })))
}

/// Roster for a date range
#[utoipa::path(
    get,
    path = "/api/shifts/schedule",
    params(ScheduleQuery),
    responses((status = 200, body = [ScheduleEntry]), (status = 403)),
    security(("bearer_auth" = [])),
    tag = "Shifts"
)]
pub async fn get_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ScheduleQuery>,
) -> ApiResult<HttpResponse> {
    if query.to < query.from {
        return Err(ApiError::validation("to must not be before from"));
    }
    if (query.to - query.from).num_days() >= MAX_SCHEDULE_DAYS {
        return Err(ApiError::validation(format!(
            "Range is limited to {MAX_SCHEDULE_DAYS} days"
        )));
    }

    let user_id = query.user_id.unwrap_or(auth.user_id);
    ensure_can_view(&auth, pool.get_ref(), user_id).await?;

    let entries = sqlx::query_as::<_, ScheduleEntry>(
        r#"
        SELECT s.user_id, s.date, s.is_off, s.shift_id,
               sh.name AS shift_name, sh.start_time, sh.end_time
        FROM shift_schedules s
        LEFT JOIN shifts sh ON sh.id = s.shift_id
        WHERE s.user_id = ? AND s.date BETWEEN ? AND ?
        ORDER BY s.date
        "#,
    )
    .bind(user_id)
    .bind(query.from)
    .bind(query.to)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user_id: u64, day: u32, shift_id: Option<u64>, is_off: bool) -> ScheduleInput {
        ScheduleInput {
            user_id,
            date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            shift_id,
            is_off,
        }
    }

    #[test]
    fn entries_need_shift_or_off() {
        assert!(check_entries(&[entry(1, 2, Some(1), false), entry(1, 3, None, true)]).is_ok());
        assert!(check_entries(&[entry(1, 2, None, false)]).is_err());
        assert!(check_entries(&[entry(1, 2, Some(1), true)]).is_err());
    }

    #[test]
    fn duplicate_days_are_rejected() {
        let err = check_entries(&[entry(1, 2, Some(1), false), entry(1, 2, None, true)]).unwrap_err();
        assert!(err.message.contains("Duplicate"));
    }

    #[test]
    fn empty_upsert_is_rejected() {
        assert!(check_entries(&[]).is_err());
    }

    #[test]
    fn zero_length_shift_is_rejected() {
        let eight = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        assert!(check_window(eight, eight).is_err());
        // overnight is fine
        assert!(check_window(NaiveTime::from_hms_opt(22, 0, 0).unwrap(), eight).is_ok());
    }
}
