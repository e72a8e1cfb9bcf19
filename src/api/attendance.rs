use actix_web::{HttpResponse, web};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::{
        access::{ensure_can_view, team_condition},
        roster::{DayBundle, active_day, load_days},
    },
    auth::auth::AuthUser,
    config::Config,
    domain::{
        attendance::DayStatus,
        geofence::{GeoPoint, locate},
    },
    error::{ApiError, ApiResult, ErrorCode, is_unique_violation},
    model::{
        attendance::{ATTENDANCE_COLUMNS, AttendanceRecord, AttendanceStatus},
        outlet::Outlet,
    },
    utils::{
        db_utils::{SqlValue, to_arguments},
        outlet_cache,
        photo::{self, PhotoFormat},
    },
};

/// Longest range a history query may span.
const MAX_HISTORY_DAYS: i64 = 93;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "date": "2026-03-02",
    "has_checked_in": true,
    "has_checked_out": false,
    "on_leave": false,
    "is_scheduled_off": false,
    "shift_id": 1,
    "status": "terlambat",
    "late_minutes": 17,
    "worked_minutes": 143,
    "target_minutes": 480,
    "correction_pending": false,
    "can_request_correction": true,
    "record": null
}))]
pub struct DaySnapshot {
    pub date: NaiveDate,
    pub has_checked_in: bool,
    pub has_checked_out: bool,
    pub on_leave: bool,
    pub is_scheduled_off: bool,
    pub shift_id: Option<u64>,
    pub status: DayStatus,
    pub late_minutes: i64,
    pub worked_minutes: i64,
    pub target_minutes: i64,
    pub correction_pending: bool,
    pub can_request_correction: bool,
    pub record: Option<AttendanceRecord>,
}

impl DaySnapshot {
    pub fn build(bundle: DayBundle, now: NaiveDateTime, config: &Config) -> Self {
        let ctx = &bundle.ctx;
        Self {
            date: ctx.date,
            has_checked_in: ctx.has_checked_in(),
            has_checked_out: ctx.has_checked_out(),
            on_leave: ctx.on_leave,
            is_scheduled_off: ctx.scheduled_off,
            shift_id: bundle.shift_id,
            status: ctx.status(now),
            // approved corrections recompute lateness, so trust the row
            late_minutes: bundle
                .record
                .as_ref()
                .map(|r| r.late_minutes)
                .unwrap_or_else(|| ctx.late_minutes()),
            worked_minutes: ctx.worked_minutes(now),
            target_minutes: ctx.target_minutes(config.default_work_minutes),
            correction_pending: ctx.correction_pending,
            can_request_correction: ctx
                .can_request_correction(now.date(), config.correction_window_days),
            record: bundle.record,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "latitude": -6.9175,
    "longitude": 107.6091,
    "photo": "data:image/jpeg;base64,/9j/4AAQSkZJRg...",
    "outlet_id": 2,
    "note": null
}))]
pub struct PunchReq {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    /// Base64 JPEG/PNG/WebP, optionally as a data URL.
    pub photo: Option<String>,
    /// Restrict the geofence match to this outlet.
    pub outlet_id: Option<u64>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// First day, defaults to 30 days ago
    pub from: Option<NaiveDate>,
    /// Last day, defaults to today
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TeamQuery {
    /// Defaults to today
    pub date: Option<NaiveDate>,
    /// Managers and above only
    pub outlet_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TeamMemberDay {
    pub user_id: u64,
    pub full_name: String,
    pub outlet_id: Option<u64>,
    pub snapshot: DaySnapshot,
}

/// Validated photo and fence for one punch.
struct Punch<'a> {
    outlet: &'a Outlet,
    photo_path: Option<String>,
}

async fn prepare_punch<'a>(
    payload: &PunchReq,
    outlets: &'a [Outlet],
    config: &Config,
    user_id: u64,
    date: NaiveDate,
    kind: &str,
) -> ApiResult<Punch<'a>> {
    payload.validate()?;

    let decoded = match payload.photo.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(photo::decode(raw, config.max_photo_bytes)?),
        _ if config.photo_required => {
            return Err(ApiError::new(
                ErrorCode::PhotoRequired,
                "A selfie photo is required",
            ));
        }
        _ => None,
    };

    let found = locate(
        outlets,
        GeoPoint::new(payload.latitude, payload.longitude),
        payload.outlet_id,
    )?;

    let photo_path = match decoded {
        Some((bytes, format)) => Some(
            photo::store(&config.upload_dir, date, user_id, kind, bytes, format).await?,
        ),
        None => None,
    };

    Ok(Punch {
        outlet: found.fence,
        photo_path,
    })
}

/// Today's attendance state for the caller.
#[utoipa::path(
    get,
    path = "/api/absensi/today",
    responses(
        (status = 200, body = DaySnapshot),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Absensi"
)]
pub async fn today(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let now = config.local_now();
    let bundle = active_day(pool.get_ref(), auth.user_id, now).await?;
    Ok(HttpResponse::Ok().json(DaySnapshot::build(bundle, now, &config)))
}

/// Check in (masuk)
#[utoipa::path(
    post,
    path = "/api/absensi/masuk",
    request_body = PunchReq,
    responses(
        (status = 200, description = "Checked in", body = DaySnapshot),
        (status = 400, description = "ON_LEAVE, SCHEDULED_OFF, SHIFT_ENDED, CORRECTION_PENDING, OUTSIDE_GEOFENCE, NO_ACTIVE_OUTLET, PHOTO_REQUIRED, INVALID_PHOTO"),
        (status = 409, description = "ALREADY_CHECKED_IN"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Absensi"
)]
#[instrument(name = "absensi_masuk", skip(pool, config, payload, auth), fields(user_id = auth.user_id))]
pub async fn check_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<PunchReq>,
) -> ApiResult<HttpResponse> {
    let now = config.local_now();
    let bundle = active_day(pool.get_ref(), auth.user_id, now).await?;
    // after midnight this is still yesterday while its night shift runs
    let date = bundle.ctx.date;
    bundle.ctx.ensure_can_check_in(now)?;

    let outlets = outlet_cache::active_outlets(pool.get_ref()).await?;
    let punch = prepare_punch(&payload, &outlets, &config, auth.user_id, date, "in").await?;
    let (status, late_minutes) = bundle.ctx.check_in_status(now);

    let result = sqlx::query(
        r#"
        INSERT INTO attendance
            (user_id, date, shift_id, check_in_at, check_in_photo, check_in_lat, check_in_lon,
             check_in_outlet_id, note, status, late_minutes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(date)
    .bind(bundle.shift_id)
    .bind(now)
    .bind(&punch.photo_path)
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(punch.outlet.id)
    .bind(&payload.note)
    .bind(status.as_ref())
    .bind(late_minutes)
    .execute(pool.get_ref())
    .await;

    if let Err(e) = result {
        if let Some(path) = &punch.photo_path {
            photo::discard(&config.upload_dir, path).await;
        }
        if is_unique_violation(&e) {
            return Err(ApiError::new(
                ErrorCode::AlreadyCheckedIn,
                "Already checked in today",
            ));
        }
        return Err(e.into());
    }

    info!(outlet_id = punch.outlet.id, %status, late_minutes, "Checked in");

    let bundle = active_day(pool.get_ref(), auth.user_id, now).await?;
    Ok(HttpResponse::Ok().json(DaySnapshot::build(bundle, now, &config)))
}

/// Check out (pulang)
#[utoipa::path(
    post,
    path = "/api/absensi/pulang",
    request_body = PunchReq,
    responses(
        (status = 200, description = "Checked out", body = DaySnapshot),
        (status = 400, description = "NOT_CHECKED_IN, ON_LEAVE, SCHEDULED_OFF, CORRECTION_PENDING, OUTSIDE_GEOFENCE, PHOTO_REQUIRED, INVALID_PHOTO"),
        (status = 409, description = "ALREADY_CHECKED_OUT"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Absensi"
)]
#[instrument(name = "absensi_pulang", skip(pool, config, payload, auth), fields(user_id = auth.user_id))]
pub async fn check_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<PunchReq>,
) -> ApiResult<HttpResponse> {
    let now = config.local_now();
    let bundle = active_day(pool.get_ref(), auth.user_id, now).await?;
    bundle.ctx.ensure_can_check_out()?;

    let Some(record_id) = bundle.record.as_ref().map(|r| r.id) else {
        return Err(ApiError::new(
            ErrorCode::NotCheckedIn,
            "No check-in found for today",
        ));
    };

    let outlets = outlet_cache::active_outlets(pool.get_ref()).await?;
    let punch =
        prepare_punch(&payload, &outlets, &config, auth.user_id, bundle.ctx.date, "out").await?;

    let note = payload.note.as_deref().filter(|n| !n.trim().is_empty());

    // check_out_at IS NULL settles a double tap between two devices
    let result = sqlx::query(
        r#"
        UPDATE attendance
        SET check_out_at = ?, check_out_photo = ?, check_out_lat = ?, check_out_lon = ?,
            check_out_outlet_id = ?, note = COALESCE(?, note), status = ?
        WHERE id = ? AND check_out_at IS NULL
        "#,
    )
    .bind(now)
    .bind(&punch.photo_path)
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(punch.outlet.id)
    .bind(note)
    .bind(AttendanceStatus::Pulang.as_ref())
    .bind(record_id)
    .execute(pool.get_ref())
    .await;

    let updated = result.as_ref().is_ok_and(|r| r.rows_affected() > 0);
    if !updated {
        if let Some(path) = &punch.photo_path {
            photo::discard(&config.upload_dir, path).await;
        }
    }
    if result?.rows_affected() == 0 {
        return Err(ApiError::new(
            ErrorCode::AlreadyCheckedOut,
            "Already checked out today",
        ));
    }

    info!(outlet_id = punch.outlet.id, date = %bundle.ctx.date, "Checked out");

    let mut days = load_days(pool.get_ref(), &[auth.user_id], bundle.ctx.date, bundle.ctx.date).await?;
    let bundle = days
        .remove(&(auth.user_id, bundle.ctx.date))
        .ok_or_else(|| ApiError::internal("attendance day vanished after check-out"))?;
    Ok(HttpResponse::Ok().json(DaySnapshot::build(bundle, now, &config)))
}

/// Caller's attendance per day, newest first.
#[utoipa::path(
    get,
    path = "/api/absensi/history",
    params(HistoryQuery),
    responses(
        (status = 200, body = [DaySnapshot]),
        (status = 400, description = "Invalid range")
    ),
    security(("bearer_auth" = [])),
    tag = "Absensi"
)]
pub async fn history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<HistoryQuery>,
) -> ApiResult<HttpResponse> {
    let now = config.local_now();
    let today = now.date();
    let to = query.to.unwrap_or(today).min(today);
    let from = query.from.unwrap_or(to - Duration::days(29));

    if from > to {
        return Err(ApiError::validation("from cannot be after to"));
    }
    if (to - from).num_days() >= MAX_HISTORY_DAYS {
        return Err(ApiError::validation(format!(
            "History is limited to {MAX_HISTORY_DAYS} days per request"
        )));
    }

    let mut days: Vec<DayBundle> = load_days(pool.get_ref(), &[auth.user_id], from, to)
        .await?
        .into_values()
        .collect();
    days.sort_by(|a, b| b.ctx.date.cmp(&a.ctx.date));

    let snapshots: Vec<DaySnapshot> = days
        .into_iter()
        .map(|bundle| DaySnapshot::build(bundle, now, &config))
        .collect();

    Ok(HttpResponse::Ok().json(snapshots))
}

#[derive(Debug, sqlx::FromRow)]
struct Member {
    id: u64,
    full_name: String,
    outlet_id: Option<u64>,
}

/// Active users the caller oversees, ordered by name.
async fn team_members(
    auth: &AuthUser,
    pool: &MySqlPool,
    outlet_id: Option<u64>,
) -> ApiResult<Vec<Member>> {
    let mut conditions = vec!["is_active = 1".to_string()];
    let mut values = Vec::new();

    if let Some((condition, value)) = team_condition(auth, "id")? {
        conditions.push(condition);
        values.push(value);
    }
    if let Some(outlet_id) = outlet_id {
        conditions.push("outlet_id = ?".to_string());
        values.push(SqlValue::U64(outlet_id));
    }

    let sql = format!(
        "SELECT id, full_name, outlet_id FROM users WHERE {} ORDER BY full_name",
        conditions.join(" AND ")
    );
    Ok(sqlx::query_as_with::<_, Member, _>(&sql, to_arguments(values))
        .fetch_all(pool)
        .await?)
}

/// Per-member snapshot of the caller's team for one day.
pub async fn team_snapshots(
    auth: &AuthUser,
    pool: &MySqlPool,
    config: &Config,
    date: NaiveDate,
    outlet_id: Option<u64>,
) -> ApiResult<Vec<TeamMemberDay>> {
    let now = config.local_now();
    let members = team_members(auth, pool, outlet_id).await?;
    let ids: Vec<u64> = members.iter().map(|m| m.id).collect();
    let mut days = load_days(pool, &ids, date, date).await?;

    let mut team = Vec::with_capacity(members.len());
    for member in members {
        let Some(bundle) = days.remove(&(member.id, date)) else {
            continue;
        };
        team.push(TeamMemberDay {
            user_id: member.id,
            full_name: member.full_name,
            outlet_id: member.outlet_id,
            snapshot: DaySnapshot::build(bundle, now, config),
        });
    }
    Ok(team)
}

/// Attendance of the caller's team for one day
#[utoipa::path(
    get,
    path = "/api/absensi/team",
    params(TeamQuery),
    responses(
        (status = 200, body = [TeamMemberDay]),
        (status = 403, description = "Supervisor or above only")
    ),
    security(("bearer_auth" = [])),
    tag = "Absensi"
)]
pub async fn team(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<TeamQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_reviewer()?;
    let date = query.date.unwrap_or_else(|| config.local_now().date());
    let outlet_id = query.outlet_id.filter(|_| auth.role.sees_everyone());

    let team = team_snapshots(&auth, pool.get_ref(), &config, date, outlet_id).await?;
    Ok(HttpResponse::Ok().json(team))
}

/// Raw check-in or check-out photo.
#[utoipa::path(
    get,
    path = "/api/absensi/{id}/photo/{side}",
    params(
        ("id", Path, description = "Attendance record ID"),
        ("side", Path, description = "`in` or `out`")
    ),
    responses(
        (status = 200, description = "Image bytes", content_type = "image/jpeg"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "No photo")
    ),
    security(("bearer_auth" = [])),
    tag = "Absensi"
)]
pub async fn photo(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<(u64, String)>,
) -> ApiResult<HttpResponse> {
    let (id, side) = path.into_inner();

    let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?");
    let record = sqlx::query_as::<_, AttendanceRecord>(&sql)
        .bind(id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("Attendance record not found"))?;

    ensure_can_view(&auth, pool.get_ref(), record.user_id).await?;

    let stored = match side.as_str() {
        "in" => record.check_in_photo,
        "out" => record.check_out_photo,
        _ => return Err(ApiError::validation("side must be `in` or `out`")),
    }
    .ok_or_else(|| ApiError::not_found("No photo for this punch"))?;

    let file = photo::resolve(&config.upload_dir, &stored)?;
    let bytes = tokio::fs::read(&file).await.map_err(|e| {
        warn!(error = %e, path = %file.display(), "Stored photo unreadable");
        ApiError::not_found("Photo file missing")
    })?;

    let content_type = file
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(PhotoFormat::from_extension)
        .map(PhotoFormat::content_type)
        .unwrap_or("application/octet-stream");

    Ok(HttpResponse::Ok().content_type(content_type).body(bytes))
}
