use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::{MySql, MySqlPool, Transaction};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::{
        access::{ReviewReq, ensure_can_review, team_condition},
        notification::notify,
        roster::load_day,
    },
    auth::auth::AuthUser,
    config::Config,
    domain::{
        approval::auto_approves,
        attendance::ShiftWindow,
        correction::{CorrectionDraft, merge_punches, validate_draft},
    },
    error::{ApiError, ApiResult, ErrorCode},
    model::{
        attendance::AttendanceStatus,
        correction::{CORRECTION_COLUMNS, Correction},
        notification::NotificationKind,
        request_status::RequestStatus,
    },
    utils::{
        db_utils::SqlValue,
        pagination::{CorrectionPage, ListSql},
    },
};

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "date": "2026-03-02",
    "check_in_at": "2026-03-02T08:02:00",
    "check_out_at": "2026-03-02T16:05:00",
    "reason": "Lupa absen pulang, HP mati"
}))]
pub struct CreateCorrectionReq {
    pub date: NaiveDate,
    pub check_in_at: Option<NaiveDateTime>,
    pub check_out_at: Option<NaiveDateTime>,
    #[validate(length(min = 3, max = 500))]
    pub reason: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CorrectionQuery {
    /// pending (default), approved, rejected or `all`
    pub status: Option<String>,
    pub user_id: Option<u64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

async fn fetch_correction(pool: &MySqlPool, id: u64) -> ApiResult<Correction> {
    let sql = format!("SELECT {CORRECTION_COLUMNS} FROM corrections WHERE id = ?");
    sqlx::query_as::<_, Correction>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Correction not found"))
}

/// Writes approved punches onto the attendance row for the draft's date.
async fn apply_correction(
    tx: &mut Transaction<'_, MySql>,
    user_id: u64,
    draft: &CorrectionDraft,
) -> ApiResult<()> {
    let recorded = sqlx::query_as::<_, (u64, Option<NaiveDateTime>, Option<NaiveDateTime>)>(
        r#"
        SELECT id, check_in_at, check_out_at
        FROM attendance
        WHERE user_id = ? AND date = ?
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .bind(draft.date)
    .fetch_optional(&mut **tx)
    .await?;

    let (check_in_at, check_out_at) = merge_punches(
        recorded
            .map(|(_, i, o)| (i, o))
            .unwrap_or((None, None)),
        draft,
    )?;

    let shift = sqlx::query_as::<_, (u64, NaiveTime, NaiveTime, i32)>(
        r#"
        SELECT sh.id, sh.start_time, sh.end_time, sh.late_tolerance_minutes
        FROM shift_schedules sc
        JOIN shifts sh ON sh.id = sc.shift_id
        WHERE sc.user_id = ? AND sc.date = ? AND sc.is_off = 0
        "#,
    )
    .bind(user_id)
    .bind(draft.date)
    .fetch_optional(&mut **tx)
    .await?;

    let late_minutes = match (shift, check_in_at) {
        (Some((_, start, end, tolerance)), Some(at)) => ShiftWindow {
            start,
            end,
            late_tolerance_minutes: i64::from(tolerance),
        }
        .late_minutes(draft.date, at),
        _ => 0,
    };

    match recorded {
        Some((id, _, _)) => {
            sqlx::query(
                r#"
                UPDATE attendance
                SET check_in_at = ?, check_out_at = ?, status = ?, late_minutes = ?, corrected = 1
                WHERE id = ?
                "#,
            )
            .bind(check_in_at)
            .bind(check_out_at)
            .bind(AttendanceStatus::Koreksi.as_ref())
            .bind(late_minutes)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO attendance
                    (user_id, date, shift_id, check_in_at, check_out_at, status, late_minutes, corrected)
                VALUES (?, ?, ?, ?, ?, ?, ?, 1)
                "#,
            )
            .bind(user_id)
            .bind(draft.date)
            .bind(shift.map(|(id, ..)| id))
            .bind(check_in_at)
            .bind(check_out_at)
            .bind(AttendanceStatus::Koreksi.as_ref())
            .bind(late_minutes)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

/// Submit a correction (koreksi)
#[utoipa::path(
    post,
    path = "/api/koreksi",
    request_body = CreateCorrectionReq,
    responses(
        (status = 201, description = "Submitted; HR/Admin requests are applied at once", body = Correction),
        (status = 400, description = "VALIDATION_ERROR, CORRECTION_PENDING, ON_LEAVE or SCHEDULED_OFF")
    ),
    security(("bearer_auth" = [])),
    tag = "Koreksi"
)]
#[instrument(name = "koreksi_create", skip(pool, config, payload, auth), fields(user_id = auth.user_id))]
pub async fn create_correction(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<CreateCorrectionReq>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;

    let draft = CorrectionDraft {
        date: payload.date,
        check_in_at: payload.check_in_at,
        check_out_at: payload.check_out_at,
    };
    validate_draft(&draft, config.local_now(), config.correction_window_days)?;
    load_day(pool.get_ref(), auth.user_id, draft.date)
        .await?
        .ctx
        .ensure_correctable()?;

    let mut tx = pool.begin().await?;

    // FOR UPDATE on the user row serialises concurrent submissions
    sqlx::query("SELECT id FROM users WHERE id = ? FOR UPDATE")
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await?;

    let pending = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM corrections WHERE user_id = ? AND date = ? AND status = 'pending'",
    )
    .bind(auth.user_id)
    .bind(draft.date)
    .fetch_one(&mut *tx)
    .await?;

    if pending > 0 {
        return Err(ApiError::new(
            ErrorCode::CorrectionPending,
            "A correction for this day is already awaiting review",
        ));
    }

    let auto = auto_approves(auth.role);
    let status = if auto {
        RequestStatus::Approved
    } else {
        RequestStatus::Pending
    };

    let result = sqlx::query(
        r#"
        INSERT INTO corrections
            (user_id, date, check_in_at, check_out_at, reason, status, reviewer_id, reviewed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, IF(?, NOW(), NULL))
        "#,
    )
    .bind(auth.user_id)
    .bind(draft.date)
    .bind(draft.check_in_at)
    .bind(draft.check_out_at)
    .bind(payload.reason.trim())
    .bind(status.as_ref())
    .bind(auto.then_some(auth.user_id))
    .bind(auto)
    .execute(&mut *tx)
    .await?;

    if auto {
        apply_correction(&mut tx, auth.user_id, &draft).await?;
    }
    tx.commit().await?;

    info!(id = result.last_insert_id(), %status, date = %draft.date, "Correction submitted");

    let correction = fetch_correction(pool.get_ref(), result.last_insert_id()).await?;
    Ok(HttpResponse::Created().json(correction))
}

/// Caller's corrections
#[utoipa::path(
    get,
    path = "/api/koreksi/mine",
    params(CorrectionQuery),
    responses((status = 200, body = CorrectionPage)),
    security(("bearer_auth" = [])),
    tag = "Koreksi"
)]
pub async fn my_corrections(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<CorrectionQuery>,
) -> ApiResult<HttpResponse> {
    let mut list = ListSql::new(CORRECTION_COLUMNS, "corrections", "date DESC, id DESC");
    list.push("user_id = ?", SqlValue::U64(auth.user_id));
    if let Some(status) = query.status.as_deref().filter(|s| *s != "all") {
        list.push("status = ?", SqlValue::String(status.to_string()));
    }

    let page = list
        .fetch_page::<Correction>(pool.get_ref(), query.page, query.per_page)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Review queue
#[utoipa::path(
    get,
    path = "/api/koreksi",
    params(CorrectionQuery),
    responses(
        (status = 200, description = "Direct reports for supervisors, everyone for manager and above", body = CorrectionPage),
        (status = 403, description = "Supervisor or above only")
    ),
    security(("bearer_auth" = [])),
    tag = "Koreksi"
)]
pub async fn list_corrections(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<CorrectionQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_reviewer()?;

    let mut list = ListSql::new(CORRECTION_COLUMNS, "corrections", "created_at ASC, id ASC");
    list.push("user_id <> ?", SqlValue::U64(auth.user_id));
    if let Some((condition, value)) = team_condition(&auth, "user_id")? {
        list.push(condition, value);
    }
    match query.status.as_deref() {
        Some("all") => {}
        Some(status) => list.push("status = ?", SqlValue::String(status.to_string())),
        None => list.push("status = ?", SqlValue::String(RequestStatus::Pending.to_string())),
    }
    if let Some(user_id) = query.user_id {
        list.push("user_id = ?", SqlValue::U64(user_id));
    }

    let page = list
        .fetch_page::<Correction>(pool.get_ref(), query.page, query.per_page)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

async fn decide(
    auth: &AuthUser,
    pool: &MySqlPool,
    id: u64,
    to: RequestStatus,
    note: Option<String>,
) -> ApiResult<Correction> {
    let mut tx = pool.begin().await?;

    let sql = format!("SELECT {CORRECTION_COLUMNS} FROM corrections WHERE id = ? FOR UPDATE");
    let correction = sqlx::query_as::<_, Correction>(&sql)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Correction not found"))?;

    RequestStatus::parse_stored(&correction.status)?.ensure_transition(to)?;
    ensure_can_review(auth, pool, correction.user_id).await?;
    // leave may have been approved since the correction was filed
    if to == RequestStatus::Approved {
        load_day(pool, correction.user_id, correction.date)
            .await?
            .ctx
            .ensure_correctable()?;
    }

    sqlx::query(
        r#"
        UPDATE corrections
        SET status = ?, reviewer_id = ?, review_note = ?, reviewed_at = NOW()
        WHERE id = ?
        "#,
    )
    .bind(to.as_ref())
    .bind(auth.user_id)
    .bind(note)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if to == RequestStatus::Approved {
        let draft = CorrectionDraft {
            date: correction.date,
            check_in_at: correction.check_in_at,
            check_out_at: correction.check_out_at,
        };
        apply_correction(&mut tx, correction.user_id, &draft).await?;
    }
    tx.commit().await?;

    info!(id, reviewer_id = auth.user_id, %to, "Correction reviewed");

    notify(
        pool,
        correction.user_id,
        NotificationKind::Correction,
        &format!("Koreksi {}", to.verdict()),
        &format!(
            "Koreksi absensi tanggal {} telah {}",
            correction.date,
            to.verdict()
        ),
    )
    .await;

    fetch_correction(pool, id).await
}

/// Approve a correction and apply it to the attendance record
#[utoipa::path(
    put,
    path = "/api/koreksi/{id}/approve",
    params(("id", Path, description = "Correction ID")),
    request_body(content = ReviewReq, description = "Optional note"),
    responses(
        (status = 200, body = Correction),
        (status = 400, description = "INVALID_STATE, ON_LEAVE or SCHEDULED_OFF"),
        (status = 403, description = "Not the owner's reviewer"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Koreksi"
)]
pub async fn approve_correction(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Option<web::Json<ReviewReq>>,
) -> ApiResult<HttpResponse> {
    let review = ReviewReq::from_body(body)?;
    let correction = decide(
        &auth,
        pool.get_ref(),
        path.into_inner(),
        RequestStatus::Approved,
        review.note,
    )
    .await?;
    Ok(HttpResponse::Ok().json(correction))
}

/// Reject a correction
#[utoipa::path(
    put,
    path = "/api/koreksi/{id}/reject",
    params(("id", Path, description = "Correction ID")),
    request_body(content = ReviewReq, description = "Optional note"),
    responses(
        (status = 200, body = Correction),
        (status = 400, description = "INVALID_STATE"),
        (status = 403, description = "Not the owner's reviewer"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Koreksi"
)]
pub async fn reject_correction(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Option<web::Json<ReviewReq>>,
) -> ApiResult<HttpResponse> {
    let review = ReviewReq::from_body(body)?;
    let correction = decide(
        &auth,
        pool.get_ref(),
        path.into_inner(),
        RequestStatus::Rejected,
        review.note,
    )
    .await?;
    Ok(HttpResponse::Ok().json(correction))
}
