use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{MySql, MySqlPool, Transaction};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::{
        access::{ReviewReq, ensure_can_approve_swap, ensure_can_review, team_condition},
        notification::notify,
    },
    auth::auth::AuthUser,
    config::Config,
    domain::shift_swap::{Slot, swapped, validate_swap},
    error::{ApiError, ApiResult},
    model::{
        notification::NotificationKind,
        request_status::RequestStatus,
        shift_change::{SHIFT_CHANGE_COLUMNS, ShiftChangeRequest},
    },
    utils::{
        db_utils::SqlValue,
        pagination::{ListSql, ShiftChangePage},
    },
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "target_id": 12,
    "date": "2026-03-09",
    "reason": "Ada acara keluarga pagi hari"
}))]
pub struct CreateShiftChange {
    /// The colleague to swap with
    pub target_id: u64,
    pub date: NaiveDate,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ShiftChangeQuery {
    /// pending (queue default), approved, rejected, cancelled or `all`
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

async fn fetch_request(pool: &MySqlPool, id: u64) -> ApiResult<ShiftChangeRequest> {
    let sql = format!("SELECT {SHIFT_CHANGE_COLUMNS} FROM shift_change_requests WHERE id = ?");
    sqlx::query_as::<_, ShiftChangeRequest>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Shift change request not found"))
}

async fn slot(
    conn: &mut sqlx::MySqlConnection,
    user_id: u64,
    date: NaiveDate,
    lock: bool,
) -> ApiResult<Option<Slot>> {
    let sql = if lock {
        "SELECT shift_id, is_off FROM shift_schedules WHERE user_id = ? AND date = ? FOR UPDATE"
    } else {
        "SELECT shift_id, is_off FROM shift_schedules WHERE user_id = ? AND date = ?"
    };
    let row = sqlx::query_as::<_, (Option<u64>, bool)>(sql)
        .bind(user_id)
        .bind(date)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(|(shift_id, is_off)| Slot { shift_id, is_off }))
}

async fn write_slot(
    tx: &mut Transaction<'_, MySql>,
    user_id: u64,
    date: NaiveDate,
    slot: Slot,
) -> ApiResult<()> {
    sqlx::query("UPDATE shift_schedules SET shift_id = ?, is_off = ? WHERE user_id = ? AND date = ?")
        .bind(slot.shift_id)
        .bind(slot.is_off)
        .bind(user_id)
        .bind(date)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Ask to swap schedules with a colleague on one date
#[utoipa::path(
    post,
    path = "/api/shift-change",
    request_body = CreateShiftChange,
    responses(
        (status = 201, body = ShiftChangeRequest),
        (status = 400, description = "Validation error"),
        (status = 409, description = "A request for that date is already pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift change"
)]
#[instrument(name = "shift_change_create", skip(pool, config, payload, auth), fields(user_id = auth.user_id))]
pub async fn create_shift_change(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<CreateShiftChange>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let today = config.local_now().date();

    let target_active = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE id = ? AND is_active = 1",
    )
    .bind(payload.target_id)
    .fetch_one(pool.get_ref())
    .await?;
    if target_active == 0 {
        return Err(ApiError::not_found("Target employee not found"));
    }

    let mut conn = pool.acquire().await?;
    let mine = slot(&mut conn, auth.user_id, payload.date, false).await?;
    let theirs = slot(&mut conn, payload.target_id, payload.date, false).await?;
    validate_swap(auth.user_id, payload.target_id, payload.date, today, mine, theirs)?;

    let pending = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM shift_change_requests
        WHERE requester_id = ? AND date = ? AND status = 'pending'
        "#,
    )
    .bind(auth.user_id)
    .bind(payload.date)
    .fetch_one(&mut *conn)
    .await?;
    if pending > 0 {
        return Err(ApiError::conflict(
            "You already have a pending shift change for that date",
        ));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO shift_change_requests (requester_id, target_id, date, reason, status)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(payload.target_id)
    .bind(payload.date)
    .bind(payload.reason.as_deref().map(str::trim))
    .bind(RequestStatus::Pending.as_ref())
    .execute(&mut *conn)
    .await?;
    drop(conn);

    let id = result.last_insert_id();
    info!(id, target_id = payload.target_id, date = %payload.date, "Shift change requested");

    notify(
        pool.get_ref(),
        payload.target_id,
        NotificationKind::ShiftChange,
        "Permintaan tukar shift",
        &format!("{} mengajukan tukar shift tanggal {}", auth.username, payload.date),
    )
    .await;

    Ok(HttpResponse::Created().json(fetch_request(pool.get_ref(), id).await?))
}

/// Requests the caller made or is the target of
#[utoipa::path(
    get,
    path = "/api/shift-change/mine",
    params(ShiftChangeQuery),
    responses((status = 200, body = ShiftChangePage)),
    security(("bearer_auth" = [])),
    tag = "Shift change"
)]
pub async fn my_shift_changes(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ShiftChangeQuery>,
) -> ApiResult<HttpResponse> {
    let mut list = ListSql::new(SHIFT_CHANGE_COLUMNS, "shift_change_requests", "date DESC, id DESC");
    list.conditions
        .push("(requester_id = ? OR target_id = ?)".to_string());
    list.values.push(SqlValue::U64(auth.user_id));
    list.values.push(SqlValue::U64(auth.user_id));
    if let Some(status) = query.status.as_deref().filter(|s| *s != "all") {
        list.push("status = ?", SqlValue::String(status.to_string()));
    }

    let page = list
        .fetch_page::<ShiftChangeRequest>(pool.get_ref(), query.page, query.per_page)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Review queue
#[utoipa::path(
    get,
    path = "/api/shift-change",
    params(ShiftChangeQuery),
    responses(
        (status = 200, body = ShiftChangePage),
        (status = 403, description = "Supervisor or above only")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift change"
)]
pub async fn list_shift_changes(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ShiftChangeQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_reviewer()?;

    let mut list = ListSql::new(SHIFT_CHANGE_COLUMNS, "shift_change_requests", "date ASC, id ASC");
    list.push("requester_id <> ?", SqlValue::U64(auth.user_id));
    if let Some((condition, value)) = team_condition(&auth, "requester_id")? {
        list.push(condition, value);
    }
    match query.status.as_deref() {
        Some("all") => {}
        Some(status) => list.push("status = ?", SqlValue::String(status.to_string())),
        None => list.push("status = ?", SqlValue::String(RequestStatus::Pending.to_string())),
    }

    let page = list
        .fetch_page::<ShiftChangeRequest>(pool.get_ref(), query.page, query.per_page)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

async fn decide(
    auth: &AuthUser,
    pool: &MySqlPool,
    config: &Config,
    id: u64,
    to: RequestStatus,
    note: Option<String>,
) -> ApiResult<ShiftChangeRequest> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "SELECT {SHIFT_CHANGE_COLUMNS} FROM shift_change_requests WHERE id = ? FOR UPDATE"
    );
    let request = sqlx::query_as::<_, ShiftChangeRequest>(&sql)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Shift change request not found"))?;

    RequestStatus::parse_stored(&request.status)?.ensure_transition(to)?;

    match to {
        RequestStatus::Cancelled if request.requester_id != auth.user_id => {
            return Err(ApiError::forbidden("Only the requester can cancel"));
        }
        RequestStatus::Cancelled => {}
        RequestStatus::Approved => {
            ensure_can_approve_swap(auth, pool, request.requester_id, request.target_id).await?
        }
        _ => ensure_can_review(auth, pool, request.requester_id).await?,
    }

    if to == RequestStatus::Approved {
        // both rows locked; the roster may have changed since the request
        let mine = slot(&mut tx, request.requester_id, request.date, true).await?;
        let theirs = slot(&mut tx, request.target_id, request.date, true).await?;
        validate_swap(
            request.requester_id,
            request.target_id,
            request.date,
            config.local_now().date(),
            mine,
            theirs,
        )?;
        if let (Some(mine), Some(theirs)) = (mine, theirs) {
            let (new_mine, new_theirs) = swapped(mine, theirs);
            write_slot(&mut tx, request.requester_id, request.date, new_mine).await?;
            write_slot(&mut tx, request.target_id, request.date, new_theirs).await?;
        }
    }

    sqlx::query(
        r#"
        UPDATE shift_change_requests
        SET status = ?, reviewer_id = ?, review_note = ?, reviewed_at = NOW()
        WHERE id = ?
        "#,
    )
    .bind(to.as_ref())
    .bind((to != RequestStatus::Cancelled).then_some(auth.user_id))
    .bind(note)
    .bind(id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(id, by = auth.user_id, %to, "Shift change decided");

    if to != RequestStatus::Cancelled {
        let body = format!("Tukar shift tanggal {} telah {}", request.date, to.verdict());
        let title = format!("Tukar shift {}", to.verdict());
        for user_id in [request.requester_id, request.target_id] {
            notify(pool, user_id, NotificationKind::ShiftChange, &title, &body).await;
        }
    }

    fetch_request(pool, id).await
}

/// Approve and swap the two schedules
#[utoipa::path(
    put,
    path = "/api/shift-change/{id}/approve",
    params(("id", Path, description = "Request ID")),
    request_body(content = ReviewReq, description = "Optional note"),
    responses(
        (status = 200, body = ShiftChangeRequest),
        (status = 400, description = "INVALID_STATE or schedules no longer swappable"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift change"
)]
pub async fn approve_shift_change(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
    body: Option<web::Json<ReviewReq>>,
) -> ApiResult<HttpResponse> {
    let review = ReviewReq::from_body(body)?;
    let request = decide(
        &auth,
        pool.get_ref(),
        &config,
        path.into_inner(),
        RequestStatus::Approved,
        review.note,
    )
    .await?;
    Ok(HttpResponse::Ok().json(request))
}

/// Reject a shift change
#[utoipa::path(
    put,
    path = "/api/shift-change/{id}/reject",
    params(("id", Path, description = "Request ID")),
    request_body(content = ReviewReq, description = "Optional note"),
    responses(
        (status = 200, body = ShiftChangeRequest),
        (status = 400, description = "INVALID_STATE"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift change"
)]
pub async fn reject_shift_change(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
    body: Option<web::Json<ReviewReq>>,
) -> ApiResult<HttpResponse> {
    let review = ReviewReq::from_body(body)?;
    let request = decide(
        &auth,
        pool.get_ref(),
        &config,
        path.into_inner(),
        RequestStatus::Rejected,
        review.note,
    )
    .await?;
    Ok(HttpResponse::Ok().json(request))
}

/// Withdraw own pending request
#[utoipa::path(
    put,
    path = "/api/shift-change/{id}/cancel",
    params(("id", Path, description = "Request ID")),
    responses(
        (status = 200, body = ShiftChangeRequest),
        (status = 400, description = "INVALID_STATE"),
        (status = 403, description = "Only the requester can cancel")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift change"
)]
pub async fn cancel_shift_change(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let request = decide(
        &auth,
        pool.get_ref(),
        &config,
        path.into_inner(),
        RequestStatus::Cancelled,
        None,
    )
    .await?;
    Ok(HttpResponse::Ok().json(request))
}
