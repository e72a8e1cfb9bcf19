use actix_web::{HttpResponse, web};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::{MySql, MySqlPool, Transaction};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::{
        access::{ReviewReq, ensure_can_review, ensure_can_view, team_condition},
        notification::notify,
    },
    auth::auth::AuthUser,
    config::Config,
    domain::leave::{days_in_year, days_inclusive, ensure_quota, validate_request},
    error::{ApiError, ApiResult},
    model::{
        leave_request::{LEAVE_COLUMNS, LeaveRequest, LeaveType},
        notification::NotificationKind,
        request_status::RequestStatus,
    },
    utils::{
        db_utils::SqlValue,
        pagination::{LeavePage, ListSql},
    },
};

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "start_date": "2026-04-06",
    "end_date": "2026-04-08",
    "leave_type": "annual",
    "reason": "Mudik"
}))]
pub struct CreateLeave {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: LeaveType,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaveFilter {
    /// Filter by employee
    pub user_id: Option<u64>,
    /// pending (queue default), approved, rejected, cancelled or `all`
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BalanceQuery {
    /// Defaults to the current year
    pub year: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "year": 2026,
    "quota": 12,
    "used": 3,
    "pending": 2,
    "remaining": 7
}))]
pub struct LeaveBalance {
    pub year: i32,
    pub quota: i64,
    /// Approved annual leave days
    pub used: i64,
    /// Annual leave days awaiting review
    pub pending: i64,
    pub remaining: i64,
}

async fn fetch_leave(pool: &MySqlPool, id: u64) -> ApiResult<LeaveRequest> {
    let sql = format!("SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ?");
    sqlx::query_as::<_, LeaveRequest>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Leave request not found"))
}

/// (approved, pending) annual days booked in `year`.
async fn annual_days(
    conn: &mut sqlx::MySqlConnection,
    user_id: u64,
    year: i32,
) -> ApiResult<(i64, i64)> {
    let (Some(jan1), Some(dec31)) = (
        NaiveDate::from_ymd_opt(year, 1, 1),
        NaiveDate::from_ymd_opt(year, 12, 31),
    ) else {
        return Err(ApiError::validation("Invalid year"));
    };

    let rows = sqlx::query_as::<_, (NaiveDate, NaiveDate, String)>(
        r#"
        SELECT start_date, end_date, status
        FROM leave_requests
        WHERE user_id = ? AND leave_type = ? AND status IN ('pending', 'approved')
          AND start_date <= ? AND end_date >= ?
        "#,
    )
    .bind(user_id)
    .bind(LeaveType::Annual.as_ref())
    .bind(dec31)
    .bind(jan1)
    .fetch_all(conn)
    .await?;

    let mut approved = 0;
    let mut pending = 0;
    for (start, end, status) in rows {
        let days = days_in_year(start, end, year);
        if status == RequestStatus::Approved.as_ref() {
            approved += days;
        } else {
            pending += days;
        }
    }
    Ok((approved, pending))
}

async fn booked_ranges(
    tx: &mut Transaction<'_, MySql>,
    user_id: u64,
) -> ApiResult<Vec<(NaiveDate, NaiveDate)>> {
    Ok(sqlx::query_as::<_, (NaiveDate, NaiveDate)>(
        r#"
        SELECT start_date, end_date
        FROM leave_requests
        WHERE user_id = ? AND status IN ('pending', 'approved')
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut **tx)
    .await?)
}

/// Submit a leave request (cuti)
#[utoipa::path(
    post,
    path = "/api/cuti",
    request_body(content = CreateLeave, description = "Leave request payload", content_type = "application/json"),
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveRequest),
        (status = 400, description = "VALIDATION_ERROR or LEAVE_OVERLAP"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Cuti"
)]
#[instrument(name = "cuti_create", skip(pool, config, payload, auth), fields(user_id = auth.user_id))]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<CreateLeave>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let today = config.local_now().date();

    let mut tx = pool.begin().await?;

    // serialise requests of the same user so overlap and quota checks hold
    sqlx::query("SELECT id FROM users WHERE id = ? FOR UPDATE")
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await?;

    let booked = booked_ranges(&mut tx, auth.user_id).await?;
    validate_request(
        payload.leave_type,
        payload.start_date,
        payload.end_date,
        today,
        &booked,
    )?;

    if payload.leave_type == LeaveType::Annual {
        let (approved, pending) =
            annual_days(&mut tx, auth.user_id, payload.start_date.year()).await?;
        ensure_quota(
            days_inclusive(payload.start_date, payload.end_date),
            approved + pending,
            config.annual_leave_quota,
        )?;
    }

    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests (user_id, start_date, end_date, leave_type, reason, status)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.leave_type.as_ref())
    .bind(payload.reason.as_deref().map(str::trim))
    .bind(RequestStatus::Pending.as_ref())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let id = result.last_insert_id();
    info!(id, leave_type = %payload.leave_type, "Leave request submitted");

    Ok(HttpResponse::Created().json(fetch_leave(pool.get_ref(), id).await?))
}

/// Caller's leave requests
#[utoipa::path(
    get,
    path = "/api/cuti/mine",
    params(LeaveFilter),
    responses((status = 200, body = LeavePage)),
    security(("bearer_auth" = [])),
    tag = "Cuti"
)]
pub async fn my_leaves(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> ApiResult<HttpResponse> {
    let mut list = ListSql::new(LEAVE_COLUMNS, "leave_requests", "start_date DESC, id DESC");
    list.push("user_id = ?", SqlValue::U64(auth.user_id));
    if let Some(status) = query.status.as_deref().filter(|s| *s != "all") {
        list.push("status = ?", SqlValue::String(status.to_string()));
    }

    let page = list
        .fetch_page::<LeaveRequest>(pool.get_ref(), query.page, query.per_page)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Annual leave balance
#[utoipa::path(
    get,
    path = "/api/cuti/balance",
    params(BalanceQuery),
    responses((status = 200, body = LeaveBalance)),
    security(("bearer_auth" = [])),
    tag = "Cuti"
)]
pub async fn leave_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<BalanceQuery>,
) -> ApiResult<HttpResponse> {
    let year = query.year.unwrap_or_else(|| config.local_now().year());
    let balance = balance_for(pool.get_ref(), &config, auth.user_id, year).await?;
    Ok(HttpResponse::Ok().json(balance))
}

pub async fn balance_for(
    pool: &MySqlPool,
    config: &Config,
    user_id: u64,
    year: i32,
) -> ApiResult<LeaveBalance> {
    let mut conn = pool.acquire().await?;
    let (used, pending) = annual_days(&mut conn, user_id, year).await?;
    Ok(LeaveBalance {
        year,
        quota: config.annual_leave_quota,
        used,
        pending,
        remaining: (config.annual_leave_quota - used - pending).max(0),
    })
}

/// Review queue / filtered list
#[utoipa::path(
    get,
    path = "/api/cuti",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave requests", body = LeavePage),
        (status = 403, description = "Supervisor or above only")
    ),
    security(("bearer_auth" = [])),
    tag = "Cuti"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> ApiResult<HttpResponse> {
    auth.require_reviewer()?;

    let mut list = ListSql::new(LEAVE_COLUMNS, "leave_requests", "created_at ASC, id ASC");
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
        .fetch_page::<LeaveRequest>(pool.get_ref(), query.page, query.per_page)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Get one leave request
#[utoipa::path(
    get,
    path = "/api/cuti/{id}",
    params(("id", Path, description = "Leave request ID")),
    responses(
        (status = 200, body = LeaveRequest),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Cuti"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let leave = fetch_leave(pool.get_ref(), path.into_inner()).await?;
    ensure_can_view(&auth, pool.get_ref(), leave.user_id).await?;
    Ok(HttpResponse::Ok().json(leave))
}

async fn decide(
    auth: &AuthUser,
    pool: &MySqlPool,
    id: u64,
    to: RequestStatus,
    note: Option<String>,
) -> ApiResult<LeaveRequest> {
    let mut tx = pool.begin().await?;

    let sql = format!("SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ? FOR UPDATE");
    let leave = sqlx::query_as::<_, LeaveRequest>(&sql)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Leave request not found"))?;

    RequestStatus::parse_stored(&leave.status)?.ensure_transition(to)?;

    if to == RequestStatus::Cancelled {
        if leave.user_id != auth.user_id {
            return Err(ApiError::forbidden("Only the requester can cancel"));
        }
    } else {
        ensure_can_review(auth, pool, leave.user_id).await?;
    }

    sqlx::query(
        r#"
        UPDATE leave_requests
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

    info!(id, by = auth.user_id, %to, "Leave request decided");

    if to != RequestStatus::Cancelled {
        notify(
            pool,
            leave.user_id,
            NotificationKind::Leave,
            &format!("Cuti {}", to.verdict()),
            &format!(
                "Pengajuan cuti {} s/d {} telah {}",
                leave.start_date,
                leave.end_date,
                to.verdict()
            ),
        )
        .await;
    }

    fetch_leave(pool, id).await
}

/// Approve a leave request
#[utoipa::path(
    put,
    path = "/api/cuti/{id}/approve",
    params(("id", Path, description = "Leave request ID")),
    request_body(content = ReviewReq, description = "Optional note"),
    responses(
        (status = 200, body = LeaveRequest),
        (status = 400, description = "INVALID_STATE"),
        (status = 403, description = "Not the requester's reviewer"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Cuti"
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Option<web::Json<ReviewReq>>,
) -> ApiResult<HttpResponse> {
    let review = ReviewReq::from_body(body)?;
    let leave = decide(
        &auth,
        pool.get_ref(),
        path.into_inner(),
        RequestStatus::Approved,
        review.note,
    )
    .await?;
    Ok(HttpResponse::Ok().json(leave))
}

/// Reject a leave request
#[utoipa::path(
    put,
    path = "/api/cuti/{id}/reject",
    params(("id", Path, description = "Leave request ID")),
    request_body(content = ReviewReq, description = "Optional note"),
    responses(
        (status = 200, body = LeaveRequest),
        (status = 400, description = "INVALID_STATE"),
        (status = 403, description = "Not the requester's reviewer"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Cuti"
)]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Option<web::Json<ReviewReq>>,
) -> ApiResult<HttpResponse> {
    let review = ReviewReq::from_body(body)?;
    let leave = decide(
        &auth,
        pool.get_ref(),
        path.into_inner(),
        RequestStatus::Rejected,
        review.note,
    )
    .await?;
    Ok(HttpResponse::Ok().json(leave))
}

/// Cancel own pending request
#[utoipa::path(
    put,
    path = "/api/cuti/{id}/cancel",
    params(("id", Path, description = "Leave request ID")),
    responses(
        (status = 200, body = LeaveRequest),
        (status = 400, description = "INVALID_STATE"),
        (status = 403, description = "Only the requester can cancel")
    ),
    security(("bearer_auth" = [])),
    tag = "Cuti"
)]
pub async fn cancel_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let leave = decide(
        &auth,
        pool.get_ref(),
        path.into_inner(),
        RequestStatus::Cancelled,
        None,
    )
    .await?;
    Ok(HttpResponse::Ok().json(leave))
}
