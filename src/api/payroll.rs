use std::str::FromStr;

use actix_web::{HttpResponse, http::header, web};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{MySql, MySqlPool, Transaction};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::notification::notify,
    auth::auth::AuthUser,
    config::Config,
    domain::{
        leave::days_within,
        payroll::{SlipFigures, period_bounds},
    },
    error::{ApiError, ApiResult},
    model::{
        notification::NotificationKind,
        payroll::{PayrollSlip, SLIP_COLUMNS, SlipStatus},
    },
    utils::{
        db_utils::SqlValue,
        pagination::{ListSql, PayrollPage},
        payslip_pdf::{self, SlipHolder},
    },
};

#[derive(Debug, Deserialize, ToSchema)]
#[schema(example = json!({
    "user_id": 7,
    "period": "2026-03-01",
    "allowance": 300000.0,
    "overtime": 150000.0,
    "bonus": 0.0,
    "deductions": 50000.0
}))]
pub struct CreateSlip {
    pub user_id: u64,
    /// Any day in the pay month
    pub period: NaiveDate,
    /// Defaults to the employee's base salary
    pub base_salary: Option<f64>,
    #[serde(default)]
    pub allowance: f64,
    #[serde(default)]
    pub overtime: f64,
    #[serde(default)]
    pub bonus: f64,
    #[serde(default)]
    pub deductions: f64,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateSlip {
    pub base_salary: Option<f64>,
    pub allowance: Option<f64>,
    pub overtime: Option<f64>,
    pub bonus: Option<f64>,
    pub deductions: Option<f64>,
}

impl UpdateSlip {
    fn apply(&self, current: SlipFigures) -> SlipFigures {
        SlipFigures {
            base_salary: self.base_salary.unwrap_or(current.base_salary),
            allowance: self.allowance.unwrap_or(current.allowance),
            overtime: self.overtime.unwrap_or(current.overtime),
            bonus: self.bonus.unwrap_or(current.bonus),
            deductions: self.deductions.unwrap_or(current.deductions),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PayrollQuery {
    pub user_id: Option<u64>,
    /// Any day in the pay month
    pub period: Option<NaiveDate>,
    /// draft or published
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MinePayrollQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Attendance counts printed on a slip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub present: i64,
    pub late: i64,
    pub absent: i64,
    pub leave: i64,
}

async fn fetch_slip(pool: &MySqlPool, id: u64) -> ApiResult<PayrollSlip> {
    let sql = format!("SELECT {SLIP_COLUMNS} FROM payroll_slips WHERE id = ?");
    sqlx::query_as::<_, PayrollSlip>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Payroll slip not found"))
}

async fn locked_slip(tx: &mut Transaction<'_, MySql>, id: u64) -> ApiResult<PayrollSlip> {
    let sql = format!("SELECT {SLIP_COLUMNS} FROM payroll_slips WHERE id = ? FOR UPDATE");
    sqlx::query_as::<_, PayrollSlip>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Payroll slip not found"))
}

/// Counts attendance and approved leave of `user_id` inside the month of `period`.
async fn tally(conn: &mut sqlx::MySqlConnection, user_id: u64, period: NaiveDate) -> ApiResult<Tally> {
    let (first, last) = period_bounds(period);

    let (present, late, absent) = sqlx::query_as::<_, (i64, i64, i64)>(
        r#"
        SELECT
            CAST(COALESCE(SUM(check_in_at IS NOT NULL), 0) AS SIGNED),
            CAST(COALESCE(SUM(check_in_at IS NOT NULL AND late_minutes > 0), 0) AS SIGNED),
            CAST(COALESCE(SUM(status = 'mangkir'), 0) AS SIGNED)
        FROM attendance
        WHERE user_id = ? AND date BETWEEN ? AND ?
        "#,
    )
    .bind(user_id)
    .bind(first)
    .bind(last)
    .fetch_one(&mut *conn)
    .await?;

    let leaves = sqlx::query_as::<_, (NaiveDate, NaiveDate)>(
        r#"
        SELECT start_date, end_date
        FROM leave_requests
        WHERE user_id = ? AND status = 'approved' AND start_date <= ? AND end_date >= ?
        "#,
    )
    .bind(user_id)
    .bind(last)
    .bind(first)
    .fetch_all(&mut *conn)
    .await?;

    let leave = leaves
        .into_iter()
        .map(|(start, end)| days_within(start, end, first, last))
        .sum();

    Ok(Tally {
        present,
        late,
        absent,
        leave,
    })
}

/// Create a draft slip
#[utoipa::path(
    post,
    path = "/api/payroll",
    request_body = CreateSlip,
    responses(
        (status = 201, body = PayrollSlip),
        (status = 409, description = "Slip already exists for the period")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
#[instrument(skip(pool, payload), fields(hr = auth.user_id))]
pub async fn create_slip(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateSlip>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let payload = payload.into_inner();
    let (period, _) = period_bounds(payload.period);

    let mut tx = pool.begin().await?;

    let default_salary =
        sqlx::query_scalar::<_, f64>("SELECT base_salary FROM users WHERE id = ? FOR UPDATE")
            .bind(payload.user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

    let figures = SlipFigures {
        base_salary: payload.base_salary.unwrap_or(default_salary),
        allowance: payload.allowance,
        overtime: payload.overtime,
        bonus: payload.bonus,
        deductions: payload.deductions,
    };
    figures.validate()?;

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM payroll_slips WHERE user_id = ? AND period = ?",
    )
    .bind(payload.user_id)
    .bind(period)
    .fetch_one(&mut *tx)
    .await?;
    if exists > 0 {
        return Err(ApiError::conflict("A slip for this period already exists"));
    }

    let counts = tally(&mut tx, payload.user_id, period).await?;

    let id = sqlx::query(
        r#"
        INSERT INTO payroll_slips
            (user_id, period, base_salary, allowance, overtime, bonus, deductions, net_salary,
             days_present, days_late, days_absent, days_leave, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.user_id)
    .bind(period)
    .bind(figures.base_salary)
    .bind(figures.allowance)
    .bind(figures.overtime)
    .bind(figures.bonus)
    .bind(figures.deductions)
    .bind(figures.net())
    .bind(counts.present)
    .bind(counts.late)
    .bind(counts.absent)
    .bind(counts.leave)
    .bind(SlipStatus::Draft.as_ref())
    .execute(&mut *tx)
    .await?
    .last_insert_id();

    tx.commit().await?;
    info!(slip_id = id, user_id = payload.user_id, %period, "Payroll slip drafted");

    let slip = fetch_slip(pool.get_ref(), id).await?;
    Ok(HttpResponse::Created().json(slip))
}

/// Change figures of a draft slip; attendance counts are refreshed too
#[utoipa::path(
    put,
    path = "/api/payroll/{id}",
    request_body = UpdateSlip,
    params(("id", Path, description = "Slip ID")),
    responses(
        (status = 200, body = PayrollSlip),
        (status = 400, description = "Slip already published"),
        (status = 404)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
#[instrument(skip(pool, payload), fields(hr = auth.user_id))]
pub async fn update_slip(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateSlip>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let slip = locked_slip(&mut tx, id).await?;
    if slip.is_published() {
        return Err(ApiError::invalid_state("Published slips cannot be changed"));
    }

    let figures = payload.apply(slip.figures());
    figures.validate()?;
    let counts = tally(&mut tx, slip.user_id, slip.period).await?;

    sqlx::query(
        r#"
        UPDATE payroll_slips
        SET base_salary = ?, allowance = ?, overtime = ?, bonus = ?, deductions = ?,
            net_salary = ?, days_present = ?, days_late = ?, days_absent = ?, days_leave = ?
        WHERE id = ?
        "#,
    )
    .bind(figures.base_salary)
    .bind(figures.allowance)
    .bind(figures.overtime)
    .bind(figures.bonus)
    .bind(figures.deductions)
    .bind(figures.net())
    .bind(counts.present)
    .bind(counts.late)
    .bind(counts.absent)
    .bind(counts.leave)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(slip_id = id, "Payroll slip updated");

    Ok(HttpResponse::Ok().json(fetch_slip(pool.get_ref(), id).await?))
}

/// Publish a draft slip to its employee
#[utoipa::path(
    put,
    path = "/api/payroll/{id}/publish",
    params(("id", Path, description = "Slip ID")),
    responses(
        (status = 200, body = PayrollSlip),
        (status = 400, description = "Already published"),
        (status = 404)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
#[instrument(skip(pool), fields(hr = auth.user_id))]
pub async fn publish_slip(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let result = sqlx::query("UPDATE payroll_slips SET status = ? WHERE id = ? AND status = ?")
        .bind(SlipStatus::Published.as_ref())
        .bind(id)
        .bind(SlipStatus::Draft.as_ref())
        .execute(pool.get_ref())
        .await?;

    let slip = fetch_slip(pool.get_ref(), id).await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::invalid_state("Slip is already published"));
    }

    info!(slip_id = id, user_id = slip.user_id, "Payroll slip published");
    notify(
        pool.get_ref(),
        slip.user_id,
        NotificationKind::Payroll,
        "Slip gaji tersedia",
        &format!(
            "Slip gaji periode {} sudah dapat diunduh.",
            payslip_pdf::period_label(&slip)
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(slip))
}

/// All slips (HR)
#[utoipa::path(
    get,
    path = "/api/payroll",
    params(PayrollQuery),
    responses((status = 200, body = PayrollPage)),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn list_slips(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PayrollQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let mut list = ListSql::new(SLIP_COLUMNS, "payroll_slips", "period DESC, id DESC");
    if let Some(user_id) = query.user_id {
        list.push("user_id = ?", SqlValue::U64(user_id));
    }
    if let Some(period) = query.period {
        list.push("period = ?", SqlValue::Date(period_bounds(period).0));
    }
    if let Some(status) = query.status.as_deref() {
        let status = SlipStatus::from_str(status)
            .map_err(|_| ApiError::validation("status must be draft or published"))?;
        list.push("status = ?", SqlValue::String(status.as_ref().to_string()));
    }

    let page = list
        .fetch_page::<PayrollSlip>(pool.get_ref(), query.page, query.per_page)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Caller's published slips
#[utoipa::path(
    get,
    path = "/api/payroll/mine",
    params(MinePayrollQuery),
    responses((status = 200, body = PayrollPage)),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn my_slips(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MinePayrollQuery>,
) -> ApiResult<HttpResponse> {
    let mut list = ListSql::new(SLIP_COLUMNS, "payroll_slips", "period DESC");
    list.push("user_id = ?", SqlValue::U64(auth.user_id));
    list.push(
        "status = ?",
        SqlValue::String(SlipStatus::Published.as_ref().to_string()),
    );

    let page = list
        .fetch_page::<PayrollSlip>(pool.get_ref(), query.page, query.per_page)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// HR sees every slip; employees only their published ones.
async fn visible_slip(auth: &AuthUser, pool: &MySqlPool, id: u64) -> ApiResult<PayrollSlip> {
    let slip = fetch_slip(pool, id).await?;
    if auth.role.is_hr_or_admin() || (slip.user_id == auth.user_id && slip.is_published()) {
        Ok(slip)
    } else {
        // Drafts of others do not exist from the caller's point of view.
        Err(ApiError::not_found("Payroll slip not found"))
    }
}

/// One slip
#[utoipa::path(
    get,
    path = "/api/payroll/{id}",
    params(("id", Path, description = "Slip ID")),
    responses((status = 200, body = PayrollSlip), (status = 404)),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn get_slip(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let slip = visible_slip(&auth, pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(slip))
}

/// Slip as PDF
#[utoipa::path(
    get,
    path = "/api/payroll/{id}/pdf",
    params(("id", Path, description = "Slip ID")),
    responses(
        (status = 200, description = "PDF document", content_type = "application/pdf"),
        (status = 404)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
#[instrument(skip(pool, config), fields(user_id = auth.user_id))]
pub async fn slip_pdf(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let slip = visible_slip(&auth, pool.get_ref(), path.into_inner()).await?;

    let holder = sqlx::query_as::<_, SlipHolder>(
        r#"
        SELECT u.full_name, u.nik, o.name AS outlet_name
        FROM users u
        LEFT JOIN outlets o ON o.id = u.outlet_id
        WHERE u.id = ?
        "#,
    )
    .bind(slip.user_id)
    .fetch_one(pool.get_ref())
    .await?;

    let filename = format!("slip-gaji-{}-{}.pdf", slip.user_id, slip.period.format("%Y-%m"));
    let fonts_dir = config.fonts_dir.clone();
    let family = config.pdf_font_family.clone();
    let bytes = web::block(move || payslip_pdf::render(&slip, &holder, &fonts_dir, &family))
        .await
        .map_err(ApiError::internal)??;

    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_update_keeps_missing_figures() {
        let current = SlipFigures {
            base_salary: 4_000_000.0,
            allowance: 200_000.0,
            overtime: 0.0,
            bonus: 0.0,
            deductions: 10_000.0,
        };
        let update = UpdateSlip {
            bonus: Some(500_000.0),
            ..UpdateSlip::default()
        };
        let next = update.apply(current);
        assert_eq!(next.base_salary, 4_000_000.0);
        assert_eq!(next.bonus, 500_000.0);
        assert_eq!(next.net(), 4_690_000.0);
    }
}
