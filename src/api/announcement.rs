use actix_web::{HttpResponse, web};
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::notification::notify_all_active,
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    model::{announcement::Announcement, notification::NotificationKind},
    utils::db_utils::{Column, ColumnKind, build_update_sql, execute_update},
};

const ANNOUNCEMENT_COLUMNS: &str =
    "id, title, body, is_active, starts_at, ends_at, created_by, created_at";

const UPDATABLE: &[Column] = &[
    Column::new("title", ColumnKind::Text),
    Column::new("body", ColumnKind::Text),
    Column::new("is_active", ColumnKind::Bool),
    Column::nullable("starts_at", ColumnKind::DateTime),
    Column::nullable("ends_at", ColumnKind::DateTime),
];

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "title": "Stock opname",
    "body": "Outlet tutup jam 18:00 hari Jumat.",
    "starts_at": "2026-03-06T00:00:00",
    "ends_at": "2026-03-07T00:00:00"
}))]
pub struct CreateAnnouncement {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub body: String,
    pub starts_at: Option<NaiveDateTime>,
    pub ends_at: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnnouncementQuery {
    /// Include inactive and out-of-window entries (HR/Admin)
    pub all: Option<bool>,
}

fn check_window(starts_at: Option<NaiveDateTime>, ends_at: Option<NaiveDateTime>) -> ApiResult<()> {
    if let (Some(start), Some(end)) = (starts_at, ends_at) {
        if end <= start {
            return Err(ApiError::validation("ends_at must be after starts_at"));
        }
    }
    Ok(())
}

async fn fetch_announcement(pool: &MySqlPool, id: u64) -> ApiResult<Announcement> {
    let sql = format!("SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements WHERE id = ?");
    sqlx::query_as::<_, Announcement>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Announcement not found"))
}

/// Announcements visible at `now`, newest first.
pub async fn visible_announcements(
    pool: &MySqlPool,
    now: NaiveDateTime,
    limit: u32,
) -> Result<Vec<Announcement>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {ANNOUNCEMENT_COLUMNS}
        FROM announcements
        WHERE is_active = 1
          AND (starts_at IS NULL OR starts_at <= ?)
          AND (ends_at IS NULL OR ends_at > ?)
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#
    );
    sqlx::query_as::<_, Announcement>(&sql)
        .bind(now)
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// Publish an announcement; every active user is notified
#[utoipa::path(
    post,
    path = "/api/announcements",
    request_body = CreateAnnouncement,
    responses((status = 201, body = Announcement), (status = 400)),
    security(("bearer_auth" = [])),
    tag = "Announcements"
)]
#[instrument(skip(pool, payload), fields(author = auth.user_id))]
pub async fn create_announcement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateAnnouncement>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    payload.validate()?;
    check_window(payload.starts_at, payload.ends_at)?;

    let id = sqlx::query(
        r#"
        INSERT INTO announcements (title, body, starts_at, ends_at, created_by)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.title.trim())
    .bind(&payload.body)
    .bind(payload.starts_at)
    .bind(payload.ends_at)
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    match notify_all_active(
        pool.get_ref(),
        NotificationKind::Announcement,
        payload.title.trim(),
        &payload.body,
    )
    .await
    {
        Ok(recipients) => info!(announcement_id = id, recipients, "Announcement published"),
        Err(e) => warn!(error = %e, announcement_id = id, "Announcement fan-out failed"),
    }

    Ok(HttpResponse::Created().json(fetch_announcement(pool.get_ref(), id).await?))
}

/// Announcements
#[utoipa::path(
    get,
    path = "/api/announcements",
    params(AnnouncementQuery),
    responses((status = 200, body = [Announcement])),
    security(("bearer_auth" = [])),
    tag = "Announcements"
)]
pub async fn list_announcements(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<AnnouncementQuery>,
) -> ApiResult<HttpResponse> {
    if query.all.unwrap_or(false) && auth.role.is_hr_or_admin() {
        let sql = format!(
            "SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements ORDER BY created_at DESC, id DESC LIMIT 200"
        );
        let all = sqlx::query_as::<_, Announcement>(&sql)
            .fetch_all(pool.get_ref())
            .await?;
        return Ok(HttpResponse::Ok().json(all));
    }

    let visible = visible_announcements(pool.get_ref(), config.local_now(), 50).await?;
    Ok(HttpResponse::Ok().json(visible))
}

/// Partial update
#[utoipa::path(
    put,
    path = "/api/announcements/{id}",
    params(("id", Path, description = "Announcement ID")),
    request_body(content = Object, example = json!({ "is_active": false })),
    responses((status = 200, body = Announcement), (status = 400), (status = 404)),
    security(("bearer_auth" = [])),
    tag = "Announcements"
)]
#[instrument(skip(pool, body), fields(author = auth.user_id))]
pub async fn update_announcement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let current = fetch_announcement(pool.get_ref(), id).await?;
    let update = build_update_sql("announcements", &body, UPDATABLE, "id", id)?;

    let window = |key: &str, fallback: Option<NaiveDateTime>| match body.get(key) {
        Some(Value::Null) => None,
        Some(Value::String(raw)) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok(),
        _ => fallback,
    };
    check_window(
        window("starts_at", current.starts_at),
        window("ends_at", current.ends_at),
    )?;

    execute_update(pool.get_ref(), update).await?;
    info!(announcement_id = id, "Announcement updated");
    Ok(HttpResponse::Ok().json(fetch_announcement(pool.get_ref(), id).await?))
}

/// Delete announcement
#[utoipa::path(
    delete,
    path = "/api/announcements/{id}",
    params(("id", Path, description = "Announcement ID")),
    responses((status = 204, description = "Deleted"), (status = 404)),
    security(("bearer_auth" = [])),
    tag = "Announcements"
)]
pub async fn delete_announcement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM announcements WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Announcement not found"));
    }

    info!(announcement_id = id, "Announcement deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn window_must_move_forward() {
        assert!(check_window(Some(at(2)), Some(at(1))).is_err());
        assert!(check_window(Some(at(2)), Some(at(2))).is_err());
        assert!(check_window(Some(at(1)), Some(at(2))).is_ok());
        assert!(check_window(None, Some(at(2))).is_ok());
    }
}
