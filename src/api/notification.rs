use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{debug, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::notification::{Notification, NotificationKind},
    utils::{
        db_utils::SqlValue,
        pagination::{ListSql, NotificationPage},
    },
};

const NOTIFICATION_COLUMNS: &str = "id, user_id, title, body, kind, is_read, created_at";

/// Stores a notification for `user_id`. Failures are logged, not returned.
pub async fn notify(
    pool: &MySqlPool,
    user_id: u64,
    kind: NotificationKind,
    title: &str,
    body: &str,
) {
    let result = sqlx::query(
        "INSERT INTO notifications (user_id, title, body, kind) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(title)
    .bind(body)
    .bind(kind.as_ref())
    .execute(pool)
    .await;

    match result {
        Ok(_) => debug!(user_id, %kind, "Notification stored"),
        Err(e) => warn!(error = %e, user_id, %kind, "Failed to store notification"),
    }
}

/// One notification per active user; returns how many were written.
pub async fn notify_all_active(
    pool: &MySqlPool,
    kind: NotificationKind,
    title: &str,
    body: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, title, body, kind)
        SELECT id, ?, ?, ? FROM users WHERE is_active = 1
        "#,
    )
    .bind(title)
    .bind(body)
    .bind(kind.as_ref())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn unread_count_for(pool: &MySqlPool, user_id: u64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Only unread notifications
    pub unread_only: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "unread": 3 }))]
pub struct UnreadCount {
    pub unread: i64,
}

/// Caller's notifications, newest first
#[utoipa::path(
    get,
    path = "/api/notifications",
    params(NotificationQuery),
    responses((status = 200, body = NotificationPage)),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn list_notifications(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<NotificationQuery>,
) -> ApiResult<HttpResponse> {
    let mut list = ListSql::new(NOTIFICATION_COLUMNS, "notifications", "created_at DESC, id DESC");
    list.push("user_id = ?", SqlValue::U64(auth.user_id));
    if query.unread_only.unwrap_or(false) {
        list.conditions.push("is_read = 0".to_string());
    }

    let page = list
        .fetch_page::<Notification>(pool.get_ref(), query.page, query.per_page)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Unread badge count
#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    responses((status = 200, body = UnreadCount)),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn unread_count(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let unread = unread_count_for(pool.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(UnreadCount { unread }))
}

/// Mark one notification read
#[utoipa::path(
    put,
    path = "/api/notifications/{id}/read",
    params(("id", Path, description = "Notification ID")),
    responses(
        (status = 204, description = "Marked read"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_read(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE id = ? AND user_id = ?",
    )
    .bind(id)
    .bind(auth.user_id)
    .fetch_one(pool.get_ref())
    .await?;

    if exists == 0 {
        return Err(ApiError::not_found("Notification not found"));
    }

    sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::NoContent().finish())
}

/// Mark everything read
#[utoipa::path(
    put,
    path = "/api/notifications/read-all",
    responses((status = 200, body = Object, example = json!({ "updated": 4 }))),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_all_read(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "updated": result.rows_affected() })))
}
