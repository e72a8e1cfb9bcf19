use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::access::ensure_can_view,
    auth::{
        auth::AuthUser,
        password::{hash_password, verify_password},
    },
    error::{ApiError, ApiResult, is_unique_violation},
    model::{
        role::Role,
        user::{USER_COLUMNS, User, UserProfile},
    },
    utils::{
        db_utils::{Column, ColumnKind, SqlValue, build_update_sql, execute_update},
        pagination::{ListSql, UserPage},
        username_index,
    },
};

/// Columns HR may change through `PUT /api/users/{id}`.
const UPDATABLE: &[Column] = &[
    Column::new("full_name", ColumnKind::Text),
    Column::nullable("nik", ColumnKind::Text),
    Column::new("role_id", ColumnKind::Int),
    Column::nullable("outlet_id", ColumnKind::Int),
    Column::nullable("supervisor_id", ColumnKind::Int),
    Column::new("base_salary", ColumnKind::Float),
    Column::new("is_active", ColumnKind::Bool),
];

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "username": "sari",
    "password": "rahasia123",
    "full_name": "Sari Wulandari",
    "nik": "3201010101900001",
    "role": "employee",
    "outlet_id": 2,
    "supervisor_id": 3,
    "base_salary": 4500000.0
}))]
pub struct CreateUser {
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(length(max = 32))]
    pub nik: Option<String>,
    pub role: Role,
    pub outlet_id: Option<u64>,
    pub supervisor_id: Option<u64>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub base_salary: f64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    pub role: Option<Role>,
    pub outlet_id: Option<u64>,
    pub is_active: Option<bool>,
    /// Matches username, full name or NIK
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UsernameQuery {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsernameAvailability {
    pub username: String,
    pub available: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePassword {
    pub current_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

async fn fetch_user(pool: &MySqlPool, id: u64) -> ApiResult<User> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

async fn ensure_active_user(pool: &MySqlPool, id: u64, what: &str) -> ApiResult<()> {
    let active = sqlx::query_scalar::<_, bool>("SELECT is_active FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    match active {
        Some(true) => Ok(()),
        _ => Err(ApiError::validation(format!("{what} must be an active user"))),
    }
}

async fn ensure_outlet(pool: &MySqlPool, id: u64) -> ApiResult<()> {
    let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM outlets WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    if found == 0 {
        return Err(ApiError::validation("Unknown outlet"));
    }
    Ok(())
}

/// Checks the references in a partial update before it reaches SQL.
async fn check_update_refs(pool: &MySqlPool, user_id: u64, payload: &Value) -> ApiResult<()> {
    if let Some(role_id) = payload.get("role_id").filter(|v| !v.is_null()) {
        let valid = role_id
            .as_u64()
            .and_then(|id| u8::try_from(id).ok())
            .and_then(Role::from_id)
            .is_some();
        if !valid {
            return Err(ApiError::validation("Unknown role_id"));
        }
    }
    if let Some(supervisor_id) = payload.get("supervisor_id").and_then(Value::as_u64) {
        if supervisor_id == user_id {
            return Err(ApiError::validation("A user cannot supervise themselves"));
        }
        ensure_active_user(pool, supervisor_id, "supervisor_id").await?;
    }
    if let Some(outlet_id) = payload.get("outlet_id").and_then(Value::as_u64) {
        ensure_outlet(pool, outlet_id).await?;
    }
    Ok(())
}

/// Create user
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUser,
    responses(
        (status = 201, body = UserProfile),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Username taken")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(pool, payload), fields(admin = auth.user_id, username = %payload.username))]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateUser>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    payload.validate()?;
    // HR cannot mint admins
    if payload.role == Role::Admin && auth.role != Role::Admin {
        return Err(ApiError::forbidden("Only admins can create admins"));
    }

    let username = username_index::normalize(&payload.username);
    let available = username_index::is_available(&username, pool.get_ref())
        .await
        .map_err(ApiError::internal)?;
    if !available {
        return Err(ApiError::conflict("Username already taken"));
    }
    if let Some(supervisor_id) = payload.supervisor_id {
        ensure_active_user(pool.get_ref(), supervisor_id, "supervisor_id").await?;
    }
    if let Some(outlet_id) = payload.outlet_id {
        ensure_outlet(pool.get_ref(), outlet_id).await?;
    }

    let password_hash = hash_password(&payload.password).map_err(ApiError::internal)?;

    let result = sqlx::query(
        r#"
        INSERT INTO users
            (username, password_hash, full_name, nik, role_id, outlet_id, supervisor_id, base_salary)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&username)
    .bind(&password_hash)
    .bind(payload.full_name.trim())
    .bind(&payload.nik)
    .bind(payload.role.id())
    .bind(payload.outlet_id)
    .bind(payload.supervisor_id)
    .bind(payload.base_salary)
    .execute(pool.get_ref())
    .await;

    let id = match result {
        Ok(done) => done.last_insert_id(),
        Err(e) if is_unique_violation(&e) => {
            username_index::mark_taken(&username).await;
            return Err(ApiError::conflict("Username already taken"));
        }
        Err(e) => return Err(e.into()),
    };

    username_index::mark_taken(&username).await;
    info!(user_id = id, role = %payload.role, "User created");

    let user = fetch_user(pool.get_ref(), id).await?;
    Ok(HttpResponse::Created().json(UserProfile::from(user)))
}

/// List users
#[utoipa::path(
    get,
    path = "/api/users",
    params(UserQuery),
    responses((status = 200, body = UserPage)),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let mut list = ListSql::new(USER_COLUMNS, "users", "id DESC");
    if let Some(role) = query.role {
        list.push("role_id = ?", SqlValue::U64(u64::from(role.id())));
    }
    if let Some(outlet_id) = query.outlet_id {
        list.push("outlet_id = ?", SqlValue::U64(outlet_id));
    }
    if let Some(is_active) = query.is_active {
        list.push("is_active = ?", SqlValue::Bool(is_active));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let like = format!("%{search}%");
        list.conditions
            .push("(username LIKE ? OR full_name LIKE ? OR nik LIKE ?)".to_string());
        list.values.extend([
            SqlValue::String(like.clone()),
            SqlValue::String(like.clone()),
            SqlValue::String(like),
        ]);
    }

    let page = list
        .fetch_page::<User>(pool.get_ref(), query.page, query.per_page)
        .await?
        .map(UserProfile::from);
    Ok(HttpResponse::Ok().json(page))
}

/// Get user by ID
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id", Path, description = "User ID")),
    responses((status = 200, body = UserProfile), (status = 404)),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    if !auth.role.is_hr_or_admin() {
        ensure_can_view(&auth, pool.get_ref(), id).await?;
    }
    let user = fetch_user(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(UserProfile::from(user)))
}

/// Partial update
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id", Path, description = "User ID")),
    request_body(content = Object, example = json!({ "outlet_id": 3, "base_salary": 4800000.0 })),
    responses(
        (status = 200, body = UserProfile),
        (status = 400, description = "Unknown or invalid field"),
        (status = 404)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(pool, body), fields(admin = auth.user_id))]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let target = fetch_user(pool.get_ref(), id).await?;
    let touches_admin = target.role_id == Role::Admin.id()
        || body.get("role_id").and_then(Value::as_u64) == Some(u64::from(Role::Admin.id()));
    if touches_admin && auth.role != Role::Admin {
        return Err(ApiError::forbidden("Only admins can change admin accounts"));
    }

    check_update_refs(pool.get_ref(), id, &body).await?;
    let update = build_update_sql("users", &body, UPDATABLE, "id", id)?;
    execute_update(pool.get_ref(), update).await?;
    info!(user_id = id, "User updated");

    let user = fetch_user(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(UserProfile::from(user)))
}

/// Deactivate user; their refresh tokens are revoked
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id", Path, description = "User ID")),
    responses(
        (status = 204, description = "Deactivated"),
        (status = 400, description = "Cannot deactivate yourself"),
        (status = 404)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(pool), fields(admin = auth.user_id))]
pub async fn deactivate_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();
    if id == auth.user_id {
        return Err(ApiError::validation("You cannot deactivate your own account"));
    }

    let target = fetch_user(pool.get_ref(), id).await?;
    if target.role_id == Role::Admin.id() && auth.role != Role::Admin {
        return Err(ApiError::forbidden("Only admins can deactivate admins"));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let revoked = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE user_id = ? AND revoked = 0")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    tx.commit().await?;

    info!(user_id = id, revoked, "User deactivated");
    Ok(HttpResponse::NoContent().finish())
}

/// Username availability check
#[utoipa::path(
    get,
    path = "/api/users/username-available",
    params(UsernameQuery),
    responses((status = 200, body = UsernameAvailability)),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn username_available(
    pool: web::Data<MySqlPool>,
    query: web::Query<UsernameQuery>,
) -> ApiResult<HttpResponse> {
    let username = username_index::normalize(&query.username);
    if username.is_empty() {
        return Err(ApiError::validation("username is required"));
    }
    let available = username_index::is_available(&username, pool.get_ref())
        .await
        .map_err(ApiError::internal)?;
    Ok(HttpResponse::Ok().json(UsernameAvailability {
        username,
        available,
    }))
}

/// Change own password; other sessions are logged out
#[utoipa::path(
    put,
    path = "/api/users/me/password",
    request_body = ChangePassword,
    responses(
        (status = 200, body = Object, example = json!({ "message": "Password changed" })),
        (status = 401, description = "Current password wrong")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(pool, payload), fields(user_id = auth.user_id))]
pub async fn change_password(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<ChangePassword>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let user = fetch_user(pool.get_ref(), auth.user_id).await?;

    if verify_password(&payload.current_password, &user.password_hash).is_err() {
        warn!("Password change with wrong current password");
        return Err(ApiError::unauthorized("Current password is incorrect"));
    }
    let password_hash = hash_password(&payload.new_password).map_err(ApiError::internal)?;

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE user_id = ? AND revoked = 0")
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!("Password changed");
    Ok(HttpResponse::Ok().json(json!({ "message": "Password changed" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_not_an_updatable_column() {
        let err = build_update_sql("users", &json!({ "password_hash": "x" }), UPDATABLE, "id", 1)
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ValidationError);
    }

    #[test]
    fn allowed_fields_build_an_update() {
        let update = build_update_sql(
            "users",
            &json!({ "outlet_id": null, "base_salary": 5000000.0 }),
            UPDATABLE,
            "id",
            4,
        )
        .unwrap();
        assert!(update.sql.starts_with("UPDATE users SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        assert_eq!(update.values.len(), 3);
        assert_eq!(update.values[2], SqlValue::U64(4));
    }

    #[test]
    fn short_passwords_fail_validation() {
        let req = CreateUser {
            username: "sari".into(),
            password: "short".into(),
            full_name: "Sari".into(),
            nik: None,
            role: Role::Employee,
            outlet_id: None,
            supervisor_id: None,
            base_salary: 0.0,
        };
        assert!(req.validate().is_err());
    }
}
