use actix_web::{HttpRequest, HttpResponse, Responder, web};
use chrono::{DateTime, NaiveDateTime};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::{
    auth::{
        auth::{AuthUser, bearer_token},
        jwt::{TokenSubject, generate_access_token, generate_refresh_token, verify_token},
        password::verify_password,
    },
    config::Config,
    error::{ApiError, ApiResult},
    model::user::{USER_COLUMNS, User, UserProfile},
    models::{Claims, LoginReqDto, LoginResponse, TokenPair, TokenType},
};

/// UTC expiry of a refresh token as stored in `refresh_tokens`.
fn refresh_expiry(claims: &Claims) -> ApiResult<NaiveDateTime> {
    i64::try_from(claims.exp)
        .ok()
        .and_then(|exp| DateTime::from_timestamp(exp, 0))
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| ApiError::internal("refresh token expiry out of range"))
}

/// Issues a fresh access/refresh pair and records the refresh token's jti.
async fn issue_pair(
    subject: &TokenSubject,
    conn: &mut MySqlConnection,
    config: &Config,
) -> ApiResult<TokenPair> {
    let access_token =
        generate_access_token(subject, &config.jwt_secret, config.access_token_ttl)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(subject, &config.jwt_secret, config.refresh_token_ttl)?;
    let expires_at = refresh_expiry(&refresh_claims)?;

    debug!(user_id = subject.user_id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(subject.user_id)
    .bind(&refresh_claims.jti)
    .bind(expires_at)
    .execute(conn)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Verifies the bearer token on `req` is a refresh token.
fn refresh_claims(req: &HttpRequest, config: &Config) -> ApiResult<Claims> {
    let token = bearer_token(req).ok_or_else(|| ApiError::unauthorized("No token"))?;
    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;
    if claims.token_type != TokenType::Refresh {
        return Err(ApiError::unauthorized("Refresh token required"));
    }
    Ok(claims)
}

/// Login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    info!("Login request received");
    user.validate()?;

    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?");
    let db_user = sqlx::query_as::<_, User>(&sql)
        .bind(user.username.trim().to_lowercase())
        .fetch_optional(pool.get_ref())
        .await?;

    let Some(db_user) = db_user else {
        info!("Invalid credentials: user not found");
        return Err(ApiError::unauthorized("Invalid credentials"));
    };

    if !db_user.is_active {
        info!(user_id = db_user.id, "Login refused: account inactive");
        return Err(ApiError::unauthorized("Account is inactive"));
    }

    if let Err(e) = verify_password(&user.password, &db_user.password_hash) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let subject = TokenSubject {
        user_id: db_user.id,
        username: db_user.username.clone(),
        role: db_user.role_id,
    };
    let mut conn = pool.acquire().await?;
    let pair = issue_pair(&subject, &mut conn, &config).await?;
    drop(conn);

    // non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        warn!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = db_user.id, "Login successful");

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user: UserProfile::from(db_user),
    }))
}

/// Rotate the token pair. The presented refresh token is revoked.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Refresh token invalid, expired or revoked")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let claims = refresh_claims(&req, &config)?;

    // revoke and reissue commit together; a failed insert keeps the old token
    let mut tx = pool.begin().await?;

    // a concurrent refresh with the same token loses here
    let revoked = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = 1
        WHERE jti = ? AND revoked = 0 AND expires_at > UTC_TIMESTAMP()
        "#,
    )
    .bind(&claims.jti)
    .execute(&mut *tx)
    .await?;

    if revoked.rows_affected() == 0 {
        info!(user_id = claims.user_id, "Refresh refused: token unknown or revoked");
        return Err(ApiError::unauthorized("Refresh token revoked"));
    }

    // role and active flag may have changed since the token was issued
    let current = sqlx::query_as::<_, (u8, bool)>("SELECT role_id, is_active FROM users WHERE id = ?")
        .bind(claims.user_id)
        .fetch_optional(&mut *tx)
        .await?;

    let role = match current {
        Some((role, true)) => role,
        _ => return Err(ApiError::unauthorized("Account is inactive")),
    };

    let subject = TokenSubject {
        user_id: claims.user_id,
        username: claims.sub,
        role,
    };
    let pair = issue_pair(&subject, &mut tx, &config).await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(pair))
}

/// Revoke the presented refresh token. Always answers 204.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let Ok(claims) = refresh_claims(&req, &config) else {
        return HttpResponse::NoContent().finish();
    };

    // idempotent
    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        warn!(error = %e, "Failed to revoke refresh token on logout");
    }

    HttpResponse::NoContent().finish()
}

/// Profile of the calling user.
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, body = UserProfile),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(auth.user_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(HttpResponse::Ok().json(UserProfile::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp: usize) -> Claims {
        Claims {
            user_id: 7,
            sub: "sari".into(),
            role: 3,
            exp,
            jti: "jti-1".into(),
            token_type: TokenType::Refresh,
        }
    }

    #[test]
    fn refresh_expiry_is_naive_utc() {
        let expires_at = refresh_expiry(&claims(1_767_225_600)).unwrap();
        assert_eq!(expires_at.to_string(), "2026-01-01 00:00:00");
    }

    #[test]
    fn refresh_expiry_out_of_range_is_internal() {
        let err = refresh_expiry(&claims(usize::MAX)).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InternalError);
    }
}
