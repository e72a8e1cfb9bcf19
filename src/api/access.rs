//! Who may see or decide on whose data.

use actix_web::web::Json;
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::auth::AuthUser,
    domain::approval::{RequestOwner, can_approve_swap, can_review},
    error::{ApiError, ApiResult},
    model::role::Role,
    utils::db_utils::SqlValue,
};

/// Body of approve/reject calls.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[schema(example = json!({ "note": "OK, sudah dicek" }))]
pub struct ReviewReq {
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

impl ReviewReq {
    /// The body is optional on approve/reject.
    pub fn from_body(body: Option<Json<ReviewReq>>) -> ApiResult<Self> {
        let review = body.map(Json::into_inner).unwrap_or_default();
        review.validate()?;
        Ok(review)
    }
}

pub async fn load_owner(pool: &MySqlPool, user_id: u64) -> ApiResult<RequestOwner> {
    let supervisor_id =
        sqlx::query_scalar::<_, Option<u64>>("SELECT supervisor_id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(RequestOwner {
        user_id,
        supervisor_id,
    })
}

/// Fails with 403 unless `auth` may approve or reject requests of `owner_id`.
pub async fn ensure_can_review(auth: &AuthUser, pool: &MySqlPool, owner_id: u64) -> ApiResult<()> {
    let owner = load_owner(pool, owner_id).await?;
    if can_review(auth.user_id, auth.role, owner) {
        Ok(())
    } else {
        Err(ApiError::forbidden("You cannot review this request"))
    }
}

/// Fails with 403 unless `auth` reviews both sides of a swap.
pub async fn ensure_can_approve_swap(
    auth: &AuthUser,
    pool: &MySqlPool,
    requester_id: u64,
    target_id: u64,
) -> ApiResult<()> {
    let requester = load_owner(pool, requester_id).await?;
    let target = load_owner(pool, target_id).await?;
    if can_approve_swap(auth.user_id, auth.role, requester, target) {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "You must review both employees to approve this swap",
        ))
    }
}

/// Read access: the owner, their supervisor, or manager and above.
pub async fn ensure_can_view(auth: &AuthUser, pool: &MySqlPool, owner_id: u64) -> ApiResult<()> {
    if auth.user_id == owner_id || auth.role.sees_everyone() {
        return Ok(());
    }
    if auth.role == Role::Supervisor {
        let owner = load_owner(pool, owner_id).await?;
        if owner.supervisor_id == Some(auth.user_id) {
            return Ok(());
        }
    }
    Err(ApiError::forbidden("Not allowed to view this resource"))
}

/// SQL condition restricting `column` (a user id column) to the caller's team.
///
/// `None` means no restriction (manager and above). Employees get 403.
pub fn team_condition(auth: &AuthUser, column: &str) -> ApiResult<Option<(String, SqlValue)>> {
    match auth.role {
        Role::Employee => Err(ApiError::forbidden("Supervisor or above only")),
        Role::Supervisor => Ok(Some((
            format!("{column} IN (SELECT id FROM users WHERE supervisor_id = ?)"),
            SqlValue::U64(auth.user_id),
        ))),
        Role::Manager | Role::Hr | Role::Admin => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(role: Role) -> AuthUser {
        AuthUser {
            user_id: 9,
            username: "caller".into(),
            role,
        }
    }

    #[test]
    fn supervisors_are_scoped_to_direct_reports() {
        let (sql, value) = team_condition(&caller(Role::Supervisor), "l.user_id")
            .unwrap()
            .unwrap();
        assert_eq!(sql, "l.user_id IN (SELECT id FROM users WHERE supervisor_id = ?)");
        assert_eq!(value, SqlValue::U64(9));
    }

    #[test]
    fn managers_and_above_are_unscoped() {
        for role in [Role::Manager, Role::Hr, Role::Admin] {
            assert!(team_condition(&caller(role), "user_id").unwrap().is_none());
        }
    }

    #[test]
    fn employees_have_no_team() {
        let err = team_condition(&caller(Role::Employee), "user_id").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Forbidden);
    }
}
