use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::model::user::UserProfile;

#[derive(Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginReqDto {
    #[validate(length(min = 1, max = 64, message = "username is required"))]
    #[schema(example = "sari")]
    pub username: String,
    #[validate(length(min = 1, message = "password is required"))]
    #[schema(example = "rahasia123")]
    pub password: String,
}

/// Token pair handed to the client; the client keeps both and rotates the
/// pair through `/auth/refresh`.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}
