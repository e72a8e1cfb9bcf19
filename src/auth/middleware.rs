use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};

use crate::auth::auth::authenticate;
use crate::config::Config;
use crate::error::ApiError;

/// Rejects requests without a valid access token and stores the caller as
/// an `AuthUser` request extension.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .cloned()
        .ok_or_else(|| ApiError::internal("App config missing"))?;

    let header_value = match req.headers().get("Authorization") {
        Some(h) => match h.to_str() {
            Ok(v) => v.to_owned(),
            Err(_) => {
                let resp = ApiError::unauthorized("Invalid Authorization header encoding")
                    .error_response();
                return Ok(req.into_response(resp));
            }
        },
        None => {
            let resp = ApiError::unauthorized("Missing Authorization header").error_response();
            return Ok(req.into_response(resp));
        }
    };

    let Some(token) = header_value.strip_prefix("Bearer ") else {
        let resp = ApiError::unauthorized("Authorization header must start with Bearer")
            .error_response();
        return Ok(req.into_response(resp));
    };

    let auth_user = match authenticate(token, &config.jwt_secret) {
        Ok(user) => user,
        Err(e) => return Ok(req.into_response(e.error_response())),
    };

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}
