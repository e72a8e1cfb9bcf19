use std::sync::Arc;

use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::{Result, anyhow};

use crate::{
    api::{
        announcement, attendance, correction, dashboard, leave_request, notification, outlet,
        payroll, shift, shift_change, users,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};

type Limiter = Governor<PeerIpKeyExtractor, NoOpMiddleware>;

/// Per route group limiters, shared by every worker.
#[derive(Clone)]
pub struct RateLimits {
    login: Arc<Limiter>,
    refresh: Arc<Limiter>,
    protected: Arc<Limiter>,
}

fn build_limiter(name: &str, requests_per_min: u32) -> Result<Limiter> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / u64::from(requests_per_min)).max(1);
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit for {name}: {requests_per_min}/min"))?;
    Ok(Governor::new(&cfg))
}

impl RateLimits {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            login: Arc::new(build_limiter("login", config.rate_login_per_min)?),
            refresh: Arc::new(build_limiter("refresh", config.rate_refresh_per_min)?),
            protected: Arc::new(build_limiter("api", config.rate_protected_per_min)?),
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limits: &RateLimits) {
    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(limits.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(limits.refresh.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(limits.refresh.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(limits.protected.clone())
            .configure(api_routes),
    );
}

/// Everything behind the access token. Fixed segments are registered before
/// `{id}` so they are not swallowed by it.
pub fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/me", web::get().to(handlers::me))
        .route("/dashboard", web::get().to(dashboard::dashboard))
        .service(
            web::scope("/absensi")
                .route("/today", web::get().to(attendance::today))
                .route("/masuk", web::post().to(attendance::check_in))
                .route("/pulang", web::post().to(attendance::check_out))
                .route("/history", web::get().to(attendance::history))
                .route("/team", web::get().to(attendance::team))
                .route("/{id}/photo/{side}", web::get().to(attendance::photo)),
        )
        .service(
            web::scope("/koreksi")
                .service(
                    web::resource("")
                        .route(web::post().to(correction::create_correction))
                        .route(web::get().to(correction::list_corrections)),
                )
                .route("/mine", web::get().to(correction::my_corrections))
                .route("/{id}/approve", web::put().to(correction::approve_correction))
                .route("/{id}/reject", web::put().to(correction::reject_correction)),
        )
        .service(
            web::scope("/cuti")
                .service(
                    web::resource("")
                        .route(web::post().to(leave_request::create_leave))
                        .route(web::get().to(leave_request::leave_list)),
                )
                .route("/mine", web::get().to(leave_request::my_leaves))
                .route("/balance", web::get().to(leave_request::leave_balance))
                .route("/{id}", web::get().to(leave_request::get_leave))
                .route("/{id}/approve", web::put().to(leave_request::approve_leave))
                .route("/{id}/reject", web::put().to(leave_request::reject_leave))
                .route("/{id}/cancel", web::put().to(leave_request::cancel_leave)),
        )
        .service(
            web::scope("/shift-change")
                .service(
                    web::resource("")
                        .route(web::post().to(shift_change::create_shift_change))
                        .route(web::get().to(shift_change::list_shift_changes)),
                )
                .route("/mine", web::get().to(shift_change::my_shift_changes))
                .route("/{id}/approve", web::put().to(shift_change::approve_shift_change))
                .route("/{id}/reject", web::put().to(shift_change::reject_shift_change))
                .route("/{id}/cancel", web::put().to(shift_change::cancel_shift_change)),
        )
        .service(
            web::scope("/users")
                .service(
                    web::resource("")
                        .route(web::post().to(users::create_user))
                        .route(web::get().to(users::list_users)),
                )
                .route("/username-available", web::get().to(users::username_available))
                .route("/me/password", web::put().to(users::change_password))
                .service(
                    web::resource("/{id}")
                        .route(web::get().to(users::get_user))
                        .route(web::put().to(users::update_user))
                        .route(web::delete().to(users::deactivate_user)),
                ),
        )
        .service(
            web::scope("/outlets")
                .service(
                    web::resource("")
                        .route(web::post().to(outlet::create_outlet))
                        .route(web::get().to(outlet::list_outlets)),
                )
                .route("/nearby", web::get().to(outlet::nearby_outlets))
                .service(
                    web::resource("/{id}")
                        .route(web::get().to(outlet::get_outlet))
                        .route(web::put().to(outlet::update_outlet))
                        .route(web::delete().to(outlet::delete_outlet)),
                ),
        )
        .service(
            web::scope("/shifts")
                .service(
                    web::resource("")
                        .route(web::post().to(shift::create_shift))
                        .route(web::get().to(shift::list_shifts)),
                )
                .service(
                    web::resource("/schedule")
                        .route(web::get().to(shift::get_schedule))
                        .route(web::put().to(shift::upsert_schedule)),
                )
                .service(
                    web::resource("/{id}")
                        .route(web::put().to(shift::update_shift))
                        .route(web::delete().to(shift::delete_shift)),
                ),
        )
        .service(
            web::scope("/payroll")
                .service(
                    web::resource("")
                        .route(web::post().to(payroll::create_slip))
                        .route(web::get().to(payroll::list_slips)),
                )
                .route("/mine", web::get().to(payroll::my_slips))
                .service(
                    web::resource("/{id}")
                        .route(web::get().to(payroll::get_slip))
                        .route(web::put().to(payroll::update_slip)),
                )
                .route("/{id}/publish", web::put().to(payroll::publish_slip))
                .route("/{id}/pdf", web::get().to(payroll::slip_pdf)),
        )
        .service(
            web::scope("/announcements")
                .service(
                    web::resource("")
                        .route(web::post().to(announcement::create_announcement))
                        .route(web::get().to(announcement::list_announcements)),
                )
                .service(
                    web::resource("/{id}")
                        .route(web::put().to(announcement::update_announcement))
                        .route(web::delete().to(announcement::delete_announcement)),
                ),
        )
        .service(
            web::scope("/notifications")
                .route("", web::get().to(notification::list_notifications))
                .route("/unread-count", web::get().to(notification::unread_count))
                .route("/read-all", web::put().to(notification::mark_all_read))
                .route("/{id}/read", web::put().to(notification::mark_read)),
        );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)
//
// API REQUEST
//  └─ Authorization: Bearer access_token
//
// ACCESS EXPIRED (401)
//  └─ POST /auth/refresh with refresh_token as bearer
//       └─ returns a new pair, old refresh token revoked

#[cfg(test)]
mod tests {
    use actix_web::{App, http::StatusCode, test, web::Data};
    use serde_json::Value;
    use sqlx::mysql::MySqlPoolOptions;

    use super::*;
    use crate::auth::jwt::{TokenSubject, generate_access_token, generate_refresh_token};

    // Never connects: every request here is answered before a query runs.
    fn lazy_pool(config: &Config) -> sqlx::MySqlPool {
        MySqlPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap()
    }

    fn subject(role: u8) -> TokenSubject {
        TokenSubject {
            user_id: 42,
            username: "tester".into(),
            role,
        }
    }

    macro_rules! app {
        ($config:expr) => {
            test::init_service(
                App::new()
                    .app_data(Data::new($config.clone()))
                    .app_data(Data::new(lazy_pool(&$config)))
                    .service(
                        web::scope("/api")
                            .wrap(from_fn(auth_middleware))
                            .configure(api_routes),
                    ),
            )
            .await
        };
    }

    async fn error_code(resp: actix_web::dev::ServiceResponse) -> String {
        let body: Value = test::read_body_json(resp).await;
        body["code"].as_str().unwrap_or_default().to_string()
    }

    #[actix_web::test]
    async fn missing_token_is_unauthorized() {
        let config = Config::for_tests();
        let app = app!(config);

        let req = test::TestRequest::get().uri("/api/absensi/today").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(resp).await, "UNAUTHORIZED");
    }

    #[actix_web::test]
    async fn non_bearer_scheme_is_unauthorized() {
        let config = Config::for_tests();
        let app = app!(config);

        let req = test::TestRequest::get()
            .uri("/api/notifications/unread-count")
            .insert_header(("Authorization", "Basic dGVzdGVyOnB3"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn refresh_token_cannot_call_the_api() {
        let config = Config::for_tests();
        let app = app!(config);
        let (token, _) = generate_refresh_token(&subject(3), &config.jwt_secret, 600).unwrap();

        let req = test::TestRequest::get()
            .uri("/api/notifications/unread-count")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn token_signed_with_another_secret_is_rejected() {
        let config = Config::for_tests();
        let app = app!(config);
        let token = generate_access_token(&subject(1), "some-other-secret", 600).unwrap();

        let req = test::TestRequest::get()
            .uri("/api/users")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn employees_are_kept_out_of_hr_endpoints() {
        let config = Config::for_tests();
        let app = app!(config);
        let token = generate_access_token(&subject(3), &config.jwt_secret, 600).unwrap();

        for uri in ["/api/users", "/api/payroll"] {
            let req = test::TestRequest::get()
                .uri(uri)
                .insert_header(("Authorization", format!("Bearer {token}")))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
            assert_eq!(error_code(resp).await, "FORBIDDEN");
        }

        let req = test::TestRequest::post()
            .uri("/api/outlets")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .set_json(serde_json::json!({
                "name": "Outlet Dago",
                "latitude": -6.885,
                "longitude": 107.613,
                "radius_m": 100
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[::core::prelude::v1::test]
    fn limiters_build_for_any_configured_rate() {
        assert!(RateLimits::from_config(&Config::for_tests()).is_ok());
        assert!(build_limiter("disabled", 0).is_ok());
        assert!(build_limiter("burst", 120_000).is_ok());
    }
}
