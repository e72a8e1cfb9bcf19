//! Drives `absensi::client` against an in-process server that hands out and
//! expires tokens on demand.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use serde_json::json;

use absensi::client::{ApiClient, ClientError, NotificationPoller, SessionStore};

#[derive(Default)]
struct FakeState {
    valid_access: String,
    valid_refresh: String,
    issued: u32,
    refresh_works: bool,
    /// Reject access tokens even right after a refresh.
    reject_everything: bool,
    refresh_calls: u32,
    data_calls: u32,
    unread: i64,
}

type Shared = web::Data<Mutex<FakeState>>;

fn bearer(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({ "code": "UNAUTHORIZED", "message": "Invalid or expired token" }))
}

fn issue(state: &mut FakeState) -> (String, String) {
    state.issued += 1;
    state.valid_access = format!("access-{}", state.issued);
    state.valid_refresh = format!("refresh-{}", state.issued);
    (state.valid_access.clone(), state.valid_refresh.clone())
}

async fn login(state: Shared) -> HttpResponse {
    let mut state = state.lock().unwrap();
    let (access_token, refresh_token) = issue(&mut state);
    HttpResponse::Ok().json(json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "user": {
            "id": 7,
            "username": "sari",
            "full_name": "Sari Wulandari",
            "nik": null,
            "role": "employee",
            "outlet_id": 2,
            "supervisor_id": 3,
            "is_active": true
        }
    }))
}

async fn refresh(req: HttpRequest, state: Shared) -> HttpResponse {
    let mut state = state.lock().unwrap();
    state.refresh_calls += 1;
    if !state.refresh_works || bearer(&req).as_deref() != Some(state.valid_refresh.as_str()) {
        return unauthorized();
    }
    let (access_token, refresh_token) = issue(&mut state);
    HttpResponse::Ok().json(json!({ "access_token": access_token, "refresh_token": refresh_token }))
}

async fn logout() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

async fn unread_count(req: HttpRequest, state: Shared) -> HttpResponse {
    let mut state = state.lock().unwrap();
    state.data_calls += 1;
    if state.reject_everything || bearer(&req).as_deref() != Some(state.valid_access.as_str()) {
        return unauthorized();
    }
    HttpResponse::Ok().json(json!({ "unread": state.unread }))
}

async fn check_in(state: Shared) -> HttpResponse {
    state.lock().unwrap().data_calls += 1;
    HttpResponse::Conflict().json(json!({ "code": "ALREADY_CHECKED_IN", "message": "Already checked in today" }))
}

struct Harness {
    state: Arc<Mutex<FakeState>>,
    client: Arc<ApiClient>,
}

impl Harness {
    async fn start() -> Self {
        let state = web::Data::new(Mutex::new(FakeState {
            refresh_works: true,
            unread: 3,
            ..FakeState::default()
        }));
        let shared = state.clone();

        let server = HttpServer::new(move || {
            App::new()
                .app_data(shared.clone())
                .route("/auth/login", web::post().to(login))
                .route("/auth/refresh", web::post().to(refresh))
                .route("/auth/logout", web::post().to(logout))
                .route("/api/notifications/unread-count", web::get().to(unread_count))
                .route("/api/absensi/masuk", web::post().to(check_in))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());

        let client = ApiClient::new(&format!("http://{addr}"), Arc::new(SessionStore::new())).unwrap();
        client.login("sari", "rahasia123").await.unwrap();

        Self {
            state: state.into_inner(),
            client: Arc::new(client),
        }
    }

    fn expire_access(&self) {
        self.state.lock().unwrap().valid_access = "expired".into();
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

fn punch() -> absensi::api::attendance::PunchReq {
    serde_json::from_value(json!({ "latitude": -6.9175, "longitude": 107.6091, "photo": null }))
        .unwrap()
}

#[actix_web::test]
async fn expired_access_token_is_refreshed_and_request_retried_once() {
    let h = Harness::start().await;
    h.expire_access();

    assert_eq!(h.client.unread_count().await.unwrap(), 3);

    assert_eq!(h.with(|s| s.refresh_calls), 1);
    assert_eq!(h.with(|s| s.data_calls), 2);
    let session = h.client.session().get().await.unwrap();
    assert_eq!(session.access_token, "access-2");
    assert_eq!(session.refresh_token, "refresh-2");
    assert_eq!(session.user.map(|u| u.username).as_deref(), Some("sari"));
}

#[actix_web::test]
async fn failed_refresh_logs_out() {
    let h = Harness::start().await;
    h.expire_access();
    h.with(|s| s.refresh_works = false);

    let err = h.client.unread_count().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    assert!(!h.client.session().is_logged_in().await);
    assert_eq!(h.with(|s| s.data_calls), 1);

    // nothing is sent once logged out
    let err = h.client.unread_count().await.unwrap_err();
    assert!(matches!(err, ClientError::NotLoggedIn));
    assert_eq!(h.with(|s| s.data_calls), 1);
    assert_eq!(h.with(|s| s.refresh_calls), 1);
}

#[actix_web::test]
async fn unauthorized_retry_logs_out_without_a_second_refresh() {
    let h = Harness::start().await;
    h.with(|s| s.reject_everything = true);

    let err = h.client.unread_count().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    assert_eq!(h.with(|s| s.refresh_calls), 1);
    assert_eq!(h.with(|s| s.data_calls), 2);
    assert!(!h.client.session().is_logged_in().await);
}

#[actix_web::test]
async fn api_errors_are_returned_without_retry() {
    let h = Harness::start().await;

    let err = h.client.check_in(&punch()).await.unwrap_err();
    assert_eq!(err.code(), Some("ALREADY_CHECKED_IN"));
    assert!(matches!(err, ClientError::Api { status: 409, .. }));
    assert_eq!(h.with(|s| s.data_calls), 1);
    assert_eq!(h.with(|s| s.refresh_calls), 0);
    assert!(h.client.session().is_logged_in().await);
}

#[actix_web::test]
async fn concurrent_401s_share_one_refresh() {
    let h = Harness::start().await;
    h.expire_access();

    let (a, b) = tokio::join!(h.client.unread_count(), h.client.unread_count());
    assert_eq!(a.unwrap(), 3);
    assert_eq!(b.unwrap(), 3);
    assert_eq!(h.with(|s| s.refresh_calls), 1);
}

#[actix_web::test]
async fn logout_clears_the_session() {
    let h = Harness::start().await;
    h.client.logout().await.unwrap();
    assert!(!h.client.session().is_logged_in().await);
}

#[actix_web::test]
async fn poller_reports_changes_and_stops_after_logout() {
    let h = Harness::start().await;
    let (handle, mut rx) = NotificationPoller::new(h.client.clone())
        .with_interval(Duration::from_millis(50))
        .spawn();

    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("first poll")
        .unwrap();
    assert_eq!(*rx.borrow_and_update(), 3);

    h.with(|s| s.unread = 5);
    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("second poll")
        .unwrap();
    assert_eq!(*rx.borrow(), 5);

    h.client.session().clear().await;
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("poller stops")
        .unwrap();
}
