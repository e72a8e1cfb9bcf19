use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{
    attendance::{DaySnapshot, PunchReq},
    correction::CreateCorrectionReq,
    leave_request::{CreateLeave, LeaveBalance},
    notification::UnreadCount,
};
use crate::client::{
    error::{ClientError, ClientResult},
    session::{Session, SessionStore},
};
use crate::model::{
    correction::Correction, leave_request::LeaveRequest, notification::Notification,
    user::UserProfile,
};
use crate::models::{LoginReqDto, LoginResponse, TokenPair};
use crate::utils::pagination::Paginated;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error body the server sends with every non-2xx answer.
#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<SessionStore>,
    /// Serializes refreshes so concurrent 401s rotate the pair only once.
    refresh_lock: Mutex<()>,
}

impl ApiClient {
    pub fn new(base_url: &str, session: Arc<SessionStore>) -> ClientResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> ClientResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(match serde_json::from_slice::<ErrorBody>(&bytes) {
                Ok(body) => ClientError::Api {
                    status: status.as_u16(),
                    code: body.code,
                    message: body.message,
                },
                Err(_) => ClientError::Api {
                    status: status.as_u16(),
                    code: format!("HTTP_{}", status.as_u16()),
                    message: String::from_utf8_lossy(&bytes).into_owned(),
                },
            });
        }

        // 204 and friends
        if bytes.is_empty() {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Rotates the token pair unless another task already did since
    /// `rejected` was sent.
    async fn refresh_after(&self, rejected: &str) -> ClientResult<()> {
        let _guard = self.refresh_lock.lock().await;

        match self.session.access_token().await {
            Some(current) if current != rejected => return Ok(()),
            Some(_) => {}
            None => return Err(ClientError::SessionExpired),
        }

        let refresh_token = self
            .session
            .refresh_token()
            .await
            .ok_or(ClientError::SessionExpired)?;
        let response = self
            .execute::<()>(Method::POST, "/auth/refresh", None, Some(&refresh_token))
            .await?;
        let pair: TokenPair = Self::decode(response).await?;
        self.session
            .rotate(pair.access_token, pair.refresh_token)
            .await?;
        debug!("Token pair rotated");
        Ok(())
    }

    /// Authenticated request with the refresh-once, retry-once interceptor.
    pub async fn request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let token = self
            .session
            .access_token()
            .await
            .ok_or(ClientError::NotLoggedIn)?;

        let response = self
            .execute(method.clone(), path, body, Some(&token))
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::decode(response).await;
        }

        debug!(path, "Access token rejected, refreshing");
        if let Err(e) = self.refresh_after(&token).await {
            warn!(error = %e, "Token refresh failed, logging out");
            self.session.clear().await;
            return Err(ClientError::SessionExpired);
        }

        let token = self
            .session
            .access_token()
            .await
            .ok_or(ClientError::SessionExpired)?;
        let response = self.execute(method, path, body, Some(&token)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(path, "Still unauthorized after refresh, logging out");
            self.session.clear().await;
            return Err(ClientError::SessionExpired);
        }
        Self::decode(response).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request::<T, ()>(Method::GET, path, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put_empty<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request::<T, ()>(Method::PUT, path, None).await
    }

    // ========== Auth ==========

    pub async fn login(&self, username: &str, password: &str) -> ClientResult<UserProfile> {
        let body = LoginReqDto {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self
            .execute(Method::POST, "/auth/login", Some(&body), None)
            .await?;
        let login: LoginResponse = Self::decode(response).await?;

        self.session
            .set(Session {
                access_token: login.access_token,
                refresh_token: login.refresh_token,
                user: Some(login.user.clone()),
            })
            .await?;
        info!(user_id = login.user.id, "Logged in");
        Ok(login.user)
    }

    /// Revokes the refresh token server side; the local session is cleared
    /// even when the server cannot be reached.
    pub async fn logout(&self) -> ClientResult<()> {
        if let Some(refresh_token) = self.session.refresh_token().await {
            let sent = self
                .execute::<()>(Method::POST, "/auth/logout", None, Some(&refresh_token))
                .await;
            if let Err(e) = sent {
                warn!(error = %e, "Logout request failed");
            }
        }
        self.session.clear().await;
        Ok(())
    }

    pub async fn me(&self) -> ClientResult<UserProfile> {
        self.get("/api/me").await
    }

    // ========== Absensi ==========

    pub async fn today(&self) -> ClientResult<DaySnapshot> {
        self.get("/api/absensi/today").await
    }

    pub async fn check_in(&self, punch: &PunchReq) -> ClientResult<DaySnapshot> {
        self.post("/api/absensi/masuk", punch).await
    }

    pub async fn check_out(&self, punch: &PunchReq) -> ClientResult<DaySnapshot> {
        self.post("/api/absensi/pulang", punch).await
    }

    // ========== Koreksi ==========

    pub async fn request_correction(&self, req: &CreateCorrectionReq) -> ClientResult<Correction> {
        self.post("/api/koreksi", req).await
    }

    pub async fn my_corrections(&self, page: u32) -> ClientResult<Paginated<Correction>> {
        self.get(&format!("/api/koreksi/mine?page={page}")).await
    }

    // ========== Cuti ==========

    pub async fn request_leave(&self, req: &CreateLeave) -> ClientResult<LeaveRequest> {
        self.post("/api/cuti", req).await
    }

    pub async fn my_leaves(&self, page: u32) -> ClientResult<Paginated<LeaveRequest>> {
        self.get(&format!("/api/cuti/mine?page={page}")).await
    }

    pub async fn leave_balance(&self) -> ClientResult<LeaveBalance> {
        self.get("/api/cuti/balance").await
    }

    // ========== Notifications ==========

    pub async fn unread_count(&self) -> ClientResult<i64> {
        let count: UnreadCount = self.get("/api/notifications/unread-count").await?;
        Ok(count.unread)
    }

    pub async fn notifications(&self, unread_only: bool) -> ClientResult<Paginated<Notification>> {
        self.get(&format!("/api/notifications?unread_only={unread_only}"))
            .await
    }

    pub async fn mark_all_read(&self) -> ClientResult<serde_json::Value> {
        self.put_empty("/api/notifications/read-all").await
    }
}
