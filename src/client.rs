use std::future::Future;

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;

use crate::config::Config;
use crate::error::Error;
use crate::preferences::{Category, ExpirationCycle, NotificationSetting, SettingsApi};
use crate::storage::{KeyValueStorage, keys};

/// Device connectivity probe, checked before any request leaves the device.
///
/// On device this wraps the platform's reachability API; servers and tests
/// use [`AlwaysOnline`].
pub trait Connectivity: Send + Sync + 'static {
    fn is_online(&self) -> impl Future<Output = bool> + Send;
}

/// Connectivity probe that never reports offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Single shared HTTP entry point to the wallet backend.
///
/// Every request runs a connectivity pre-check (failing locally with
/// [`Error::Offline`] before anything is sent), attaches the stored access
/// token as a bearer header when present, and logs method, URL, and status.
/// A 401 is logged as a refresh candidate but not retried — the caller
/// decides whether to drive [`refresh_tokens`](ApiClient::refresh_tokens).
pub struct ApiClient<S: KeyValueStorage, C: Connectivity = AlwaysOnline> {
    http: reqwest::Client,
    config: Config,
    storage: S,
    connectivity: C,
}

impl<S: KeyValueStorage> ApiClient<S> {
    #[must_use]
    pub fn new(config: Config, storage: S) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .expect("HTTP client construction");
        Self {
            http,
            config,
            storage,
            connectivity: AlwaysOnline,
        }
    }
}

impl<S: KeyValueStorage, C: Connectivity> ApiClient<S, C> {
    /// Swap in a device connectivity probe.
    #[must_use]
    pub fn with_connectivity<C2: Connectivity>(self, connectivity: C2) -> ApiClient<S, C2> {
        ApiClient {
            http: self.http,
            config: self.config,
            storage: self.storage,
            connectivity,
        }
    }

    /// Use a custom HTTP client (connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Exchange a Kakao SDK token for wallet session tokens.
    ///
    /// # Errors
    ///
    /// [`Error::Offline`] before sending, [`Error::Http`] on transport
    /// failure, [`Error::Api`] on a backend rejection.
    pub async fn login_with_kakao(&self, kakao_access_token: &str) -> Result<LoginResponse, Error> {
        let req = self
            .prepare(Method::POST, "/api/auth/kakao")
            .await?
            .json(&json!({ "accessToken": kakao_access_token }));
        let response = self.execute("kakao login", "POST", req).await?;
        response.json().await.map_err(Into::into)
    }

    /// Trade the refresh token for a new access token (and possibly a new
    /// refresh token). The caller applies the result to its session store.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<RefreshResponse, Error> {
        let req = self
            .prepare(Method::POST, "/api/auth/refresh")
            .await?
            .json(&json!({ "refreshToken": refresh_token }));
        let response = self.execute("token refresh", "POST", req).await?;
        response.json().await.map_err(Into::into)
    }

    /// Invalidate the session server-side.
    pub async fn logout(&self) -> Result<(), Error> {
        let req = self.prepare(Method::POST, "/api/auth/logout").await?;
        self.execute("logout", "POST", req).await?;
        Ok(())
    }

    /// Issue (or rotate) the BLE token used by the proximity features.
    pub async fn issue_ble_token(
        &self,
        current_token: Option<&str>,
    ) -> Result<BleTokenResponse, Error> {
        let req = self
            .prepare(Method::POST, "/api/ble")
            .await?
            .json(&json!({ "bleTokenValue": current_token }));
        let response = self.execute("BLE token issue", "POST", req).await?;
        response.json().await.map_err(Into::into)
    }

    /// Notification history, newest first by default.
    pub async fn notifications(&self, query: &NotificationQuery) -> Result<NotificationPage, Error> {
        let req = self
            .prepare(Method::GET, "/api/notifications")
            .await?
            .query(query);
        let response = self.execute("notification list", "GET", req).await?;
        response.json().await.map_err(Into::into)
    }

    /// Number of unread notifications.
    pub async fn unread_count(&self) -> Result<u64, Error> {
        let req = self
            .prepare(Method::GET, "/api/notifications/count")
            .await?
            .query(&[("read", "false")]);
        let response = self.execute("unread count", "GET", req).await?;
        let body: CountResponse = response.json().await?;
        Ok(body.count)
    }

    /// Mark every notification as read.
    pub async fn mark_all_read(&self) -> Result<(), Error> {
        let req = self.prepare(Method::PATCH, "/api/notifications/read").await?;
        self.execute("mark notifications read", "PATCH", req).await?;
        Ok(())
    }

    /// Connectivity pre-check, URL join, and bearer-token attachment.
    async fn prepare(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, Error> {
        if !self.connectivity.is_online().await {
            tracing::error!(path, "request aborted: no network connectivity");
            return Err(Error::Offline);
        }

        let url = self.config.endpoint(path);
        let mut req = self.http.request(method, url);
        match self.storage.get(keys::ACCESS_TOKEN).await {
            Ok(Some(token)) => req = req.bearer_auth(token),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "access token unreadable; sending unauthenticated");
            }
        }
        Ok(req)
    }

    /// Send, log, and turn non-2xx responses into [`Error::Api`].
    async fn execute(
        &self,
        operation: &'static str,
        method: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, Error> {
        let response = req.send().await.map_err(|e| {
            tracing::error!(error = %e, method, operation, "request failed to send");
            Error::from(e)
        })?;

        let status = response.status();
        let url = response.url().clone();
        tracing::info!(method, %url, status = status.as_u16(), operation, "wallet API response");

        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            // no automatic refresh-and-retry; the caller owns that decision
            tracing::warn!(%url, "401 received: access token refresh candidate");
        }

        let body = response.text().await.unwrap_or_default();
        let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();
        Err(Error::Api {
            operation,
            status: status.as_u16(),
            code: parsed.as_ref().and_then(|b| b.error_code.clone()),
            message: parsed.and_then(|b| b.message).unwrap_or_default(),
        })
    }
}

impl<S: KeyValueStorage, C: Connectivity> SettingsApi for ApiClient<S, C> {
    async fn list_settings(&self) -> Result<Vec<NotificationSetting>, Error> {
        let req = self
            .prepare(Method::GET, "/api/notification-settings")
            .await?;
        let response = self.execute("settings list", "GET", req).await?;
        response.json().await.map_err(Into::into)
    }

    async fn update_category(&self, category: Category, enabled: bool) -> Result<(), Error> {
        let path = format!("/api/notification-settings/types/{}", category.as_wire());
        let req = self
            .prepare(Method::PATCH, &path)
            .await?
            .json(&json!({ "isEnabled": enabled }));
        self.execute("category toggle", "PATCH", req).await?;
        Ok(())
    }

    async fn update_expiration_cycle(&self, cycle: ExpirationCycle) -> Result<(), Error> {
        let req = self
            .prepare(Method::PATCH, "/api/notification-settings/expiration-cycle")
            .await?
            .json(&json!({ "expirationCycle": cycle }));
        self.execute("expiration cycle update", "PATCH", req).await?;
        Ok(())
    }
}

/// Backend error envelope (`{"errorCode": "...", "message": "..."}`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Successful Kakao login exchange.
///
/// The user identity comes from the access token's `sub` claim
/// ([`crate::token::decode_subject`]); the BLE token is present when the
/// account has the proximity features enabled.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub ble_token: Option<String>,
}

/// Token refresh result. A rotated refresh token is only sometimes issued.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub new_refresh_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct BleTokenResponse {
    pub ble_token: String,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

/// Query parameters for the notification history list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    pub sort: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    pub size: u32,
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self {
            sort: "CREATED_DESC",
            page: None,
            size: 6,
        }
    }
}

/// One page of notification history.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct NotificationPage {
    pub notifications: Vec<NotificationItem>,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub next_page: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct NotificationItem {
    pub notification_id: i64,
    pub notification_title: String,
    pub notification_content: String,
    pub notification_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub notification_created_at: OffsetDateTime,
    #[serde(default)]
    pub is_read: bool,
}
