//! HTTP access to the admin backend.
//!
//! Every call goes through [`HttpGateway`], which attaches the bearer token,
//! unwraps the `{ success, data, message }` envelope and maps failures to
//! [`ApiError`]. A 401 on an authenticated call is reported back to the
//! session so it can reset itself.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use nova_auth::UserProfile;
use nova_core::{ApiConfig, ApiError};

/// The session as seen by the gateway.
///
/// Held weakly: the session owns the gateway, not the other way round.
pub trait AuthContext: Send + Sync {
    fn bearer_token(&self) -> Option<String>;

    /// A request that carried `sent_token` came back 401.
    ///
    /// The token may already have been replaced by the time this runs.
    fn on_unauthorized(&self, err: &ApiError, sent_token: &str);
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub token: String,
    pub user_info: UserProfile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenPayload {
    pub token: String,
}

/// Standard response wrapper.
///
/// A body without `success` is treated as successful so bare payloads from
/// older endpoints still decode.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl<T> Envelope<T> {
    /// The payload, or the backend's rejection.
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ApiError::Rejected(
                self.message
                    .unwrap_or_else(|| "request rejected".to_string()),
            ))
        }
    }

    /// Like [`Envelope::into_result`], but a missing payload is an error.
    pub fn into_data(self) -> Result<T, ApiError> {
        self.into_result()?
            .ok_or_else(|| ApiError::Decode("response has no data".to_string()))
    }
}

/// Whether a request may carry the session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Credentials {
    Bearer,
    Anonymous,
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────────────────

pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    cache_bust: bool,
    auth: RwLock<Option<Weak<dyn AuthContext>>>,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("base_url", &self.base_url)
            .field("cache_bust", &self.cache_bust)
            .finish_non_exhaustive()
    }
}

impl HttpGateway {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache_bust: config.cache_bust,
            auth: RwLock::new(None),
        })
    }

    /// Link the gateway to the session that supplies tokens.
    pub fn attach(&self, ctx: Weak<dyn AuthContext>) {
        *self.auth.write().unwrap_or_else(PoisonError::into_inner) = Some(ctx);
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn auth_context(&self) -> Option<Arc<dyn AuthContext>> {
        self.auth
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    // ── endpoints ────────────────────────────────────────────────────────────

    /// `POST /auth/login`. Never sends a bearer token.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginPayload, ApiError> {
        let body = LoginRequest { username, password };
        self.send::<_, LoginPayload>(Method::POST, "/auth/login", Some(&body), Credentials::Anonymous)
            .await?
            .into_data()
    }

    /// `POST /auth/logout`.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.send::<(), serde_json::Value>(Method::POST, "/auth/logout", None, Credentials::Bearer)
            .await?
            .into_result()
            .map(|_| ())
    }

    /// `GET /auth/user`.
    pub async fn current_user(&self) -> Result<UserProfile, ApiError> {
        self.get_json("/auth/user").await
    }

    /// `POST /auth/refresh`, returning the new token.
    pub async fn refresh_token(&self) -> Result<String, ApiError> {
        let payload: TokenPayload = self
            .send::<(), TokenPayload>(Method::POST, "/auth/refresh", None, Credentials::Bearer)
            .await?
            .into_data()?;
        Ok(payload.token)
    }

    // ── generic calls ────────────────────────────────────────────────────────

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send::<(), T>(Method::GET, path, None, Credentials::Bearer)
            .await?
            .into_data()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send::<B, T>(Method::POST, path, Some(body), Credentials::Bearer)
            .await?
            .into_data()
    }

    async fn send<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        credentials: Credentials,
    ) -> Result<Envelope<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut req = self.client.request(method.clone(), self.url(path));

        let token = match credentials {
            Credentials::Bearer => self.auth_context().and_then(|ctx| ctx.bearer_token()),
            Credentials::Anonymous => None,
        };
        if let Some(token) = &token {
            req = req.bearer_auth(token);
        }
        if self.cache_bust {
            let stamp = chrono::Utc::now().timestamp_millis().to_string();
            req = req.query(&[("_t", stamp)]);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status();

        if !status.is_success() {
            let message = error_message(resp).await;
            let err = ApiError::from_status(status.as_u16(), message);
            tracing::warn!(%method, path, status = status.as_u16(), "request failed: {err}");

            if err.is_unauthorized() {
                if let (Some(sent), Some(ctx)) = (token.as_deref(), self.auth_context()) {
                    ctx.on_unauthorized(&err, sent);
                }
            }
            return Err(err);
        }

        tracing::debug!(%method, path, status = status.as_u16(), "request ok");
        resp.json::<Envelope<T>>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(err.to_string())
    }
}

/// Best human-readable message from an error response body.
async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
        for field in ["message", "statusMessage", "error"] {
            if let Some(msg) = value.get(field).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }

    if text.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        text
    }
}
