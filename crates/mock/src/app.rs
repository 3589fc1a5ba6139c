use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use crate::state::MockState;

type AppState = Arc<MockState>;

#[derive(Debug, Deserialize)]
struct LoginBody {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// All mock endpoints, nested under `/api`.
pub fn build_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/user", get(current_user))
        .route("/auth/refresh", post(refresh))
        .route("/menus", get(menus))
        .route("/dashboard/stats", get(dashboard_stats));

    Router::new().nest("/api", api).with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn login(State(state): State<AppState>, Json(body): Json<LoginBody>) -> Response {
    if let Some(delay) = state.login_delay() {
        tokio::time::sleep(delay).await;
    }

    let Some(profile) = state.authenticate(&body.username, &body.password).cloned() else {
        tracing::info!(username = %body.username, "mock login rejected");
        return json_error(StatusCode::UNAUTHORIZED, "invalid username or password");
    };

    let token = state.issue_token(&profile.username);
    tracing::info!(username = %profile.username, "mock login");

    Json(json!({
        "success": true,
        "data": { "token": token, "userInfo": profile },
    }))
    .into_response()
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = bearer_token(&headers) {
        state.revoke(token);
    }
    Json(json!({ "success": true })).into_response()
}

async fn current_user(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match authenticated(&state, &headers) {
        Ok((_, profile)) => Json(json!({ "success": true, "data": profile })).into_response(),
        Err(resp) => resp,
    }
}

async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (old, profile) = match authenticated(&state, &headers) {
        Ok(found) => found,
        Err(resp) => return resp,
    };
    state.revoke(&old);
    let token = state.issue_token(&profile.username);
    Json(json!({ "success": true, "data": { "token": token } })).into_response()
}

async fn menus(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = authenticated(&state, &headers) {
        return resp;
    }
    Json(json!({ "success": true, "data": state.menu() })).into_response()
}

async fn dashboard_stats(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(delay) = state.stats_delay() {
        tokio::time::sleep(delay).await;
    }
    if let Err(resp) = authenticated(&state, &headers) {
        return resp;
    }
    Json(json!({
        "success": true,
        "data": {
            "totalUsers": 1250,
            "activeUsers": 890,
            "totalArticles": 456,
            "totalCategories": 23,
            "todayVisits": 1234,
            "weekVisits": 8765,
            "monthVisits": 34567,
            "totalRevenue": 98765.43,
        },
    }))
    .into_response()
}

fn authenticated(
    state: &MockState,
    headers: &HeaderMap,
) -> Result<(String, nova_auth::UserProfile), Response> {
    let Some(token) = bearer_token(headers) else {
        return Err(json_error(StatusCode::UNAUTHORIZED, "missing or malformed bearer token"));
    };
    match state.user_for_token(token) {
        Some(profile) => Ok((token.to_string(), profile)),
        None => Err(json_error(StatusCode::UNAUTHORIZED, "token is invalid or expired")),
    }
}

/// `Authorization: Bearer <token>`, scheme matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let (scheme, token) = headers.get(AUTHORIZATION)?.to_str().ok()?.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "message": message.into(),
        })),
    )
        .into_response()
}
