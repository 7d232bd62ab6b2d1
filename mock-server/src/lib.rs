//! In-memory stand-in for the Fitbit token endpoint and a few resource
//! endpoints. Issues random tokens, rotates refresh tokens, and counts
//! refreshes so tests can assert on them.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Credentials and token lifetime the mock accepts and hands out.
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_code: String,
    pub user_id: String,
    pub expires_in: i64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            client_id: "22MOCK".to_string(),
            client_secret: "mock-secret".to_string(),
            auth_code: "mock-auth-code".to_string(),
            user_id: "MOCK01".to_string(),
            expires_in: 28800,
        }
    }
}

#[derive(Debug, Default)]
pub struct Store {
    pub access_tokens: HashSet<String>,
    pub refresh_tokens: HashSet<String>,
    pub refresh_count: usize,
    pub activities: HashMap<u64, Value>,
    pub next_log_id: u64,
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
struct AppState {
    config: Arc<MockConfig>,
    db: Db,
}

#[derive(Debug, Deserialize)]
pub struct TokenForm {
    pub grant_type: String,
    pub code: Option<String>,
    pub refresh_token: Option<String>,
    pub redirect_uri: Option<String>,
}

pub fn app() -> Router {
    app_with(MockConfig::default(), Db::default())
}

pub fn app_with(config: MockConfig, db: Db) -> Router {
    let state = AppState {
        config: Arc::new(config),
        db,
    };
    Router::new()
        .route("/oauth2/token", post(token))
        .route("/1/user/-/profile.json", get(profile))
        .route("/1/user/-/activities.json", post(log_activity))
        .route("/1/user/-/activities/{file}", delete(delete_activity))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, config: MockConfig, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(config, db)).await
}

fn error_response(status: StatusCode, error_type: &str) -> Response {
    (
        status,
        Json(json!({"errors": [{"errorType": error_type}], "success": false})),
    )
        .into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Expected `Authorization` value for the token endpoint.
pub fn basic_credentials(client_id: &str, client_secret: &str) -> String {
    format!("Basic {}", BASE64_STANDARD.encode(format!("{client_id}:{client_secret}")))
}

/// Log id from a `{id}.json` path segment.
pub fn parse_log_file(file: &str) -> Option<u64> {
    file.strip_suffix(".json")?.parse().ok()
}

async fn require_bearer(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let token = header_str(headers, header::AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "invalid_token"))?;
    if state.db.read().await.access_tokens.contains(token) {
        Ok(())
    } else {
        Err(error_response(StatusCode::UNAUTHORIZED, "invalid_token"))
    }
}

async fn token(State(state): State<AppState>, headers: HeaderMap, Form(form): Form<TokenForm>) -> Response {
    let expected = basic_credentials(&state.config.client_id, &state.config.client_secret);
    if header_str(&headers, header::AUTHORIZATION.as_str()) != Some(expected.as_str()) {
        return error_response(StatusCode::UNAUTHORIZED, "invalid_client");
    }

    let mut db = state.db.write().await;
    match form.grant_type.as_str() {
        "authorization_code" => {
            if form.code.as_deref() != Some(state.config.auth_code.as_str()) || form.redirect_uri.is_none() {
                return error_response(StatusCode::BAD_REQUEST, "invalid_grant");
            }
        }
        "refresh_token" => {
            let known = form
                .refresh_token
                .as_ref()
                .is_some_and(|rt| db.refresh_tokens.remove(rt));
            if !known {
                return error_response(StatusCode::BAD_REQUEST, "invalid_grant");
            }
            db.refresh_count += 1;
        }
        _ => return error_response(StatusCode::BAD_REQUEST, "unsupported_grant_type"),
    }

    let access_token = Uuid::new_v4().to_string();
    let refresh_token = Uuid::new_v4().to_string();
    db.access_tokens.insert(access_token.clone());
    db.refresh_tokens.insert(refresh_token.clone());
    tracing::info!(grant_type = %form.grant_type, "issued token");

    Json(json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "expires_in": state.config.expires_in,
        "token_type": "Bearer",
        "user_id": state.config.user_id,
        "scope": "activity profile",
    }))
    .into_response()
}

async fn profile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_bearer(&state, &headers).await {
        return resp;
    }
    Json(json!({
        "user": {
            "encodedId": state.config.user_id,
            "displayName": "Mock Runner",
            "averageDailySteps": 8200,
            "locale": header_str(&headers, "accept-locale"),
            "unitSystem": header_str(&headers, "accept-language"),
            "topBadges": [{"badgeType": "DAILY_STEPS", "dateTime": "2024-01-01"}],
        }
    }))
    .into_response()
}

async fn log_activity(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(resp) = require_bearer(&state, &headers).await {
        return resp;
    }
    let mut db = state.db.write().await;
    db.next_log_id += 1;
    let log_id = db.next_log_id;

    let mut log = body;
    if let Value::Object(map) = &mut log {
        map.insert("logId".to_string(), json!(log_id));
    }
    db.activities.insert(log_id, log.clone());
    (StatusCode::CREATED, Json(json!({"activityLog": log}))).into_response()
}

async fn delete_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file): Path<String>,
) -> Response {
    if let Err(resp) = require_bearer(&state, &headers).await {
        return resp;
    }
    let Some(log_id) = parse_log_file(&file) else {
        return error_response(StatusCode::BAD_REQUEST, "validation");
    };
    match state.db.write().await.activities.remove(&log_id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => error_response(StatusCode::NOT_FOUND, "not_found"),
    }
}
