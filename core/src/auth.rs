//! OAuth2 authorization-code grant: authorization URL, code exchange and
//! token refresh.
//!
//! # Design
//! Like the resource calls, every token-endpoint interaction is split into a
//! pure `build_*` function producing an `HttpRequest` and
//! `parse_token_response` consuming the `HttpResponse`. `OAuthSession` ties
//! them to a `Transport` and owns the single live `TokenState`.
//!
//! The session mutex is held across the whole read-check-refresh sequence in
//! `current_token`, so concurrent callers that all observe an expired token
//! produce exactly one refresh round-trip; the others wait and receive the
//! new token. A failed exchange or refresh leaves the previous token in
//! place.

use std::sync::{Mutex, MutexGuard, PoisonError};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use url::form_urlencoded;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::types::TokenState;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// URL the user visits to grant access. Deterministic, no I/O.
pub fn authorization_url(config: &ClientConfig, state: Option<&str>) -> String {
    let mut url = config.authorize_url.clone();
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("scope", &config.scope_param())
            .append_pair("response_type", "code");
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    url.to_string()
}

/// `Authorization` header value for the token endpoint.
pub fn basic_auth_header(config: &ClientConfig) -> String {
    let credentials = format!("{}:{}", config.client_id, config.client_secret);
    format!("Basic {}", BASE64_STANDARD.encode(credentials))
}

fn token_request(config: &ClientConfig, params: &[(&str, &str)]) -> HttpRequest {
    let body = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    HttpRequest {
        method: HttpMethod::Post,
        url: config.token_url.to_string(),
        headers: vec![
            ("Authorization".to_string(), basic_auth_header(config)),
            ("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ],
        body: Some(body),
    }
}

/// Token request for the authorization-code grant: `grant_type`, `code`,
/// `client_id` and `redirect_uri`, form-encoded with Basic auth.
pub fn build_code_exchange(config: &ClientConfig, code: &str) -> HttpRequest {
    token_request(
        config,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
        ],
    )
}

/// Token request for the refresh grant; sends only `grant_type` and
/// `refresh_token`.
pub fn build_refresh(config: &ClientConfig, refresh_token: &str) -> HttpRequest {
    token_request(
        config,
        &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
    )
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    user_id: Option<String>,
}

/// Turn a token-endpoint response into a new `TokenState`.
///
/// `previous` supplies the refresh token and user id when a refresh
/// response omits them. `now` anchors `expires_in`.
pub fn parse_token_response(
    response: HttpResponse,
    previous: Option<&TokenState>,
    now: DateTime<Utc>,
) -> Result<TokenState> {
    if !response.is_success() {
        return Err(Error::Auth {
            status: Some(response.status),
            message: response.body,
        });
    }
    let parsed: TokenResponse = serde_json::from_str(&response.body).map_err(|e| Error::Auth {
        status: Some(response.status),
        message: format!("invalid token response: {e}"),
    })?;

    let expires_at = match parsed.expires_in {
        Some(secs) => Some(
            Duration::try_seconds(secs)
                .and_then(|lifetime| now.checked_add_signed(lifetime))
                .ok_or_else(|| Error::Auth {
                    status: Some(response.status),
                    message: format!("expires_in out of range: {secs}"),
                })?,
        ),
        None => None,
    };

    Ok(TokenState {
        access_token: parsed.access_token,
        refresh_token: parsed
            .refresh_token
            .or_else(|| previous.and_then(|t| t.refresh_token.clone())),
        expires_at,
        user_id: parsed.user_id.or_else(|| previous.and_then(|t| t.user_id.clone())),
    })
}

/// Owner of the live token for one client.
#[derive(Debug, Default)]
pub struct OAuthSession {
    token: Mutex<Option<TokenState>>,
}

impl OAuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session seeded with a previously obtained token.
    pub fn with_token(token: TokenState) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }

    // The guarded value is only ever replaced wholesale, so a poisoned lock
    // still holds a consistent token.
    fn lock(&self) -> MutexGuard<'_, Option<TokenState>> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the live token without any expiry check.
    pub fn token(&self) -> Option<TokenState> {
        self.lock().clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.lock().as_ref().and_then(|t| t.user_id.clone())
    }

    /// Exchange an authorization code for a token and make it the live one.
    pub fn exchange_code(
        &self,
        config: &ClientConfig,
        transport: &dyn Transport,
        code: &str,
    ) -> Result<TokenState> {
        let mut guard = self.lock();
        let response = transport.execute(build_code_exchange(config, code))?;
        let token = parse_token_response(response, None, Utc::now())?;
        tracing::info!(user_id = ?token.user_id, "authorization code exchanged");
        *guard = Some(token.clone());
        Ok(token)
    }

    /// The live token, refreshed first when it has expired. Callers never
    /// receive an expired token.
    pub fn current_token(&self, config: &ClientConfig, transport: &dyn Transport) -> Result<TokenState> {
        let mut guard = self.lock();
        let token = guard.as_ref().ok_or(Error::Unauthenticated)?;
        if !token.is_expired_at(Utc::now()) {
            return Ok(token.clone());
        }
        refresh_locked(&mut guard, config, transport)
    }

    /// Refresh unconditionally.
    pub fn refresh(&self, config: &ClientConfig, transport: &dyn Transport) -> Result<TokenState> {
        let mut guard = self.lock();
        refresh_locked(&mut guard, config, transport)
    }
}

fn refresh_locked(
    slot: &mut Option<TokenState>,
    config: &ClientConfig,
    transport: &dyn Transport,
) -> Result<TokenState> {
    let previous = slot.as_ref().ok_or(Error::Unauthenticated)?;
    let refresh_token = previous.refresh_token.as_deref().ok_or_else(|| Error::Auth {
        status: None,
        message: "token has no refresh_token".to_string(),
    })?;

    let response = transport.execute(build_refresh(config, refresh_token))?;
    let token = parse_token_response(response, Some(previous), Utc::now())?;
    tracing::info!(user_id = ?token.user_id, "access token refreshed");
    *slot = Some(token.clone());
    Ok(token)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use url::Url;

    use super::*;
    use crate::config::ClientOptions;
    use crate::test_support::{json_response, ScriptedTransport};

    fn config() -> ClientConfig {
        ClientOptions {
            scope: Some(vec!["activity".to_string(), "sleep".to_string()]),
            ..ClientOptions::new("22ABCD", "s3cret", "http://localhost:4000/callback")
        }
        .into_config()
        .unwrap()
    }

    fn token(expires_at: DateTime<Utc>) -> TokenState {
        TokenState {
            access_token: "old-access".to_string(),
            refresh_token: Some("old-refresh".to_string()),
            expires_at: Some(expires_at),
            user_id: Some("ABC123".to_string()),
        }
    }

    fn form(body: &str) -> Vec<(String, String)> {
        form_urlencoded::parse(body.as_bytes()).into_owned().collect()
    }

    #[test]
    fn authorization_url_carries_space_joined_scope() {
        let url = Url::parse(&authorization_url(&config(), None)).unwrap();
        assert_eq!(url.host_str(), Some("www.fitbit.com"));
        assert_eq!(url.path(), "/oauth2/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("client_id".to_string(), "22ABCD".to_string()),
                ("redirect_uri".to_string(), "http://localhost:4000/callback".to_string()),
                ("scope".to_string(), "activity sleep".to_string()),
                ("response_type".to_string(), "code".to_string()),
            ]
        );
    }

    #[test]
    fn authorization_url_appends_state() {
        let url = Url::parse(&authorization_url(&config(), Some("xyz"))).unwrap();
        assert!(url.query_pairs().any(|(k, v)| k == "state" && v == "xyz"));
    }

    #[test]
    fn basic_auth_encodes_id_and_secret() {
        // base64("22ABCD:s3cret")
        assert_eq!(basic_auth_header(&config()), "Basic MjJBQkNEOnMzY3JldA==");
    }

    #[test]
    fn code_exchange_request_is_form_encoded() {
        let req = build_code_exchange(&config(), "abc");
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "https://api.fitbit.com/oauth2/token");
        assert_eq!(req.header("authorization"), Some("Basic MjJBQkNEOnMzY3JldA=="));
        assert_eq!(req.header("content-type"), Some(FORM_CONTENT_TYPE));
        let body = form(req.body.as_deref().unwrap());
        assert!(body.contains(&("grant_type".to_string(), "authorization_code".to_string())));
        assert!(body.contains(&("code".to_string(), "abc".to_string())));
        assert!(body.contains(&(
            "redirect_uri".to_string(),
            "http://localhost:4000/callback".to_string()
        )));
    }

    #[test]
    fn refresh_request_sends_refresh_token() {
        let req = build_refresh(&config(), "rt-1");
        let body = form(req.body.as_deref().unwrap());
        assert_eq!(
            body,
            vec![
                ("grant_type".to_string(), "refresh_token".to_string()),
                ("refresh_token".to_string(), "rt-1".to_string()),
            ]
        );
    }

    #[test]
    fn parse_token_response_extracts_user_and_expiry() {
        let now = Utc::now();
        let resp = json_response(
            200,
            r#"{"access_token":"at","refresh_token":"rt","expires_in":28800,"user_id":"ABC123","token_type":"Bearer"}"#,
        );
        let token = parse_token_response(resp, None, now).unwrap();
        assert_eq!(token.access_token, "at");
        assert_eq!(token.refresh_token.as_deref(), Some("rt"));
        assert_eq!(token.user_id.as_deref(), Some("ABC123"));
        assert_eq!(token.expires_at, Some(now + Duration::seconds(28800)));
    }

    #[test]
    fn parse_token_response_keeps_previous_refresh_token_and_user() {
        let now = Utc::now();
        let previous = token(now);
        let resp = json_response(200, r#"{"access_token":"new","expires_in":60}"#);
        let token = parse_token_response(resp, Some(&previous), now).unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(token.user_id.as_deref(), Some("ABC123"));
    }

    #[test]
    fn parse_token_response_rejects_errors_and_garbage() {
        let err = parse_token_response(json_response(401, r#"{"errors":[]}"#), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::Auth { status: Some(401), .. }));

        let err = parse_token_response(json_response(200, "<html>"), None, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Auth { status: Some(200), .. }));
    }

    #[test]
    fn parse_token_response_rejects_unrepresentable_lifetime() {
        for expires_in in ["100000000000000000", "9223372036854775807", "-9223372036854775808"] {
            let body = format!(r#"{{"access_token":"a","expires_in":{expires_in}}}"#);
            let err = parse_token_response(json_response(200, &body), None, Utc::now()).unwrap_err();
            match err {
                Error::Auth { status, message } => {
                    assert_eq!(status, Some(200));
                    assert!(message.contains("expires_in"), "{message}");
                }
                other => panic!("expected Auth error, got {other:?}"),
            }
        }
    }

    #[test]
    fn failed_lifetime_parse_keeps_previous_token() {
        let transport = ScriptedTransport::new(vec![json_response(
            200,
            r#"{"access_token":"new","expires_in":100000000000000000}"#,
        )]);
        let expired = token(Utc::now() - Duration::seconds(1));
        let session = OAuthSession::with_token(expired.clone());

        let err = session.current_token(&config(), &transport).unwrap_err();
        assert!(matches!(err, Error::Auth { status: Some(200), .. }));
        assert_eq!(session.token(), Some(expired));
    }

    #[test]
    fn current_token_without_exchange_is_unauthenticated() {
        let transport = ScriptedTransport::new(Vec::new());
        let err = OAuthSession::new().current_token(&config(), &transport).unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn current_token_returns_live_token_without_network() {
        let transport = ScriptedTransport::new(Vec::new());
        let live = token(Utc::now() + Duration::hours(1));
        let session = OAuthSession::with_token(live.clone());
        assert_eq!(session.current_token(&config(), &transport).unwrap(), live);
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn current_token_refreshes_expired_token_once() {
        let transport = ScriptedTransport::new(vec![json_response(
            200,
            r#"{"access_token":"new-access","refresh_token":"new-refresh","expires_in":3600,"user_id":"ABC123"}"#,
        )]);
        let session = OAuthSession::with_token(token(Utc::now() - Duration::seconds(1)));

        let first = session.current_token(&config(), &transport).unwrap();
        assert_eq!(first.access_token, "new-access");
        let second = session.current_token(&config(), &transport).unwrap();
        assert_eq!(second, first);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let body = form(requests[0].body.as_deref().unwrap());
        assert!(body.contains(&("refresh_token".to_string(), "old-refresh".to_string())));
    }

    #[test]
    fn failed_refresh_keeps_previous_token() {
        let transport = ScriptedTransport::new(vec![json_response(400, r#"{"errors":["invalid_grant"]}"#)]);
        let expired = token(Utc::now() - Duration::seconds(1));
        let session = OAuthSession::with_token(expired.clone());

        let err = session.refresh(&config(), &transport).unwrap_err();
        assert!(matches!(err, Error::Auth { status: Some(400), .. }));
        assert_eq!(session.token(), Some(expired));
    }

    #[test]
    fn exchange_code_installs_token() {
        let transport = ScriptedTransport::new(vec![json_response(
            200,
            r#"{"access_token":"at","refresh_token":"rt","expires_in":28800,"user_id":"XYZ"}"#,
        )]);
        let session = OAuthSession::new();
        let token = session.exchange_code(&config(), &transport, "code-1").unwrap();
        assert_eq!(session.token(), Some(token));
        assert_eq!(session.user_id().as_deref(), Some("XYZ"));
    }

    #[test]
    fn concurrent_callers_share_one_refresh() {
        let transport = Arc::new(ScriptedTransport::new(vec![json_response(
            200,
            r#"{"access_token":"new-access","expires_in":3600}"#,
        )]));
        let session = Arc::new(OAuthSession::with_token(token(Utc::now() - Duration::seconds(1))));
        let config = Arc::new(config());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (session, transport, config) =
                    (Arc::clone(&session), Arc::clone(&transport), Arc::clone(&config));
                std::thread::spawn(move || session.current_token(&config, transport.as_ref()).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().access_token, "new-access");
        }
        assert_eq!(transport.requests().len(), 1);
    }
}
