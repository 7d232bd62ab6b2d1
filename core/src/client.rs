//! Client facade and resource request dispatch.
//!
//! # Design
//! `FitbyteClient` owns the validated configuration, the OAuth2 session and
//! a `Transport`. Resource calls follow the same build/execute/parse split as
//! the token endpoint: `build_*` produces an `HttpRequest` carrying the bearer
//! token and locale headers, the transport runs it, and `parse_payload` turns
//! the `HttpResponse` into a `Payload` after applying the key transform.
//!
//! Request bodies are always rewritten to camelCase on the wire, whatever the
//! client's snake_case setting; that setting only shapes responses.

use serde_json::Value;

use crate::auth::{self, OAuthSession};
use crate::config::{ClientConfig, ClientOptions, KeyOptions, RequestOptions};
use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::keys;
use crate::types::{Payload, TokenState};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const REPO_URL: &str = env!("CARGO_PKG_REPOSITORY");

/// `User-Agent` sent with every resource request.
pub fn user_agent() -> String {
    format!("fitbyte-{VERSION} ({REPO_URL})")
}

/// Blocking client for the Fitbit web API.
///
/// Safe to share between threads: token refresh is serialized inside the
/// session, so concurrent calls that find an expired token trigger a single
/// refresh.
pub struct FitbyteClient {
    config: ClientConfig,
    session: OAuthSession,
    transport: Box<dyn Transport>,
}

impl FitbyteClient {
    /// Client using the default blocking `ureq` transport.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }

    /// Validate `options` and build a client. Fails with
    /// `Error::InvalidArgument` before any network activity.
    pub fn from_options(options: ClientOptions) -> Result<Self> {
        Ok(Self::new(options.into_config()?))
    }

    pub fn with_transport(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        Self {
            config,
            session: OAuthSession::new(),
            transport: Box::new(transport),
        }
    }

    /// Restore a previously persisted token instead of running the
    /// authorization flow again.
    pub fn with_token(mut self, token: TokenState) -> Self {
        self.session = OAuthSession::with_token(token);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Default for rewriting response keys to snake_case.
    pub fn set_snake_case(&mut self, on: bool) {
        self.config.snake_case = on;
    }

    /// Default for returning responses with symbolized keys.
    pub fn set_symbolize_keys(&mut self, on: bool) {
        self.config.symbolize_keys = on;
    }

    // -----------------------------------------------------------------------
    // OAuth2
    // -----------------------------------------------------------------------

    pub fn authorization_url(&self) -> String {
        auth::authorization_url(&self.config, None)
    }

    pub fn authorization_url_with_state(&self, state: &str) -> String {
        auth::authorization_url(&self.config, Some(state))
    }

    pub fn exchange_code(&self, code: &str) -> Result<TokenState> {
        self.session.exchange_code(&self.config, self.transport.as_ref(), code)
    }

    /// The live token, refreshed first if it has expired.
    pub fn token(&self) -> Result<TokenState> {
        self.session.current_token(&self.config, self.transport.as_ref())
    }

    pub fn refresh_token(&self) -> Result<TokenState> {
        self.session.refresh(&self.config, self.transport.as_ref())
    }

    pub fn user_id(&self) -> Option<String> {
        self.session.user_id()
    }

    // -----------------------------------------------------------------------
    // Resource requests
    // -----------------------------------------------------------------------

    fn resource_request(&self, method: HttpMethod, path: &str, token: &TokenState) -> HttpRequest {
        HttpRequest {
            method,
            url: self.config.resource_url(path),
            headers: vec![
                ("Authorization".to_string(), format!("Bearer {}", token.access_token)),
                ("User-Agent".to_string(), user_agent()),
                ("Accept-Language".to_string(), self.config.unit_system.clone()),
                ("Accept-Locale".to_string(), self.config.locale.clone()),
            ],
            body: None,
        }
    }

    pub fn build_get(&self, path: &str, token: &TokenState) -> HttpRequest {
        self.resource_request(HttpMethod::Get, path, token)
    }

    /// POST request whose JSON body has every key rewritten to camelCase.
    pub fn build_post(&self, path: &str, body: &Value, token: &TokenState) -> Result<HttpRequest> {
        let body = serde_json::to_string(&keys::to_camel_case(body.clone()))
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let mut req = self.resource_request(HttpMethod::Post, path, token);
        req.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        req.body = Some(body);
        Ok(req)
    }

    pub fn build_delete(&self, path: &str, token: &TokenState) -> HttpRequest {
        self.resource_request(HttpMethod::Delete, path, token)
    }

    pub fn parse_response(&self, response: HttpResponse, options: &RequestOptions) -> Result<Payload> {
        parse_payload(response, options.resolve(&self.config))
    }

    fn dispatch(&self, request: HttpRequest, options: &RequestOptions) -> Result<Payload> {
        tracing::debug!(method = request.method.as_str(), url = %request.url, "dispatching request");
        let response = self.transport.execute(request)?;
        tracing::debug!(status = response.status, "response received");
        self.parse_response(response, options)
    }

    pub fn get(&self, path: &str, options: &RequestOptions) -> Result<Payload> {
        let token = self.token()?;
        self.dispatch(self.build_get(path, &token), options)
    }

    pub fn post(&self, path: &str, body: &Value, options: &RequestOptions) -> Result<Payload> {
        let token = self.token()?;
        self.dispatch(self.build_post(path, body, &token)?, options)
    }

    pub fn delete(&self, path: &str, options: &RequestOptions) -> Result<Payload> {
        let token = self.token()?;
        self.dispatch(self.build_delete(path, &token), options)
    }
}

/// Decode a resource response.
///
/// 204 yields `Payload::NoContent` without looking at the body. Any other
/// non-2xx status is an `Error::Api`; a 2xx body that is not JSON is an
/// `Error::Decode`.
pub fn parse_payload(response: HttpResponse, options: KeyOptions) -> Result<Payload> {
    if response.status == 204 {
        return Ok(Payload::NoContent);
    }
    if !response.is_success() {
        return Err(Error::Api {
            status: response.status,
            body: response.body,
        });
    }
    match serde_json::from_str::<Value>(&response.body) {
        Ok(value) => Ok(keys::process_keys(value, options)),
        Err(e) => Err(Error::Decode {
            status: response.status,
            message: e.to_string(),
            body: response.body,
        }),
    }
}
