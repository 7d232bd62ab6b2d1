//! Client configuration and per-request options.
//!
//! # Design
//! `ClientOptions` is the loose, all-optional input (deserializable, or read
//! from `FITBYTE_*` environment variables). `ClientOptions::into_config`
//! validates it into an immutable `ClientConfig`, filling defaults. Only the
//! two key-casing flags change after construction, through the client.
//!
//! `RequestOptions` holds per-call overrides for the response key transform;
//! `RequestOptions::resolve` merges them over the client defaults into a
//! `KeyOptions` value, per-call values winning.

use serde::{Deserialize, Deserializer};
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_SITE_URL: &str = "https://api.fitbit.com";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://www.fitbit.com/oauth2/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://api.fitbit.com/oauth2/token";
pub const DEFAULT_SCOPE: &[&str] = &[
    "activity",
    "nutrition",
    "profile",
    "settings",
    "sleep",
    "social",
    "weight",
    "heartrate",
];
pub const DEFAULT_UNIT_SYSTEM: &str = "en_US";
pub const DEFAULT_LOCALE: &str = "en_US";
pub const DEFAULT_API_VERSION: &str = "1";

const ENV_PREFIX: &str = "FITBYTE_";

/// Unvalidated client options. Every field is optional here; the three
/// credentials are enforced by `into_config`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub site_url: Option<String>,
    pub authorize_url: Option<String>,
    pub token_url: Option<String>,
    /// Either a list or a single space/comma separated string.
    #[serde(deserialize_with = "deserialize_scope")]
    pub scope: Option<Vec<String>>,
    pub unit_system: Option<String>,
    pub locale: Option<String>,
    pub api_version: Option<String>,
    pub snake_case: Option<bool>,
    pub symbolize_keys: Option<bool>,
}

impl ClientOptions {
    /// Options with the three required credentials set.
    pub fn new(client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            client_secret: Some(client_secret.to_string()),
            redirect_uri: Some(redirect_uri.to_string()),
            ..Self::default()
        }
    }

    /// Read options from `FITBYTE_<OPTION>` environment variables, e.g.
    /// `FITBYTE_CLIENT_ID` or `FITBYTE_SNAKE_CASE`. Unset variables stay
    /// `None`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let flag = |key: &str| -> Result<Option<bool>> {
            lookup(key).map(|raw| parse_bool(key, &raw)).transpose()
        };
        Ok(Self {
            client_id: lookup("CLIENT_ID"),
            client_secret: lookup("CLIENT_SECRET"),
            redirect_uri: lookup("REDIRECT_URI"),
            site_url: lookup("SITE_URL"),
            authorize_url: lookup("AUTHORIZE_URL"),
            token_url: lookup("TOKEN_URL"),
            scope: lookup("SCOPE").map(|raw| split_scope(&raw)),
            unit_system: lookup("UNIT_SYSTEM"),
            locale: lookup("LOCALE"),
            api_version: lookup("API_VERSION"),
            snake_case: flag("SNAKE_CASE")?,
            symbolize_keys: flag("SYMBOLIZE_KEYS")?,
        })
    }

    /// Validate and fill defaults.
    ///
    /// Fails with `Error::InvalidArgument` naming every missing credential,
    /// in the order client_id, client_secret, redirect_uri.
    pub fn into_config(self) -> Result<ClientConfig> {
        let missing: Vec<&str> = [
            ("client_id", self.client_id.is_none()),
            ("client_secret", self.client_secret.is_none()),
            ("redirect_uri", self.redirect_uri.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "Required arguments: {}",
                missing.join(", ")
            )));
        }

        let site_url = parse_url("site_url", self.site_url.as_deref().unwrap_or(DEFAULT_SITE_URL))?;
        let authorize_url = parse_url(
            "authorize_url",
            self.authorize_url.as_deref().unwrap_or(DEFAULT_AUTHORIZE_URL),
        )?;
        let token_url = parse_url("token_url", self.token_url.as_deref().unwrap_or(DEFAULT_TOKEN_URL))?;

        let scope = match self.scope {
            Some(scope) => dedup_scope(scope),
            None => DEFAULT_SCOPE.iter().map(|s| s.to_string()).collect(),
        };

        Ok(ClientConfig {
            client_id: self.client_id.unwrap_or_default(),
            client_secret: self.client_secret.unwrap_or_default(),
            redirect_uri: self.redirect_uri.unwrap_or_default(),
            site_url,
            authorize_url,
            token_url,
            scope,
            unit_system: self.unit_system.unwrap_or_else(|| DEFAULT_UNIT_SYSTEM.to_string()),
            locale: self.locale.unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
            api_version: self.api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            snake_case: self.snake_case.unwrap_or(false),
            symbolize_keys: self.symbolize_keys.unwrap_or(false),
        })
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::InvalidArgument(format!("invalid {field} {raw:?}: {e}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::InvalidArgument(format!(
            "invalid boolean for {ENV_PREFIX}{key}: {raw:?}"
        ))),
    }
}

fn split_scope(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn deserialize_scope<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scope {
        Joined(String),
        List(Vec<String>),
    }

    Ok(Option::<Scope>::deserialize(deserializer)?.map(|scope| match scope {
        Scope::Joined(raw) => split_scope(&raw),
        Scope::List(list) => list,
    }))
}

fn dedup_scope(scope: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(scope.len());
    for s in scope {
        if !seen.contains(&s) {
            seen.push(s);
        }
    }
    seen
}

/// Validated, immutable client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub site_url: Url,
    pub authorize_url: Url,
    pub token_url: Url,
    pub scope: Vec<String>,
    pub unit_system: String,
    pub locale: String,
    pub api_version: String,
    pub snake_case: bool,
    pub symbolize_keys: bool,
}

impl ClientConfig {
    /// Scope as sent to the authorization server: space-joined.
    pub fn scope_param(&self) -> String {
        self.scope.join(" ")
    }

    /// Absolute URL for a resource path: `{site_url}/{api_version}/{path}`.
    pub fn resource_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.site_url.as_str().trim_end_matches('/'),
            self.api_version,
            path.trim_start_matches('/')
        )
    }

    /// Key transform applied when a call carries no overrides.
    pub fn key_options(&self) -> KeyOptions {
        KeyOptions {
            snake_case: self.snake_case,
            symbolize_keys: self.symbolize_keys,
        }
    }
}

/// Per-call overrides for the response key transform. `None` falls back to
/// the client-level setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub snake_case: Option<bool>,
    pub symbolize_keys: Option<bool>,
}

impl RequestOptions {
    pub fn snake_case(mut self, on: bool) -> Self {
        self.snake_case = Some(on);
        self
    }

    pub fn symbolize_keys(mut self, on: bool) -> Self {
        self.symbolize_keys = Some(on);
        self
    }

    pub fn resolve(&self, config: &ClientConfig) -> KeyOptions {
        KeyOptions {
            snake_case: self.snake_case.unwrap_or(config.snake_case),
            symbolize_keys: self.symbolize_keys.unwrap_or(config.symbolize_keys),
        }
    }
}

/// Effective key transform for one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyOptions {
    pub snake_case: bool,
    pub symbolize_keys: bool,
}
