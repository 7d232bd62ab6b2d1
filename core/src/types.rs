//! Value types shared by the client: tokens, symbolized JSON, and the
//! payload returned by resource calls.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Number, Value};

/// Live OAuth2 credentials for one user.
///
/// Replaced wholesale on refresh, never edited in place. Serializable so
/// callers can persist it and restore a session later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// `None` means the token server gave no lifetime; such a token never
    /// counts as expired.
    pub expires_at: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
}

impl TokenState {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// An interned mapping key.
///
/// Keys produced by one `symbolize_keys` pass share a single allocation per
/// distinct name, so cloning or comparing them is cheap.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Arc<str>> for Symbol {
    fn from(name: Arc<str>) -> Self {
        Symbol(name)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol(Arc::from(name))
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// JSON value whose mapping keys are `Symbol`s.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SymbolValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<SymbolValue>),
    Object(BTreeMap<Symbol, SymbolValue>),
}

impl SymbolValue {
    /// Look up `key` in an object; `None` for other variants.
    pub fn get(&self, key: &str) -> Option<&SymbolValue> {
        match self {
            SymbolValue::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SymbolValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<SymbolValue> for Value {
    fn from(value: SymbolValue) -> Self {
        match value {
            SymbolValue::Null => Value::Null,
            SymbolValue::Bool(b) => Value::Bool(b),
            SymbolValue::Number(n) => Value::Number(n),
            SymbolValue::String(s) => Value::String(s),
            SymbolValue::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            SymbolValue::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k.as_str().to_string(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Result of a resource call.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The server answered 204; there was no body to decode.
    NoContent,
    /// Decoded JSON with string keys.
    Json(Value),
    /// Decoded JSON with symbolized keys.
    Symbolized(SymbolValue),
}

impl Payload {
    pub fn is_no_content(&self) -> bool {
        matches!(self, Payload::NoContent)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_symbolized(&self) -> Option<&SymbolValue> {
        match self {
            Payload::Symbolized(value) => Some(value),
            _ => None,
        }
    }

    /// Decoded body as plain JSON, converting symbolized keys back to
    /// strings. `None` for `NoContent`.
    pub fn into_json(self) -> Option<Value> {
        match self {
            Payload::NoContent => None,
            Payload::Json(value) => Some(value),
            Payload::Symbolized(value) => Some(value.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    fn token(expires_at: Option<DateTime<Utc>>) -> TokenState {
        TokenState {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_at,
            user_id: Some("ABC123".to_string()),
        }
    }

    #[test]
    fn token_expires_at_the_boundary() {
        let now = Utc::now();
        assert!(token(Some(now)).is_expired_at(now));
        assert!(token(Some(now - Duration::seconds(1))).is_expired_at(now));
        assert!(!token(Some(now + Duration::seconds(1))).is_expired_at(now));
    }

    #[test]
    fn token_without_lifetime_never_expires() {
        assert!(!token(None).is_expired());
    }

    #[test]
    fn token_state_persists_as_json() {
        let original = token(Some(Utc::now()));
        let stored = serde_json::to_string(&original).unwrap();
        let restored: TokenState = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn symbol_value_serializes_like_plain_json() {
        let value = SymbolValue::Object(BTreeMap::from([(
            Symbol::from("steps"),
            SymbolValue::Array(vec![SymbolValue::Number(Number::from(10)), SymbolValue::Null]),
        )]));
        assert_eq!(serde_json::to_value(&value).unwrap(), json!({"steps": [10, null]}));
        assert_eq!(format!("{:?}", Symbol::from("steps")), ":steps");
    }

    #[test]
    fn payload_into_json() {
        assert_eq!(Payload::NoContent.into_json(), None);
        assert!(Payload::NoContent.is_no_content());
        let sym = SymbolValue::Object(BTreeMap::from([(
            Symbol::from("a"),
            SymbolValue::Bool(true),
        )]));
        assert_eq!(Payload::Symbolized(sym).into_json(), Some(json!({"a": true})));
    }
}
