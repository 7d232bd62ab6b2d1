//! Recursive key rewriting for decoded JSON.
//!
//! # Design
//! The Fitbit API speaks camelCase. Responses can be rewritten to snake_case
//! (and optionally to symbolized keys) for callers that prefer it; request
//! bodies are always rewritten to camelCase before they go on the wire.
//!
//! All transforms consume a `serde_json::Value` and rebuild it depth-first.
//! Only mapping keys change: scalars, including string values, pass through
//! untouched, and arrays are transformed element by element.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::KeyOptions;
use crate::types::{Payload, Symbol, SymbolValue};

/// Rewrite a single key from camelCase or PascalCase to snake_case.
///
/// An underscore goes in front of an uppercase letter that follows a
/// lowercase letter or digit, and in front of the last capital of an
/// acronym run that is followed by a lowercase letter (`HTTPResponse` ->
/// `http_response`). Hyphens become underscores. Already snake_case input
/// comes back unchanged.
pub fn snake_case_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' {
            out.push('_');
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Rewrite a single key from snake_case to camelCase.
///
/// Each underscore that sits between two word characters is dropped and the
/// character after it uppercased. Leading, trailing and repeated underscores
/// are kept. Already camelCase input comes back unchanged.
pub fn camel_case_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            let prev_is_word = i > 0 && chars[i - 1] != '_';
            let next_is_word = chars.get(i + 1).is_some_and(|n| n.is_alphanumeric());
            if prev_is_word && next_is_word {
                upper_next = true;
                continue;
            }
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn map_keys(value: Value, rename: &impl Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (rename(&k), map_keys(v, rename)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| map_keys(v, rename)).collect()),
        scalar => scalar,
    }
}

/// Rewrite every mapping key in `value` to snake_case.
pub fn to_snake_case(value: Value) -> Value {
    map_keys(value, &snake_case_key)
}

/// Rewrite every mapping key in `value` to camelCase.
pub fn to_camel_case(value: Value) -> Value {
    map_keys(value, &camel_case_key)
}

/// Convert every mapping key in `value` to a `Symbol`. Identical key names
/// within the document share one interned allocation.
pub fn symbolize_keys(value: Value) -> SymbolValue {
    let mut interned = HashSet::new();
    symbolize(value, &mut interned)
}

fn intern(interned: &mut HashSet<Arc<str>>, name: String) -> Symbol {
    if let Some(existing) = interned.get(name.as_str()) {
        return Symbol::from(Arc::clone(existing));
    }
    let name: Arc<str> = Arc::from(name);
    interned.insert(Arc::clone(&name));
    Symbol::from(name)
}

fn symbolize(value: Value, interned: &mut HashSet<Arc<str>>) -> SymbolValue {
    match value {
        Value::Null => SymbolValue::Null,
        Value::Bool(b) => SymbolValue::Bool(b),
        Value::Number(n) => SymbolValue::Number(n),
        Value::String(s) => SymbolValue::String(s),
        Value::Array(items) => {
            SymbolValue::Array(items.into_iter().map(|v| symbolize(v, interned)).collect())
        }
        Value::Object(map) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                let key = intern(interned, k);
                let v = symbolize(v, interned);
                out.insert(key, v);
            }
            SymbolValue::Object(out)
        }
    }
}

/// Apply the effective response transform: snake_case first, then
/// symbolization.
pub fn process_keys(value: Value, options: KeyOptions) -> Payload {
    let value = if options.snake_case {
        to_snake_case(value)
    } else {
        value
    };
    if options.symbolize_keys {
        Payload::Symbolized(symbolize_keys(value))
    } else {
        Payload::Json(value)
    }
}
