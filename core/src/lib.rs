//! Blocking client core for the Fitbit web API.
//!
//! # Overview
//! Runs the OAuth2 authorization-code grant (authorization URL, code
//! exchange, transparent refresh of expired tokens), dispatches authenticated
//! GET/POST/DELETE calls, and normalizes JSON key casing on the way in and
//! out.
//!
//! # Design
//! - Every network interaction is split into `build_*` (produces an
//!   `HttpRequest`) and `parse_*` (consumes an `HttpResponse`); the
//!   round-trip goes through the `Transport` trait, `UreqTransport` by
//!   default. The build/parse halves are deterministic and testable without
//!   a server.
//! - `OAuthSession` owns the single live `TokenState` behind a mutex, so a
//!   refresh replaces it atomically and concurrent callers never refresh
//!   twice.
//! - Responses are `serde_json::Value` trees rewritten by pure recursive
//!   transforms in `keys`; request bodies always go out camelCase.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod keys;
pub mod resources;
pub mod types;

#[cfg(test)]
mod test_support;

pub use auth::OAuthSession;
pub use client::FitbyteClient;
pub use config::{ClientConfig, ClientOptions, KeyOptions, RequestOptions};
pub use error::{Error, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use resources::Period;
pub use types::{Payload, Symbol, SymbolValue, TokenState};
