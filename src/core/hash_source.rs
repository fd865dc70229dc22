//! Hash-key sources for [`crate::core::balancer::Balancer::ConsistentHashModulo`]:
//! derive a stable string key from a request via the client IP, a header, or
//! a cookie (optionally base64+JSON encoded, optionally auto-injected).

use axum::{body::Body, http::Request};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use uuid::Uuid;

use crate::core::balancer::InjectCookie;

/// Default cookie name used when `inject_if_missing` is set without an
/// explicit `name`.
pub const DEFAULT_COOKIE_NAME: &str = "stormgate-id";

#[derive(Debug, Clone)]
pub enum HashSource {
    Ip,
    Header {
        key_name: String,
    },
    Cookie {
        cookie_name: String,
        cookie_key: Option<String>,
        inject_if_missing: bool,
    },
}

impl HashSource {
    /// Derive the hash key for `request`. Returns an empty string when no
    /// key can be derived. A cookie source that mints a fresh value records
    /// it as an [`InjectCookie`] request extension for the dispatcher to
    /// read back after `pick` returns.
    pub fn get_source(&self, request: &mut Request<Body>) -> String {
        match self {
            HashSource::Ip => ip_source(request),
            HashSource::Header { key_name } => request
                .headers()
                .get(key_name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string(),
            HashSource::Cookie {
                cookie_name,
                cookie_key,
                inject_if_missing,
            } => cookie_source(request, cookie_name, cookie_key.as_deref(), *inject_if_missing),
        }
    }
}

fn ip_source(request: &Request<Body>) -> String {
    if let Some(value) = header_value(request, "x-forwarded-for") {
        return value;
    }
    if let Some(value) = header_value(request, "x-real-ip") {
        return value;
    }
    request
        .extensions()
        .get::<std::net::SocketAddr>()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default()
}

fn header_value(request: &Request<Body>, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn cookie_source(
    request: &mut Request<Body>,
    cookie_name: &str,
    cookie_key: Option<&str>,
    inject_if_missing: bool,
) -> String {
    match find_cookie(request, cookie_name) {
        Some(raw_value) => match cookie_key {
            None => raw_value,
            Some(key) => decode_cookie_key(&raw_value, key),
        },
        None => {
            if inject_if_missing {
                let fresh = Uuid::new_v4().to_string();
                request
                    .extensions_mut()
                    .insert(InjectCookie(fresh.clone()));
                fresh
            } else {
                String::new()
            }
        }
    }
}

fn find_cookie(request: &Request<Body>, cookie_name: &str) -> Option<String> {
    let header = request.headers().get(axum::http::header::COOKIE)?;
    let header = header.to_str().ok()?;
    for pair in header.split(';') {
        let pair = pair.trim();
        let (name, value) = pair.split_once('=')?;
        if name.trim() == cookie_name {
            return Some(value.trim().to_string());
        }
    }
    None
}

/// Base64-decode the cookie value, parse it as JSON, and stringify the
/// value at `key`. Any failure (bad base64, bad JSON, missing/null key)
/// yields an empty string.
fn decode_cookie_key(raw_value: &str, key: &str) -> String {
    let Ok(decoded) = BASE64.decode(raw_value) else {
        return String::new();
    };
    let Ok(parsed) = serde_json::from_slice::<serde_json::Value>(&decoded) else {
        return String::new();
    };
    match parsed.get(key) {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        // Scalars (numbers, bools) stringify to their plain text; arrays and
        // objects fall through to their JSON text rather than being treated
        // as empty.
        Some(other) => other.to_string(),
    }
}
