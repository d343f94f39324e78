//! Security headers for every response.
//!
//! Library data changes underneath the client on every mutation, so JSON
//! responses are never cached and images are always revalidated.

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::{AppConfig, SecurityConfig};

const DEFAULT_HSTS_MAX_AGE: u64 = 31_536_000;

/// Adds the fixed security headers, the optional HSTS/CSP headers from
/// `[security]`, and a caching policy chosen by content type.
///
/// `Cross-Origin-Resource-Policy` is `cross-origin` because the desktop UI
/// loads images from its own origin.
pub async fn security_headers_middleware(
    State(cfg): State<Arc<AppConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    headers.insert(HeaderName::from_static("x-content-type-options"), HeaderValue::from_static("nosniff"));
    headers.insert(HeaderName::from_static("x-frame-options"), HeaderValue::from_static("DENY"));
    headers.insert(HeaderName::from_static("referrer-policy"), HeaderValue::from_static("no-referrer"));
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("cross-origin"),
    );

    if let Some(sec) = cfg.security.as_ref() {
        apply_configured(headers, sec);
    }

    let content_type = headers.get(CONTENT_TYPE).and_then(|ct| ct.to_str().ok()).map(str::to_owned);
    match content_type.as_deref() {
        Some(ct) if ct.starts_with("application/json") => {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }
        Some(ct) if ct.starts_with("image/") => {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        }
        _ => {}
    }

    res
}

fn apply_configured(headers: &mut HeaderMap, sec: &SecurityConfig) {
    if sec.enable_hsts.unwrap_or(false) {
        let max_age = sec.hsts_max_age.unwrap_or(DEFAULT_HSTS_MAX_AGE);
        let include_sub = if sec.hsts_include_subdomains.unwrap_or(false) { "; includeSubDomains" } else { "" };
        if let Ok(value) = HeaderValue::from_str(&format!("max-age={}{}", max_age, include_sub)) {
            headers.insert(HeaderName::from_static("strict-transport-security"), value);
        }
    }
    if let Some(csp) = sec.csp.as_deref().filter(|c| !c.trim().is_empty()) {
        match HeaderValue::from_str(csp) {
            Ok(value) => {
                headers.insert(HeaderName::from_static("content-security-policy"), value);
            }
            Err(e) => tracing::warn!("Ignoring invalid security.csp value: {}", e),
        }
    }
}
