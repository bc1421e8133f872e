//! Cookie helpers for the OAuth state nonce and the CSRF double-submit token.

use axum::http::{HeaderMap, HeaderValue, header::COOKIE};

/// Short-lived cookie carrying the OAuth `state` nonce
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
/// Script-readable cookie mirrored into `X-CSRF-Token` on disconnect
pub const CSRF_COOKIE: &str = "csrf_token";
/// Header that must echo [`CSRF_COOKIE`]
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Lifetime of the OAuth state cookie
pub const OAUTH_STATE_MAX_AGE_SECS: u64 = 600;
/// Lifetime of the CSRF cookie
pub const CSRF_MAX_AGE_SECS: u64 = 60 * 60 * 24;

/// Attributes applied to a `Set-Cookie` value
#[derive(Debug, Clone, Copy)]
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub max_age_secs: u64,
}

/// Render a `Set-Cookie` value with `Path=/` and `SameSite=Lax`.
pub fn set_cookie(name: &str, value: &str, options: CookieOptions) -> String {
    let mut cookie = format!("{name}={value}; Path=/");
    if options.http_only {
        cookie.push_str("; HttpOnly");
    }
    if options.secure {
        cookie.push_str("; Secure");
    }
    cookie.push_str(&format!("; SameSite=Lax; Max-Age={}", options.max_age_secs));
    cookie
}

pub fn clear_cookie(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Convert a rendered cookie into a header value.
pub fn header_value(cookie: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(cookie).ok()
}

/// Value of cookie `cookie_name` from the request, if present and non-empty.
pub fn extract_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    for raw in headers.get_all(COOKIE) {
        let Ok(raw) = raw.to_str() else { continue };
        for part in raw.split(';') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            if key.trim() == cookie_name {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    None
}
