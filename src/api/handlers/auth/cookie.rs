//! Client-side state binding.
//!
//! The state token is bound to the browser with an `HttpOnly` cookie, there is
//! no server-side session store. Setting a new cookie replaces any previous
//! binding, clearing it makes the token single use.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};

pub const STATE_COOKIE_NAME: &str = "oauth_state";
pub const STATE_COOKIE_MAX_AGE_SECONDS: u64 = 5 * 60;

const CLEAR_STATE_COOKIE: &str = "oauth_state=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Lax";

/// Build the `Set-Cookie` value binding `token` to the client.
pub(super) fn state_cookie(token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{STATE_COOKIE_NAME}={token}; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age={STATE_COOKIE_MAX_AGE_SECONDS}"
    ))
}

/// `Set-Cookie` value that expires the binding immediately.
pub(super) fn clear_state_cookie() -> HeaderValue {
    HeaderValue::from_static(CLEAR_STATE_COOKIE)
}

/// Read the bound state token from the request cookies.
///
/// Browsers may split cookies over several `Cookie` headers; all are searched.
pub(super) fn extract_state_cookie(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE).iter() {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == STATE_COOKIE_NAME {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

/// Whether the returned `state` matches the bound token.
///
/// A missing or empty binding never matches. The comparison does not
/// short-circuit on the first differing byte.
pub(super) fn state_matches(bound: Option<&str>, returned: &str) -> bool {
    let Some(bound) = bound else {
        return false;
    };
    if bound.is_empty() || bound.len() != returned.len() {
        return false;
    }
    bound
        .bytes()
        .zip(returned.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
