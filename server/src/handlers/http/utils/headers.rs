use hyper::header::{AUTHORIZATION, COOKIE, HeaderMap};
use tracing::debug;

/// Cookie the browser client carries its access token in.
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// Extract a header value as a string
pub fn get_header_value(headers: &HeaderMap, name: impl hyper::header::AsHeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Extract cookie value by name
pub fn get_cookie<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    get_header_value(headers, COOKIE)?
        .split(';')
        .find_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            (name.trim() == cookie_name).then(|| value.trim())
        })
        .filter(|value| !value.is_empty())
}

/// Extract bearer token from Authorization header
/// Format: "Authorization: Bearer <token>"
pub fn get_bearer_token(headers: &HeaderMap) -> Option<&str> {
    get_header_value(headers, AUTHORIZATION)?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Bearer header first, then the access-token cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = get_bearer_token(headers) {
        return Some(token);
    }
    let token = get_cookie(headers, ACCESS_TOKEN_COOKIE);
    if token.is_some() {
        debug!("Using token from {} cookie", ACCESS_TOKEN_COOKIE);
    }
    token
}
