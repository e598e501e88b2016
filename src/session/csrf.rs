use http::Method;

use crate::request::Request;

/// The header that carries the CSRF token of xhr and fetch requests.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// The form field and JSON key that carry the CSRF token.
pub const CSRF_FIELD: &str = "csrf_token";

/// Returns true if requests with `method` must present a CSRF token.
///
pub fn requires_token(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Returns true if `request` presents the CSRF token of its session.
///
/// The token is read from the `X-Csrf-Token` header, then the `csrf_token`
/// form field, then the `csrf_token` key of a JSON object body. A request
/// without a session never verifies.
///
pub fn verify(request: &Request) -> bool {
    let Some(expected) = request.csrf_token() else {
        return false;
    };

    let presented = request
        .header(CSRF_HEADER)
        .or_else(|| request.form(CSRF_FIELD))
        .or_else(|| {
            request
                .json()
                .and_then(|json| json.get(CSRF_FIELD))
                .and_then(|token| token.as_str())
        });

    presented.is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()))
}

/// Compares two byte strings in time that depends only on their lengths.
///
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;

    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }

    diff == 0
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::{constant_time_eq, requires_token};

    #[test]
    fn unsafe_methods_require_a_token() {
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            assert!(requires_token(&method), "{}", method);
        }

        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            assert!(!requires_token(&method), "{}", method);
        }
    }

    #[test]
    fn constant_time_comparison() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"tokem"));
        assert!(!constant_time_eq(b"token", b"toke"));
        assert!(constant_time_eq(b"", b""));
    }
}
