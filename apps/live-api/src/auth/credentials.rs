//! Bearer credential extraction from the connection request.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

/// Pull the bearer token from `Authorization: Bearer <token>`, falling back
/// to the `access_token` query parameter.
///
/// A header with another scheme, or an empty token, counts as no credential.
pub fn bearer_token(headers: &HeaderMap, access_token: Option<&str>) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    from_header
        .or_else(|| access_token.map(str::trim).filter(|t| !t.is_empty()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(auth: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        map
    }

    #[test]
    fn reads_bearer_header() {
        assert_eq!(bearer_token(&headers("Bearer abc.def"), None).as_deref(), Some("abc.def"));
    }

    #[test]
    fn header_wins_over_query() {
        assert_eq!(
            bearer_token(&headers("Bearer from-header"), Some("from-query")).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn falls_back_to_query_parameter() {
        assert_eq!(bearer_token(&HeaderMap::new(), Some("q")).as_deref(), Some("q"));
    }

    #[test]
    fn other_schemes_and_blank_tokens_are_missing() {
        assert!(bearer_token(&headers("Basic dXNlcjpwYXNz"), None).is_none());
        assert!(bearer_token(&headers("Bearer    "), None).is_none());
        assert!(bearer_token(&HeaderMap::new(), Some("")).is_none());
        assert!(bearer_token(&HeaderMap::new(), None).is_none());
    }
}
