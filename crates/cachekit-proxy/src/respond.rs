//! Cache conversions and synthesized degraded responses.
//!
//! Degraded responses are distinguishable by status and minimal body: an
//! empty stylesheet or script keeps pages rendering, the gateway-timeout
//! placeholder lets them detect offline mode.

use bytes::Bytes;
use hashbrown::HashMap;
use http::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use url::Url;

use cachekit_net::Response;
use cachekit_store::StoredResponse;

fn no_cache_headers(content_type: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

/// Minimal empty stylesheet, never cacheable.
pub fn empty_stylesheet(url: Url) -> Response {
    Response::synthesized(url, StatusCode::OK, no_cache_headers("text/css"), Bytes::new())
}

/// Minimal empty script, never cacheable.
pub fn empty_script(url: Url) -> Response {
    Response::synthesized(
        url,
        StatusCode::OK,
        no_cache_headers("application/javascript"),
        Bytes::new(),
    )
}

/// Offline placeholder: gateway-timeout status, no body.
pub fn offline_placeholder(url: Url) -> Response {
    Response::synthesized(url, StatusCode::GATEWAY_TIMEOUT, HeaderMap::new(), Bytes::new())
}

/// Capture a network response under the original request's identity.
pub fn to_stored(request_url: &Url, response: &Response) -> StoredResponse {
    let mut headers = HashMap::new();
    for (name, value) in response.headers.iter() {
        if let Ok(v) = value.to_str() {
            headers.insert(name.as_str().to_string(), v.to_string());
        }
    }

    StoredResponse::get(
        request_url.as_str(),
        response.status.as_u16(),
        headers,
        response.body.to_vec(),
    )
}

/// Rebuild a response from a stored entry, served for the given request.
pub fn from_stored(request_url: &Url, entry: &StoredResponse) -> Response {
    let mut headers = HeaderMap::new();
    for (name, value) in &entry.headers {
        if let (Ok(n), Ok(v)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            headers.insert(n, v);
        }
    }

    Response {
        url: request_url.clone(),
        status: StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK),
        headers,
        body: Bytes::from(entry.body.clone()),
        kind: cachekit_net::ResponseKind::Basic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachekit_net::ResponseKind;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_empty_stylesheet() {
        let response = empty_stylesheet(url("https://app.test/assets/styles.css"));

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("content-type"), Some("text/css"));
        assert_eq!(
            response.header("cache-control"),
            Some("no-cache, no-store, must-revalidate")
        );
        assert!(response.body.is_empty());
        assert_eq!(response.kind, ResponseKind::Synthesized);
    }

    #[test]
    fn test_empty_script() {
        let response = empty_script(url("https://app.test/assets/app.js"));

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("content-type"), Some("application/javascript"));
        assert_eq!(response.header("pragma"), Some("no-cache"));
    }

    #[test]
    fn test_offline_placeholder() {
        let response = offline_placeholder(url("https://app.test/reports/42"));

        assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
        assert!(response.body.is_empty());
        assert!(response.headers.is_empty());
    }

    #[test]
    fn test_stored_roundtrip() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/html"));
        let original = Response {
            url: url("https://app.test/"),
            status: StatusCode::OK,
            headers,
            body: Bytes::from("<html/>"),
            kind: ResponseKind::Basic,
        };

        let request_url = url("https://app.test/?utm=1");
        let entry = to_stored(&request_url, &original);
        assert_eq!(entry.url, "https://app.test/?utm=1");
        assert_eq!(entry.method, "GET");

        let served = from_stored(&request_url, &entry);
        assert_eq!(served.status, StatusCode::OK);
        assert_eq!(served.header("content-type"), Some("text/html"));
        assert_eq!(served.body, Bytes::from("<html/>"));
    }
}
