//! Segment forwarding
//!
//! Fetches a resolved origin segment and hands its bytes to the client. The
//! origin address never reaches the client and nothing is stored.

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::Response,
};

/// Client request headers worth passing on to the origin.
const FORWARDED_REQUEST_HEADERS: [&str; 3] = ["range", "if-none-match", "if-modified-since"];

/// Client for segment downloads.
///
/// Only connecting is bounded. Segments can take far longer to transfer than
/// a playlist, so the playlist fetcher's whole-request timeout must not apply.
pub fn build_segment_client(connect_timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(concat!("hlsmerge/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build segment client: {e}"))
}

/// Fetch `address` and return its body with the origin's status.
pub async fn forward_segment(
    client: &reqwest::Client,
    address: &str,
    client_headers: &HeaderMap,
) -> Result<Response, anyhow::Error> {
    let mut request = client.get(address);

    for name in FORWARDED_REQUEST_HEADERS {
        if let Some(value) = client_headers.get(name).and_then(|v| v.to_str().ok()) {
            request = request.header(name, value);
        }
    }

    let origin_response = request
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Segment request failed: {e}"))?;

    let status = origin_response.status();
    let response_headers = origin_response.headers().clone();

    if !status.is_success() {
        tracing::debug!(%status, "Origin refused segment");
    }

    let body_bytes = origin_response
        .bytes()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read segment body: {e}"))?;

    let mut builder =
        Response::builder().status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY));

    for (name, value) in &response_headers {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(v) = value.to_str() {
            builder = builder.header(name.as_str(), v);
        }
    }

    builder = builder.header(header::CACHE_CONTROL, "no-cache");

    builder
        .body(Body::from(body_bytes))
        .map_err(|e| anyhow::anyhow!("Failed to build segment response: {e}"))
}

/// Headers that describe the origin connection rather than the segment.
fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "keep-alive"
            | "transfer-encoding"
            | "content-encoding"
            | "content-length"
            | "cache-control"
            | "set-cookie"
            | "server"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_forward_segment_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live/low/seg1.ts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/mp2t")
                    .insert_header("server", "origin-a")
                    .set_body_bytes(b"TSDATA".to_vec()),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let response = forward_segment(
            &client,
            &format!("{}/live/low/seg1.ts", server.uri()),
            &HeaderMap::new(),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "video/mp2t");
        assert_eq!(response.headers()["cache-control"], "no-cache");
        assert!(response.headers().get("server").is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"TSDATA");
    }

    #[tokio::test]
    async fn test_forward_segment_passes_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_matcher("range", "bytes=0-1"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"TS".to_vec()))
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("range", "bytes=0-1".parse().unwrap());

        let response = forward_segment(&reqwest::Client::new(), &format!("{}/seg.ts", server.uri()), &headers)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    }

    #[tokio::test]
    async fn test_forward_segment_keeps_origin_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let response = forward_segment(&reqwest::Client::new(), &format!("{}/gone.ts", server.uri()), &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_forward_segment_unreachable() {
        let result = forward_segment(&reqwest::Client::new(), "http://127.0.0.1:9/seg.ts", &HeaderMap::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_segment_client_allows_slow_transfer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"SLOW".to_vec())
                    .set_delay(std::time::Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let client = build_segment_client(Duration::from_millis(100)).unwrap();
        let response = forward_segment(&client, &format!("{}/seg.ts", server.uri()), &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_is_hop_by_hop() {
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(!is_hop_by_hop("content-type"));
        assert!(!is_hop_by_hop("content-range"));
    }
}
