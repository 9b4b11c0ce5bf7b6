//! Playlist transport
//!
//! Pure HTTP fetching of playlist bodies. Anything other than a 200 with a
//! non-empty body is a failure; the engine decides what a failure means.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, StatusCode};

use crate::config::FetchConfig;
use crate::error::{FetchError, MAX_PLAYLIST_SIZE};

/// A successfully fetched playlist body.
#[derive(Debug, Clone)]
pub struct FetchedPlaylist {
    /// Final address after redirects; relative references resolve against it.
    pub address: String,
    pub body: Bytes,
}

#[async_trait]
pub trait PlaylistFetcher: Send + Sync {
    async fn fetch(&self, address: &str) -> Result<FetchedPlaylist, FetchError>;
}

/// reqwest-backed fetcher sharing one connection pool across all origins.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .pool_max_idle_per_host(10)
            .user_agent(concat!("hlsmerge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PlaylistFetcher for HttpFetcher {
    async fn fetch(&self, address: &str) -> Result<FetchedPlaylist, FetchError> {
        let mut response = self.client.get(address).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                status,
                url: response.url().to_string(),
            });
        }

        if let Some(len) = response.content_length() {
            if len > MAX_PLAYLIST_SIZE {
                return Err(FetchError::TooLarge { size: len });
            }
        }

        // Content-Length is optional; enforce the limit while reading
        let final_address = response.url().to_string();
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            let size = body.len() as u64 + chunk.len() as u64;
            if size > MAX_PLAYLIST_SIZE {
                return Err(FetchError::TooLarge { size });
            }
            body.extend_from_slice(&chunk);
        }
        if body.is_empty() {
            return Err(FetchError::EmptyBody(final_address));
        }

        Ok(FetchedPlaylist {
            address: final_address,
            body: body.freeze(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&FetchConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live/master.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n"))
            .mount(&server)
            .await;

        let address = format!("{}/live/master.m3u8", server.uri());
        let fetched = fetcher().fetch(&address).await.unwrap();
        assert_eq!(fetched.address, address);
        assert_eq!(&fetched.body[..], b"#EXTM3U\n");
    }

    #[tokio::test]
    async fn test_fetch_non_200_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/live/master.m3u8", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Status { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE
        ));
    }

    #[tokio::test]
    async fn test_fetch_other_2xx_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/live/master.m3u8", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { .. }));
    }

    #[tokio::test]
    async fn test_fetch_empty_body_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/live/master.m3u8", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::EmptyBody(_)));
    }

    #[tokio::test]
    async fn test_fetch_oversize_body_fails() {
        let server = MockServer::start().await;
        let oversize = vec![b'#'; (MAX_PLAYLIST_SIZE + 1) as usize];
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(oversize))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/live/master.m3u8", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { size } if size > MAX_PLAYLIST_SIZE));
    }

    #[tokio::test]
    async fn test_fetch_chunked_body_stops_at_limit() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Origin streams chunks forever without a Content-Length
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}/live/master.m3u8", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let head = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n";
            if socket.write_all(head).await.is_err() {
                return;
            }
            let chunk = vec![b'#'; 1024 * 1024];
            let size_line = format!("{:x}\r\n", chunk.len());
            loop {
                if socket.write_all(size_line.as_bytes()).await.is_err()
                    || socket.write_all(&chunk).await.is_err()
                    || socket.write_all(b"\r\n").await.is_err()
                {
                    break;
                }
            }
        });

        let err = fetcher().fetch(&address).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { size } if size > MAX_PLAYLIST_SIZE));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_fails() {
        // Port 9 (discard) on localhost is not served in the test environment
        let err = fetcher().fetch("http://127.0.0.1:9/master.m3u8").await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("#EXTM3U\n")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let config = FetchConfig {
            timeout_ms: 50,
            connect_timeout_ms: 50,
        };
        let err = HttpFetcher::new(&config)
            .unwrap()
            .fetch(&format!("{}/live/master.m3u8", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }
}
