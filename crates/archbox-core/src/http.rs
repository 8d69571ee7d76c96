//! HTTP downloads.
//!
//! Provisioning code is generic over [`Fetch`] so it can be driven by an
//! in-memory source in tests; [`HttpFetcher`] is the reqwest-backed one.

use std::future::Future;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// A response body read chunk by chunk.
pub trait Body: Send {
    /// Next chunk, or `None` at end of body.
    fn chunk(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;
}

/// Something that can open a URL for streaming.
pub trait Fetch: Sync {
    type Body: Body;

    /// Open `url`. Non-success statuses are errors.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Self::Body>> + Send;
}

/// Read a whole body into memory.
pub async fn read_to_end<B: Body>(body: &mut B) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.chunk().await? {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Fetch `url` and decode its body as JSON.
pub async fn get_json<F: Fetch, T: DeserializeOwned>(fetcher: &F, url: &str) -> Result<T> {
    let mut body = fetcher.fetch(url).await?;
    let bytes = read_to_end(&mut body).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// reqwest-backed [`Fetch`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        // reqwest is built with rustls-no-provider; `Err` only means a
        // provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .user_agent(concat!("archbox-connect/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { http })
    }

    /// Check HTTP response status, returning error for non-success codes.
    fn check_status(url: &str, resp: &reqwest::Response) -> Result<()> {
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Streaming body of a [`HttpFetcher`] response.
#[derive(Debug)]
pub struct HttpBody {
    url: String,
    resp: reqwest::Response,
}

impl Body for HttpBody {
    async fn chunk(&mut self) -> Result<Option<Vec<u8>>> {
        self.resp
            .chunk()
            .await
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .map_err(|e| Error::Network {
                url: self.url.clone(),
                reason: e.to_string(),
            })
    }
}

impl Fetch for HttpFetcher {
    type Body = HttpBody;

    async fn fetch(&self, url: &str) -> Result<HttpBody> {
        tracing::debug!(%url, "GET");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Self::check_status(url, &resp)?;
        Ok(HttpBody {
            url: url.to_string(),
            resp,
        })
    }
}


#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::fake::FakeFetcher;
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Release {
        tag_name: String,
    }

    #[tokio::test]
    async fn get_json_decodes_body() {
        let fetcher =
            FakeFetcher::default().serve("https://api.test/latest", br#"{"tag_name":"v6.1.0"}"#.to_vec());
        let release: Release = get_json(&fetcher, "https://api.test/latest").await.unwrap();
        assert_eq!(release.tag_name, "v6.1.0");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn non_success_status_is_error() {
        let fetcher = FakeFetcher::default().status("https://api.test/latest", 503);
        let err = get_json::<_, Release>(&fetcher, "https://api.test/latest")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn read_to_end_concatenates_chunks() {
        let payload = vec![7u8; 10_000];
        let fetcher = FakeFetcher::default().serve("https://dl.test/blob", payload.clone());
        let mut body = fetcher.fetch("https://dl.test/blob").await.unwrap();
        assert_eq!(read_to_end(&mut body).await.unwrap(), payload);
    }

    #[test]
    fn http_fetcher_builds() {
        assert!(HttpFetcher::new().is_ok());
    }
}
