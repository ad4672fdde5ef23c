//! Raw authenticated GET used by the download workers

use async_trait::async_trait;
use reqwest::header::{HeaderMap, COOKIE};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::errors::HarvestError;

/// Response of a raw fetch, whatever its status
#[derive(Debug, Clone, Default)]
pub struct FetchedResource {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchedResource {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` with `cookie_header` attached
    async fn fetch(&self, url: &str, cookie_header: &str) -> Result<FetchedResource, HarvestError>;
}

/// reqwest-backed fetcher; independent of the browsing session's client
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, HarvestError> {
        let client = Client::builder()
            .user_agent(&config.http.user_agent)
            .timeout(config.http_timeout())
            .build()?;

        Ok(Self {
            client,
            timeout: config.http_timeout(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, cookie_header: &str) -> Result<FetchedResource, HarvestError> {
        debug!("Fetching {}", url);

        let mut request = self.client.get(url);
        if !cookie_header.is_empty() {
            request = request.header(COOKIE, cookie_header);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e, url))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e, url))?
            .to_vec();

        Ok(FetchedResource {
            status,
            headers,
            body,
        })
    }
}

impl HttpFetcher {
    fn transport_error(&self, e: reqwest::Error, url: &str) -> HarvestError {
        if e.is_timeout() {
            HarvestError::Timeout {
                url: url.to_string(),
                seconds: self.timeout.as_secs(),
            }
        } else {
            HarvestError::Http(e)
        }
    }
}
