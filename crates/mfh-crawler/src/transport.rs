use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use url::Url;

use crate::config::CrawlerConfig;
use crate::error::FetchError;
use crate::limiter::RateLimiter;

/// Plain HTTP GET behind the shared politeness limiter.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl Transport {
    pub fn new(config: &CrawlerConfig) -> anyhow::Result<Self> {
        Self::with_limiter(config, RateLimiter::new(config.throttle))
    }

    pub fn with_limiter(config: &CrawlerConfig, limiter: RateLimiter) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let mut builder = reqwest::ClientBuilder::new()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .gzip(true)
            .deflate(true)
            .timeout(Duration::from_secs(config.request_timeout));

        builder = match &config.proxy {
            Some(proxy) => {
                log::info!("Using proxy: {proxy}");
                builder.proxy(reqwest::Proxy::all(proxy.as_str())?)
            }
            None => builder.no_proxy(),
        };

        Ok(Self {
            client: builder.build()?,
            limiter,
        })
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn get(&self, url: &str) -> Result<String, FetchError> {
        let target = Url::parse(url).map_err(|source| FetchError::MalformedUrl {
            url: url.to_string(),
            source,
        })?;

        let _permit = self.limiter.acquire().await;
        log::debug!("GET {url}");

        let resp = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        resp.text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
    }
}
