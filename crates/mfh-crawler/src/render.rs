use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{CrawlerConfig, RenderConfig};
use crate::error::{reports_unresolved_host, FetchError};

/// Produces the script-executed markup of a page.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, FetchError>;
}

/// Headless Chromium renderer, one isolated browser per call.
#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    config: RenderConfig,
    user_agent: String,
    proxy: Option<String>,
    request_timeout: Duration,
}

impl ChromiumRenderer {
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            config: config.render.clone(),
            user_agent: config.user_agent.clone(),
            proxy: config.proxy.clone(),
            request_timeout: Duration::from_secs(config.request_timeout),
        }
    }

    fn browser_config(&self, url: &str) -> Result<BrowserConfig, FetchError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(self.request_timeout)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");

        if let Some(exe) = &self.config.chrome_executable {
            builder = builder.chrome_executable(exe);
        }
        if let Some(proxy) = &self.proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }

        builder.build().map_err(|message| FetchError::Browser {
            url: url.to_string(),
            message,
            transient: false,
        })
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &str) -> Result<String, FetchError> {
        let session = BrowserSession::launch(self.browser_config(url)?, url).await?;
        let res = session.capture(self, url).await;
        session.close().await;
        res
    }
}

struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(config: BrowserConfig, url: &str) -> Result<Self, FetchError> {
        let (browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| FetchError::Browser {
                    url: url.to_string(),
                    message: format!("Couldn't launch browser: {e}"),
                    transient: false,
                })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self { browser, handler })
    }

    async fn capture(&self, renderer: &ChromiumRenderer, url: &str) -> Result<String, FetchError> {
        let bound = Duration::from_secs(renderer.config.timeout_secs);
        let page = time::timeout(bound, self.open(renderer, url))
            .await
            .map_err(|_| FetchError::RenderTimeout {
                url: url.to_string(),
                after: bound,
            })??;

        if renderer.config.settle_ms > 0 {
            time::sleep(Duration::from_millis(renderer.config.settle_ms)).await;
        }

        let html = page.content().await.map_err(|e| navigation_error(url, e))?;
        page.close().await.ok();
        Ok(html)
    }

    /// Navigates and polls until the content marker is in the DOM.
    async fn open(&self, renderer: &ChromiumRenderer, url: &str) -> Result<Page, FetchError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| navigation_error(url, e))?;
        page.set_user_agent(renderer.user_agent.as_str())
            .await
            .map_err(|e| navigation_error(url, e))?;
        page.goto(url).await.map_err(|e| navigation_error(url, e))?;

        let marker = renderer.config.wait_for.as_str();
        while page.find_element(marker).await.is_err() {
            time::sleep(Duration::from_millis(200)).await;
        }
        log::debug!("Marker {marker} rendered for {url}");

        Ok(page)
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            log::debug!("Couldn't close browser: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            log::debug!("Couldn't reap browser process: {e}");
        }
        self.handler.abort();
        self.handler.await.ok();
    }
}

fn navigation_error(url: &str, e: chromiumoxide::error::CdpError) -> FetchError {
    browser_error(url, e.to_string())
}

/// An unknown host won't resolve on the next attempt either.
fn browser_error(url: &str, message: String) -> FetchError {
    FetchError::Browser {
        url: url.to_string(),
        transient: !reports_unresolved_host(&message),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn proxy_and_executable_reach_browser_config() {
        let mut conf = CrawlerConfig {
            proxy: Some("http://proxy.local:3128".into()),
            ..Default::default()
        };
        conf.render.chrome_executable = Some("/usr/bin/chromium".into());
        let renderer = ChromiumRenderer::new(&conf);
        assert_eq!(renderer.proxy.as_deref(), Some("http://proxy.local:3128"));
        assert!(renderer.browser_config("https://example.com").is_ok());
    }

    #[test]
    fn unresolved_hosts_are_not_retried() {
        let err = browser_error("https://nowhere.invalid", "net::ERR_NAME_NOT_RESOLVED".into());
        assert!(matches!(err, FetchError::Browser { transient: false, .. }));
        assert_eq!(err.class(), ErrorClass::Permanent);

        let err = browser_error("https://funds.test", "Request timed out.".into());
        assert!(matches!(err, FetchError::Browser { transient: true, .. }));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn renders_data_url() {
        let mut conf = CrawlerConfig::default();
        conf.render.settle_ms = 0;
        conf.render.timeout_secs = 10;
        let html = ChromiumRenderer::new(&conf)
            .render("data:text/html,<h1>Rendered</h1>")
            .await
            .unwrap();
        assert!(html.contains("Rendered"));
    }
}
