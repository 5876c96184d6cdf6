use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_throttle")]
    pub throttle: Option<Throttle>,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub sufficiency: Sufficiency,

    /// CSS selector of the embedded JSON blob passed on to scrapers
    #[serde(default = "default_structured_data")]
    pub structured_data: String,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default = "default_max_listing_pages")]
    pub max_listing_pages: usize,

    #[serde(default)]
    pub item_limit: Option<usize>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            throttle: default_throttle(),
            concurrency: default_concurrency(),
            request_timeout: default_request_timeout(),
            proxy: None,
            retry: RetryConfig::default(),
            sufficiency: Sufficiency::default(),
            structured_data: default_structured_data(),
            render: RenderConfig::default(),
            max_listing_pages: default_max_listing_pages(),
            item_limit: None,
        }
    }
}

fn default_user_agent() -> String {
    String::from(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    )
}

fn default_throttle() -> Option<Throttle> {
    Some(Throttle::Delay(0.8))
}

fn default_concurrency() -> usize {
    1
}

fn default_request_timeout() -> u64 {
    30
}

fn default_structured_data() -> String {
    String::from("script#__NEXT_DATA__")
}

fn default_max_listing_pages() -> usize {
    10
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Throttle {
    /// The maximum number of concurrent requests
    Concurrent(usize),
    /// The number of requests per second
    PerSecond(usize),
    /// The delay in seconds between requests
    Delay(f32),
}

impl Default for Throttle {
    fn default() -> Self {
        Self::Delay(0.8)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Fraction of the computed delay used as a +/- jitter range
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.1
}

/// Decides whether a statically fetched document already carries the data.
///
/// A document is sufficient when the `marker` element exists with at least
/// `min_marker_bytes` of content, or when at least `min_anchors` of the
/// `anchors` labels appear (case-insensitively) anywhere in the markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sufficiency {
    #[serde(default = "default_marker")]
    pub marker: String,

    #[serde(default = "default_min_marker_bytes")]
    pub min_marker_bytes: usize,

    #[serde(default = "default_anchors")]
    pub anchors: Vec<String>,

    #[serde(default = "default_min_anchors")]
    pub min_anchors: usize,
}

impl Default for Sufficiency {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            min_marker_bytes: default_min_marker_bytes(),
            anchors: default_anchors(),
            min_anchors: default_min_anchors(),
        }
    }
}

fn default_marker() -> String {
    String::from("script#__NEXT_DATA__")
}

fn default_min_marker_bytes() -> usize {
    64
}

fn default_anchors() -> Vec<String> {
    [
        "AUM",
        "Expense Ratio",
        "Alpha",
        "Sharpe",
        "Beta",
        "Standard Deviation",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_min_anchors() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    #[serde(default = "default_render_enabled")]
    pub enabled: bool,

    /// Hard bound in seconds for navigation plus content wait
    #[serde(default = "default_render_timeout")]
    pub timeout_secs: u64,

    /// CSS selector that must be present in the rendered DOM
    #[serde(default = "default_wait_for")]
    pub wait_for: String,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default)]
    pub chrome_executable: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: default_render_enabled(),
            timeout_secs: default_render_timeout(),
            wait_for: default_wait_for(),
            settle_ms: default_settle_ms(),
            chrome_executable: None,
        }
    }
}

fn default_render_enabled() -> bool {
    true
}

fn default_render_timeout() -> u64 {
    30
}

fn default_wait_for() -> String {
    String::from("h1")
}

fn default_settle_ms() -> u64 {
    2_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
concurrency: 4
throttle:
  PerSecond: 2
retry:
  maxAttempts: 5
sufficiency:
  minAnchors: 3
render:
  enabled: false
"#;
        let conf: CrawlerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(conf.concurrency, 4);
        assert_eq!(conf.throttle, Some(Throttle::PerSecond(2)));
        assert_eq!(conf.retry.max_attempts, 5);
        assert_eq!(conf.retry.base_delay_ms, 1_000);
        assert_eq!(conf.sufficiency.min_anchors, 3);
        assert_eq!(conf.sufficiency.marker, "script#__NEXT_DATA__");
        assert!(!conf.render.enabled);
        assert_eq!(conf.render.wait_for, "h1");
        assert_eq!(conf.max_listing_pages, 10);
        assert!(conf.item_limit.is_none());
    }

    #[test]
    fn marker_and_structured_data_are_separate_keys() {
        let yaml = r#"
sufficiency:
  marker: h1
structuredData: "script#__APP_STATE__"
"#;
        let conf: CrawlerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(conf.sufficiency.marker, "h1");
        assert_eq!(conf.structured_data, "script#__APP_STATE__");

        let conf: CrawlerConfig = serde_yaml::from_str("sufficiency:\n  marker: h1\n").unwrap();
        assert_eq!(conf.structured_data, "script#__NEXT_DATA__");
    }

    #[test]
    fn default_is_single_polite_worker() {
        let conf = CrawlerConfig::default();
        assert_eq!(conf.concurrency, 1);
        assert_eq!(conf.throttle, Some(Throttle::Delay(0.8)));
        assert!(conf.proxy.is_none());
    }
}
