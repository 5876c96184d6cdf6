mod config;
mod crawler;
mod discover;
mod error;
mod fetch;
mod limiter;
mod render;
mod retry;
mod scrapable;
mod transport;

pub use config::{CrawlerConfig, RenderConfig, RetryConfig, Sufficiency, Throttle};
pub use crawler::{
    crawl_site, harvest, Failure, FailureScope, HarvestContext, HarvestReport, Harvester,
};
pub use discover::{discover, extract_links, next_page, Listing};
pub use error::{ErrorClass, FailureReason, FetchError};
pub use fetch::{Fetcher, StructuredData, SufficiencyPredicate, TerminalFailure};
pub use limiter::{Permit, RateLimiter};
pub use render::{ChromiumRenderer, PageRenderer};
pub use retry::{Retried, RetryMachine, RetryPolicy, RetryState};
pub use scrapable::{CrawlTask, CrawlingContext, RawDocument, ScrapError, Scrapable, Seed, Strategy};
pub use transport::Transport;

pub use anyhow;
