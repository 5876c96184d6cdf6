use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::{stream, StreamExt};

use crate::config::CrawlerConfig;
use crate::discover::discover;
use crate::error::FailureReason;
use crate::fetch::{Fetcher, TerminalFailure};
use crate::render::{ChromiumRenderer, PageRenderer};
use crate::scrapable::{CrawlTask, Scrapable, ScrapError, Seed};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    Item,
    Category,
}

impl fmt::Display for FailureScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item => f.write_str("item"),
            Self::Category => f.write_str("category"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Failure {
    pub url: String,
    pub scope: FailureScope,
    pub reason: FailureReason,
    pub detail: String,
}

impl Failure {
    fn new(url: &str, scope: FailureScope, failure: TerminalFailure) -> Self {
        Self {
            url: url.to_string(),
            scope,
            reason: failure.reason,
            detail: failure.detail,
        }
    }
}

/// Records in dispatch order plus every terminal failure of the run.
#[derive(Debug)]
pub struct HarvestReport<R> {
    pub records: Vec<R>,
    pub failures: Vec<Failure>,
}

impl<R> Default for HarvestReport<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<R> HarvestReport<R> {
    pub fn failed_items(&self) -> impl Iterator<Item = &Failure> {
        self.failures
            .iter()
            .filter(|f| f.scope == FailureScope::Item)
    }

    pub fn failed_categories(&self) -> impl Iterator<Item = &Failure> {
        self.failures
            .iter()
            .filter(|f| f.scope == FailureScope::Category)
    }
}

/// Mutable state of one run, threaded through every dispatch.
#[derive(Debug, Default)]
pub struct HarvestContext {
    dispatched: HashSet<String>,
    remaining: Option<usize>,
}

impl HarvestContext {
    pub fn new(item_limit: Option<usize>) -> Self {
        Self {
            dispatched: HashSet::new(),
            remaining: item_limit,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Claims the URLs not yet dispatched in this run, up to the item limit.
    pub fn claim(&mut self, urls: Vec<String>) -> Vec<String> {
        let mut batch = Vec::new();
        for url in urls {
            if self.exhausted() {
                break;
            }
            if self.dispatched.insert(url.clone()) {
                batch.push(url);
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
            }
        }
        batch
    }
}

pub struct Harvester<'a, T: Scrapable> {
    config: &'a CrawlerConfig,
    fetcher: Fetcher,
    scraper: &'a T,
}

impl<'a, T> Harvester<'a, T>
where
    T: Scrapable,
{
    pub fn new(config: &'a CrawlerConfig, fetcher: Fetcher, scraper: &'a T) -> Self {
        Self {
            config,
            fetcher,
            scraper,
        }
    }

    pub async fn run(&self) -> HarvestReport<T::Record> {
        let mut ctx = HarvestContext::new(self.config.item_limit);
        let mut report = HarvestReport::default();

        match self.scraper.seed() {
            Seed::Categories(categories) => {
                for category in categories {
                    if ctx.exhausted() {
                        log::info!("Item limit reached, skipping remaining categories");
                        break;
                    }
                    log::info!("Fetching category page: {category}");
                    match discover(
                        &self.fetcher,
                        self.scraper,
                        &category,
                        self.config.max_listing_pages,
                    )
                    .await
                    {
                        Ok(listing) => {
                            for (page, failure) in listing.failed_pages {
                                report
                                    .failures
                                    .push(Failure::new(&page, FailureScope::Category, failure));
                            }
                            let batch = ctx.claim(listing.urls);
                            self.dispatch(batch, &mut report).await;
                        }
                        Err(failure) => {
                            log::error!(
                                "Skipping category {category}: {} ({})",
                                failure.reason,
                                failure.detail
                            );
                            report
                                .failures
                                .push(Failure::new(&category, FailureScope::Category, failure));
                        }
                    }
                }
            }
            Seed::Pages(urls) => {
                let batch = ctx.claim(urls);
                self.dispatch(batch, &mut report).await;
            }
        }

        log::info!(
            "Harvest done: {} records, {} failed items, {} failed categories",
            report.records.len(),
            report.failed_items().count(),
            report.failed_categories().count()
        );
        report
    }

    async fn dispatch(&self, batch: Vec<String>, report: &mut HarvestReport<T::Record>) {
        let total = batch.len();
        let results = stream::iter(batch.into_iter().enumerate())
            .map(|(idx, url)| {
                log::info!("Processing item {}/{total}: {url}", idx + 1);
                self.process(url)
            })
            .buffered(self.config.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        for res in results {
            match res {
                Ok(record) => report.records.push(record),
                Err(failure) => {
                    log::error!(
                        "Giving up on {}: {} ({})",
                        failure.url,
                        failure.reason,
                        failure.detail
                    );
                    report.failures.push(failure);
                }
            }
        }
    }

    async fn process(&self, url: String) -> Result<T::Record, Failure> {
        let mut task = CrawlTask::new(url);
        let predicate = self.fetcher.predicate();
        let fetched = self
            .fetcher
            .fetch(&mut task, |html| predicate.is_sufficient(html))
            .await;
        let doc = fetched.map_err(|f| Failure::new(&task.url, FailureScope::Item, f))?;
        log::debug!(
            "Fetched {} via {} after {} attempts",
            task.url,
            task.strategy,
            task.attempts
        );

        self.scraper.scrap(doc).map_err(|e| {
            let reason = match &e {
                ScrapError::MissingIdentity(_) => FailureReason::MissingIdentity,
                ScrapError::Other(_) => FailureReason::ExtractFailed,
            };
            Failure::new(
                &task.url,
                FailureScope::Item,
                TerminalFailure {
                    reason,
                    detail: e.to_string(),
                },
            )
        })
    }
}

/// Harvests with an injected renderer; `None` disables escalation.
pub async fn harvest<T>(
    config: &CrawlerConfig,
    scraper: &T,
    renderer: Option<Arc<dyn PageRenderer>>,
) -> anyhow::Result<HarvestReport<T::Record>>
where
    T: Scrapable,
{
    let transport = Transport::new(config)?;
    let fetcher = Fetcher::new(config, transport, renderer)?;
    Ok(Harvester::new(config, fetcher, scraper).run().await)
}

pub async fn crawl_site<T>(
    crawler_conf: &CrawlerConfig,
    scraper_conf: &T::Config,
) -> anyhow::Result<HarvestReport<T::Record>>
where
    T: Scrapable,
{
    let mut scraper = <T as Scrapable>::new(scraper_conf)?;
    let renderer: Option<Arc<dyn PageRenderer>> = if crawler_conf.render.enabled {
        Some(Arc::new(ChromiumRenderer::new(crawler_conf)))
    } else {
        None
    };

    let report = harvest(crawler_conf, &scraper, renderer).await?;
    scraper.finalizer(&report)?;
    Ok(report)
}
