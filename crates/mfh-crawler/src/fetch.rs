use std::sync::Arc;

use scraper::{Html, Selector};

use crate::config::{CrawlerConfig, Sufficiency};
use crate::error::FailureReason;
use crate::render::PageRenderer;
use crate::retry::RetryPolicy;
use crate::scrapable::{CrawlTask, RawDocument, Strategy};
use crate::transport::Transport;

/// Compiled form of [`Sufficiency`].
#[derive(Debug, Clone)]
pub struct SufficiencyPredicate {
    marker: Selector,
    min_marker_bytes: usize,
    anchors: Vec<String>,
    min_anchors: usize,
}

impl SufficiencyPredicate {
    pub fn new(conf: &Sufficiency) -> anyhow::Result<Self> {
        let marker = Selector::parse(&conf.marker)
            .map_err(|e| anyhow::anyhow!("Invalid marker selector {:?}: {e:?}", conf.marker))?;
        Ok(Self {
            marker,
            min_marker_bytes: conf.min_marker_bytes,
            anchors: conf.anchors.iter().map(|a| a.to_lowercase()).collect(),
            min_anchors: conf.min_anchors,
        })
    }

    fn marker_text(&self, html: &str) -> Option<String> {
        first_text(&self.marker, html)
    }

    pub fn anchor_hits(&self, html: &str) -> usize {
        let lower = html.to_lowercase();
        self.anchors
            .iter()
            .filter(|anchor| lower.contains(anchor.as_str()))
            .count()
    }

    pub fn is_sufficient(&self, html: &str) -> bool {
        let marker_ok = self
            .marker_text(html)
            .map_or(false, |data| data.len() >= self.min_marker_bytes);
        marker_ok || (self.min_anchors > 0 && self.anchor_hits(html) >= self.min_anchors)
    }
}

/// Locates the JSON blob a page embeds for its own hydration.
#[derive(Debug, Clone)]
pub struct StructuredData {
    selector: Selector,
}

impl StructuredData {
    pub fn new(selector: &str) -> anyhow::Result<Self> {
        let selector = Selector::parse(selector).map_err(|e| {
            anyhow::anyhow!("Invalid structured data selector {selector:?}: {e:?}")
        })?;
        Ok(Self { selector })
    }

    pub fn read(&self, html: &str) -> Option<String> {
        first_text(&self.selector, html)
    }
}

/// Trimmed text of the first element matching `selector`, if not blank.
fn first_text(selector: &Selector, html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let text = doc
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>())?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Terminal outcome of a fetch that produced no document.
#[derive(Debug, Clone)]
pub struct TerminalFailure {
    pub reason: FailureReason,
    pub detail: String,
}

/// Static-first fetching with escalation to the renderer.
pub struct Fetcher {
    transport: Transport,
    renderer: Option<Arc<dyn PageRenderer>>,
    retry: RetryPolicy,
    predicate: SufficiencyPredicate,
    structured_data: StructuredData,
}

impl Fetcher {
    pub fn new(
        config: &CrawlerConfig,
        transport: Transport,
        renderer: Option<Arc<dyn PageRenderer>>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            transport,
            renderer,
            retry: (&config.retry).into(),
            predicate: SufficiencyPredicate::new(&config.sufficiency)?,
            structured_data: StructuredData::new(&config.structured_data)?,
        })
    }

    pub fn predicate(&self) -> &SufficiencyPredicate {
        &self.predicate
    }

    /// Fetches `task.url`, rendering only when `is_sufficient` rejects the
    /// static markup.
    pub async fn fetch<P>(
        &self,
        task: &mut CrawlTask,
        is_sufficient: P,
    ) -> Result<RawDocument, TerminalFailure>
    where
        P: Fn(&str) -> bool,
    {
        task.strategy = Strategy::Static;
        let url = task.url.clone();
        let fetched = self
            .retry
            .run(&url, |_| self.transport.get(&url))
            .await;
        task.attempts += fetched.attempts();
        let reason = fetched.failure_reason();
        let html = match fetched.result {
            Ok(html) => html,
            Err(e) => {
                return Err(TerminalFailure {
                    reason: reason.unwrap_or(FailureReason::Permanent),
                    detail: e.to_string(),
                })
            }
        };

        if is_sufficient(&html) {
            return Ok(self.document(task, html));
        }

        let renderer = match &self.renderer {
            Some(renderer) => renderer,
            None => {
                log::warn!("Static content insufficient and rendering disabled, keeping it: {url}");
                return Ok(self.document(task, html));
            }
        };

        log::warn!("Content appears script-rendered, escalating to browser: {url}");
        task.partial = Some(html);
        task.strategy = Strategy::Rendered;

        let rendered = self
            .retry
            .run(&url, |_| {
                let url = url.as_str();
                async move {
                    let _permit = self.transport.limiter().acquire().await;
                    renderer.render(url).await
                }
            })
            .await;
        task.attempts += rendered.attempts();
        let reason = rendered.failure_reason();
        match rendered.result {
            Ok(html) => {
                task.partial = None;
                Ok(self.document(task, html))
            }
            Err(e) => Err(TerminalFailure {
                reason: reason.unwrap_or(FailureReason::Permanent),
                detail: e.to_string(),
            }),
        }
    }

    fn document(&self, task: &CrawlTask, html: String) -> RawDocument {
        RawDocument {
            url: task.url.clone(),
            structured_data: self.structured_data.read(&html),
            html,
            strategy: task.strategy,
        }
    }
}
