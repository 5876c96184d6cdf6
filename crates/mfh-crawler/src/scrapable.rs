use std::fmt;

use thiserror::Error;
use url::Url;

use crate::crawler::HarvestReport;

pub trait Scrapable {
    type Config: Clone + Send + 'static;
    type Record;

    fn new(config: &Self::Config) -> anyhow::Result<Self>
    where
        Self: Sized;

    fn seed(&self) -> Seed;

    /// Whether a link found on a listing page is a detail page to harvest.
    fn accept(&self, url: &Url, ctx: &CrawlingContext) -> bool;

    fn scrap(&self, doc: RawDocument) -> Result<Self::Record, ScrapError>;

    fn finalizer(&mut self, _report: &HarvestReport<Self::Record>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Seed {
    /// Listing pages whose detail links are discovered then harvested
    Categories(Vec<String>),
    /// Detail pages harvested directly
    Pages(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct CrawlingContext {
    pub category: Url,
    pub listing_page: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Static,
    Rendered,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => f.write_str("static"),
            Self::Rendered => f.write_str("rendered"),
        }
    }
}

/// A fetched page, consumed by exactly one scrap call.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub url: String,
    pub html: String,
    pub strategy: Strategy,
    /// Text of the embedded structured-data marker, when present
    pub structured_data: Option<String>,
}

/// Unit of in-flight work for one URL.
#[derive(Debug, Clone)]
pub struct CrawlTask {
    pub url: String,
    pub attempts: u32,
    pub strategy: Strategy,
    /// Static markup kept while escalating to rendering
    pub partial: Option<String>,
}

impl CrawlTask {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attempts: 0,
            strategy: Strategy::Static,
            partial: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScrapError {
    #[error("Missing required field `{0}`")]
    MissingIdentity(&'static str),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
