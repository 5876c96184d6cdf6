use std::collections::HashSet;

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

use crate::error::FailureReason;
use crate::fetch::{Fetcher, TerminalFailure};
use crate::scrapable::{CrawlTask, CrawlingContext, Scrapable};

static LINKS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static NEXT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[rel~="next"][href], link[rel~="next"][href]"#).unwrap());

/// Every `a[href]` of the page resolved against `base`, first occurrence order.
pub fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    doc.select(&LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|mut url| {
            url.set_fragment(None);
            url
        })
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Target of the page's `rel="next"` link, if any.
pub fn next_page(html: &str, base: &Url) -> Option<Url> {
    let doc = Html::parse_document(html);
    let href = doc.select(&NEXT).next()?.value().attr("href")?;
    base.join(href.trim()).ok()
}

/// Outcome of walking one category's listing pages.
#[derive(Debug, Default)]
pub struct Listing {
    /// Accepted detail URLs, de-duplicated, in discovery order.
    pub urls: Vec<String>,
    /// Follow-up pages (2 and later) that failed and ended pagination early.
    pub failed_pages: Vec<(String, TerminalFailure)>,
}

/// Fetches a category listing (following pagination) and returns the
/// detail URLs the scraper accepts. Only a failure of the first page, or
/// a listing without any detail link, fails the whole category.
pub async fn discover<T>(
    fetcher: &Fetcher,
    scraper: &T,
    category: &str,
    max_pages: usize,
) -> Result<Listing, TerminalFailure>
where
    T: Scrapable,
{
    let base = Url::parse(category).map_err(|e| TerminalFailure {
        reason: FailureReason::Permanent,
        detail: format!("Malformed category URL {category}: {e}"),
    })?;

    let mut listing = Listing::default();
    let mut seen = HashSet::new();
    let mut visited = HashSet::new();
    let mut page_url = Some(base.clone());
    let mut listing_page = 0;

    while let Some(current) = page_url.take() {
        if listing_page >= max_pages.max(1) || !visited.insert(current.clone()) {
            break;
        }
        listing_page += 1;

        let ctx = CrawlingContext {
            category: base.clone(),
            listing_page,
        };
        let accepted = |html: &str| -> Vec<Url> {
            extract_links(html, &current)
                .into_iter()
                .filter(|url| scraper.accept(url, &ctx))
                .collect()
        };

        let mut task = CrawlTask::new(current.as_str());
        let doc = match fetcher
            .fetch(&mut task, |html| !accepted(html).is_empty())
            .await
        {
            Ok(doc) => doc,
            Err(failure) if listing_page == 1 => return Err(failure),
            Err(failure) => {
                log::warn!(
                    "Stopping pagination of {category} at page {listing_page}: {} ({})",
                    failure.reason,
                    failure.detail
                );
                listing.failed_pages.push((current.to_string(), failure));
                break;
            }
        };

        let links = accepted(&doc.html);
        log::info!(
            "Found {} detail links on {} ({} strategy)",
            links.len(),
            current,
            doc.strategy
        );
        for url in links {
            if seen.insert(url.clone()) {
                listing.urls.push(url.into());
            }
        }

        page_url = next_page(&doc.html, &current);
    }

    if listing.urls.is_empty() {
        return Err(TerminalFailure {
            reason: FailureReason::EmptyListing,
            detail: format!("No detail links found on {category}"),
        });
    }

    Ok(listing)
}
