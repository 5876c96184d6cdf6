mod linked_data;
mod next_data;
mod pattern;

use chrono::NaiveDate;
use mfh_crawler::{RawDocument, ScrapError};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use thiserror::Error;

use crate::record::{FundRecord, Partial};

pub use linked_data::LinkedData;
pub use next_data::NextData;
pub use pattern::Pattern;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("No fund name found in {0}")]
    MissingName(String),
}

impl From<ExtractError> for ScrapError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::MissingName(_) => ScrapError::MissingIdentity("fund_name"),
        }
    }
}

/// Parsed view of a document shared by every extractor.
pub struct Page<'a> {
    pub url: &'a str,
    pub dom: Html,
    pub structured_data: Option<&'a str>,
    text: String,
}

impl<'a> Page<'a> {
    pub fn new(doc: &'a RawDocument) -> Self {
        let dom = Html::parse_document(&doc.html);
        let text = visible_text(&dom);
        Self {
            url: &doc.url,
            dom,
            structured_data: doc.structured_data.as_deref(),
            text,
        }
    }

    /// Text nodes outside of scripts and styles, space separated.
    pub fn text(&self) -> &str {
        &self.text
    }
}

fn visible_text(dom: &Html) -> String {
    let mut out = String::new();
    for node in dom.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|el| el.name()))
            .map_or(false, |name| {
                matches!(name, "script" | "style" | "noscript" | "template")
            });
        let text = text.trim();
        if hidden || text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(text);
    }
    out
}

/// One source of field values. Sources never fail: what they cannot read
/// is simply absent from the returned partial.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, page: &Page) -> Partial;
}

static TITLE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*[:|\-]\s*Latest\s+NAV.*$").unwrap());

pub fn clean_name(raw: &str) -> Option<String> {
    let name = TITLE_SUFFIX.replace(raw.trim(), "");
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Runs extractors in precedence order, lower ones only filling gaps.
pub struct ExtractionEngine {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractionEngine {
    pub fn new(as_of: NaiveDate) -> Self {
        Self::with_extractors(vec![
            Box::new(NextData::new(as_of)),
            Box::new(LinkedData::new(as_of)),
            Box::new(Pattern::new(as_of)),
        ])
    }

    pub fn with_extractors(extractors: Vec<Box<dyn Extractor>>) -> Self {
        Self { extractors }
    }

    pub fn extract(&self, doc: &RawDocument) -> Result<FundRecord, ExtractError> {
        let page = Page::new(doc);
        let mut merged = Partial::default();

        for extractor in &self.extractors {
            if merged.is_complete() {
                break;
            }
            let partial = extractor.extract(&page);
            log::debug!(
                "{}: {} fields from {}",
                doc.url,
                partial.metrics.len(),
                extractor.name()
            );
            merged.merge(partial);
        }

        let name = merged
            .name
            .as_deref()
            .and_then(clean_name)
            .ok_or_else(|| ExtractError::MissingName(doc.url.clone()))?;

        let mut record = FundRecord::new(name, doc.url.clone());
        for (field, value) in merged.metrics {
            record.set(field, Some(value));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfh_crawler::Strategy;

    use crate::record::Field;

    fn doc(html: &str, structured: Option<&str>) -> RawDocument {
        RawDocument {
            url: "https://funds.test/mutual-funds/alpha-fund/11".into(),
            html: html.into(),
            strategy: Strategy::Static,
            structured_data: structured.map(String::from),
        }
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn primary_source_wins_over_patterns() {
        let next = r#"{"props":{"pageProps":{"fundName":"Alpha Fund","fundDetails":{"expenseRatio":"0.5"}}}}"#;
        let html = r#"<html><body><h1>Other Name</h1>
            <p>Expense Ratio: 0.9%</p><p>Beta: 0.95</p></body></html>"#;

        let record = ExtractionEngine::new(as_of())
            .extract(&doc(html, Some(next)))
            .unwrap();

        assert_eq!(record.name, "Alpha Fund");
        assert_eq!(record.expense_ratio, Some(0.5));
        assert_eq!(record.beta, Some(0.95));
    }

    #[test]
    fn sources_rank_primary_then_linked_data_then_patterns() {
        let next = r#"{"props":{"pageProps":{"fundName":"Primary","fundDetails":{"expenseRatio":"0.5"}}}}"#;
        let html = r#"<html><head>
            <script type="application/ld+json">{"@type": "InvestmentFund", "name": "Secondary",
                "feesAndCommissionsSpecification": "0.9%",
                "additionalProperty": [{"name": "Beta", "value": "0.7"}]}</script>
            </head><body><h1>Tertiary</h1>
            <p>Expense Ratio: 0.8%</p><p>Beta: 0.95</p><p>Sharpe: 1.4</p></body></html>"#;
        let page = doc(html, Some(next));
        let engine = ExtractionEngine::new(as_of());

        let first = engine.extract(&page).unwrap();
        assert_eq!(first.name, "Primary");
        assert_eq!(first.expense_ratio, Some(0.5));
        assert_eq!(first.beta, Some(0.7));
        assert_eq!(first.sharpe, Some(1.4));

        let again = engine.extract(&page).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn linked_data_wins_over_patterns() {
        let html = r#"<html><head>
            <script type="application/ld+json">{"@type": "MutualFund", "name": "Linked Fund",
                "additionalProperty": [{"name": "Alpha", "value": 2.5}]}</script>
            </head><body><h1>Heading Fund</h1><p>Alpha: 3.1</p></body></html>"#;
        let record = ExtractionEngine::new(as_of())
            .extract(&doc(html, None))
            .unwrap();
        assert_eq!(record.name, "Linked Fund");
        assert_eq!(record.alpha, Some(2.5));
    }

    #[test]
    fn missing_name_is_an_error() {
        let html = "<html><body><p>AUM: 100 Cr</p></body></html>";
        let err = ExtractionEngine::new(as_of())
            .extract(&doc(html, None))
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingName(_)));
        assert!(matches!(
            ScrapError::from(err),
            ScrapError::MissingIdentity("fund_name")
        ));
    }

    #[test]
    fn unparseable_fields_stay_absent() {
        let html = "<html><head><title>Beta Fund</title></head>\
                    <body><p>Alpha: --</p><p>Sharpe: 1.1</p></body></html>";
        let record = ExtractionEngine::new(as_of())
            .extract(&doc(html, None))
            .unwrap();
        assert_eq!(record.alpha, None);
        assert_eq!(record.sharpe, Some(1.1));
        assert_eq!(record.missing_fields().len(), 17);
        assert!(!record.missing_fields().contains(&Field::Sharpe));
    }

    #[test]
    fn title_suffix_is_removed() {
        assert_eq!(
            clean_name("Alpha Flexi Cap Fund: Latest NAV, Holdings, Performance").as_deref(),
            Some("Alpha Flexi Cap Fund")
        );
        assert_eq!(clean_name("  "), None);
    }

    #[test]
    fn visible_text_skips_scripts() {
        let page_doc = doc(
            "<html><body><script>var a = 'AUM: 9';</script><p>Beta</p><p>1.0</p></body></html>",
            None,
        );
        let page = Page::new(&page_doc);
        assert_eq!(page.text(), "Beta 1.0");
    }
}
