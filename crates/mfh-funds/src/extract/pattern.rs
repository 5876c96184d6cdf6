use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};

use super::{Extractor, Page};
use crate::numeric::{age_from_inception, parse_number};
use crate::record::{Field, Partial};

static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"][content]"#).unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

static PATTERNS: Lazy<Vec<(Field, Vec<Regex>)>> = Lazy::new(|| {
    let table: &[(Field, &[&str])] = &[
        (
            Field::AumCr,
            &[
                r"AUM\s*(?:\(Fund size\))?\s*(?::|-\s)?\s*₹?\s*([\d,\.]+)\s*Cr",
                r"Fund\s*Size\s*(?::|-\s)?\s*₹?\s*([\d,\.]+)\s*Cr",
                r"Assets\s*Under\s*Management\s*(?::|-\s)?\s*₹?\s*([\d,\.]+)\s*Cr",
            ],
        ),
        (
            Field::ExpenseRatio,
            &[
                r"Expense\s*Ratio\s*(?::|-\s)?\s*([\d,\.]+)%?",
                r"Total\s*Expense\s*Ratio\s*(?::|-\s)?\s*([\d,\.]+)%?",
            ],
        ),
        (Field::Alpha, &[r"Alpha\s*(?::|-\s)?\s*([\-\d,\.]+)"]),
        (Field::Sharpe, &[r"Sharpe\s*(?:Ratio)?\s*(?::|-\s)?\s*([\-\d,\.]+)"]),
        (Field::Beta, &[r"Beta\s*(?::|-\s)?\s*([\-\d,\.]+)"]),
        (
            Field::Sd,
            &[r"(?:Standard\s*Deviation|\bSD|Std\.?\s*Dev\.?)\s*(?::|-\s)?\s*([\-\d,\.]+)"],
        ),
        (Field::LargeCapPct, &[r"Large\s*Cap\s*(?::|-\s)?\s*([\d,\.]+)%?"]),
        (Field::MidCapPct, &[r"Mid\s*Cap\s*(?::|-\s)?\s*([\d,\.]+)%?"]),
        (Field::SmallCapPct, &[r"Small\s*Cap\s*(?::|-\s)?\s*([\d,\.]+)%?"]),
        (Field::OtherCapPct, &[r"Other\s*Cap\s*(?::|-\s)?\s*([\d,\.]+)%?"]),
        (Field::Return1m, &[r"(?:\b1\s*Month|\b1M)\s*(?::|-\s)?\s*([\-\d,\.]+)%?"]),
        (Field::Return3m, &[r"(?:\b3\s*Months?|\b3M)\s*(?::|-\s)?\s*([\-\d,\.]+)%?"]),
        (Field::Return6m, &[r"(?:\b6\s*Months?|\b6M)\s*(?::|-\s)?\s*([\-\d,\.]+)%?"]),
        (Field::Return1y, &[r"(?:\b1\s*Year|\b1Y)\s*(?::|-\s)?\s*([\-\d,\.]+)%?"]),
        (Field::Return3y, &[r"(?:\b3\s*Years?|\b3Y)\s*(?::|-\s)?\s*([\-\d,\.]+)%?"]),
        (Field::Return5y, &[r"(?:\b5\s*Years?|\b5Y)\s*(?::|-\s)?\s*([\-\d,\.]+)%?"]),
        (
            Field::ReturnSinceInception,
            &[r"(?:Since\s*Inception|\bSI)\s*(?::|-\s)?\s*([\-\d,\.]+)%?"],
        ),
        (
            Field::FundAgeYears,
            &[r"(?:Fund\s*)?Age\s*(?::|-\s)?\s*([\d,\.]+)\s*(?:years?|yrs?)"],
        ),
    ];

    table
        .iter()
        .map(|(field, patterns)| {
            let compiled = patterns
                .iter()
                .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
                .collect();
            (*field, compiled)
        })
        .collect()
});

static INCEPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Inception\s*Date\s*(?::|-\s)?\s*(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})").unwrap()
});

/// Last resort: label/value patterns over the page's visible text, and the
/// document title for the name.
pub struct Pattern {
    as_of: NaiveDate,
}

impl Pattern {
    pub fn new(as_of: NaiveDate) -> Self {
        Self { as_of }
    }
}

fn first_match(regex: &Regex, text: &str) -> Option<f64> {
    regex
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| parse_number(m.as_str()))
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn page_name(page: &Page) -> Option<String> {
    let og = page
        .dom
        .select(&OG_TITLE)
        .filter_map(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty());
    og.or_else(|| {
        [&*H1, &*TITLE].into_iter().find_map(|sel| {
            page.dom
                .select(sel)
                .map(element_text)
                .find(|t| !t.is_empty())
        })
    })
}

impl Extractor for Pattern {
    fn name(&self) -> &'static str {
        "patterns"
    }

    fn extract(&self, page: &Page) -> Partial {
        let text = page.text();
        let mut partial = Partial {
            name: page_name(page),
            ..Default::default()
        };

        for (field, regexes) in PATTERNS.iter() {
            let value = regexes.iter().find_map(|re| first_match(re, text));
            partial.insert(*field, value);
        }

        if !partial.metrics.contains_key(&Field::FundAgeYears) {
            let age = INCEPTION
                .captures(text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| age_from_inception(m.as_str(), self.as_of));
            partial.insert(Field::FundAgeYears, age);
        }
        partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfh_crawler::{RawDocument, Strategy};

    fn extract(html: &str) -> Partial {
        let doc = RawDocument {
            url: "https://funds.test/f/1".into(),
            html: html.into(),
            strategy: Strategy::Rendered,
            structured_data: None,
        };
        Pattern::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).extract(&Page::new(&doc))
    }

    #[test]
    fn reads_labelled_values() {
        let partial = extract(
            r#"<html><body>
            <h1>Epsilon Fund</h1>
            <div><span>AUM (Fund size)</span><span>₹12,345.67 Cr</span></div>
            <div><span>Expense Ratio</span><span>0.58%</span></div>
            <div>Alpha</div><div>-1.25</div>
            <div>Std. Dev.: 12.5</div>
            <div>Mid Cap 22.3%</div>
            <table><tr><td>1Y</td><td>-4.2%</td></tr><tr><td>Since Inception</td><td>16.8%</td></tr></table>
            <p>Inception Date: 01/07/2021</p>
            </body></html>"#,
        );
        let m = &partial.metrics;

        assert_eq!(partial.name.as_deref(), Some("Epsilon Fund"));
        assert_eq!(m[&Field::AumCr], 12345.67);
        assert_eq!(m[&Field::ExpenseRatio], 0.58);
        assert_eq!(m[&Field::Alpha], -1.25);
        assert_eq!(m[&Field::Sd], 12.5);
        assert_eq!(m[&Field::MidCapPct], 22.3);
        assert_eq!(m[&Field::Return1y], -4.2);
        assert_eq!(m[&Field::ReturnSinceInception], 16.8);
        assert_eq!(m[&Field::FundAgeYears], 2.5);
        assert!(!m.contains_key(&Field::Beta));
    }

    #[test]
    fn og_title_beats_headings() {
        let partial = extract(
            r#"<html><head><meta property="og:title" content="Zeta Fund: Latest NAV, Holdings, Performance">
            <title>Ignored</title></head><body><h1>Also ignored</h1></body></html>"#,
        );
        assert_eq!(
            partial.name.as_deref(),
            Some("Zeta Fund: Latest NAV, Holdings, Performance")
        );
    }

    #[test]
    fn age_in_years_is_read_directly() {
        let partial = extract("<html><body><p>Fund Age: 10.5 years</p></body></html>");
        assert_eq!(partial.metrics[&Field::FundAgeYears], 10.5);
        assert_eq!(partial.name, None);
    }
}
