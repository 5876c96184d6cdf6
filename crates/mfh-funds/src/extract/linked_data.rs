use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::Selector;
use serde_json::Value;

use super::{Extractor, Page};
use crate::numeric::{age_from_inception, json_number};
use crate::record::{Field, Partial};

static LD_JSON: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

const FUND_TYPES: &[&str] = &[
    "FinancialProduct",
    "InvestmentFund",
    "InvestmentOrDeposit",
    "MutualFund",
    "Product",
];

/// Reads schema.org annotations: the product name, its fees and any
/// labelled `additionalProperty` values.
pub struct LinkedData {
    as_of: NaiveDate,
}

impl LinkedData {
    pub fn new(as_of: NaiveDate) -> Self {
        Self { as_of }
    }

    fn read(&self, item: &Value, partial: &mut Partial) {
        if !is_fund(item) {
            return;
        }
        if partial.name.is_none() {
            partial.name = item
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        partial.insert(
            Field::ExpenseRatio,
            item.get("feesAndCommissionsSpecification")
                .and_then(json_number),
        );

        let props = item
            .get("additionalProperty")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for prop in props {
            let Some(label) = prop.get("name").and_then(Value::as_str) else {
                continue;
            };
            let Some(value) = prop.get("value") else {
                continue;
            };
            if let Some(field) = Field::from_label(label) {
                partial.insert(field, json_number(value));
            } else if is_start_date(label) {
                let age = value
                    .as_str()
                    .and_then(|d| age_from_inception(d, self.as_of));
                partial.insert(Field::FundAgeYears, age);
            }
        }
    }
}

fn is_fund(item: &Value) -> bool {
    match item.get("@type") {
        Some(Value::String(t)) => FUND_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| FUND_TYPES.contains(&t)),
        _ => false,
    }
}

/// "Inception Date", "Launch date" and the like; "Since Inception" is a return.
fn is_start_date(label: &str) -> bool {
    let label = label.to_ascii_lowercase();
    ["inception date", "launch date", "date of inception", "launched on"]
        .iter()
        .any(|l| label.contains(l))
}

/// Top-level items of a block, unwrapping arrays and `@graph` containers.
fn items(root: Value) -> Vec<Value> {
    match root {
        Value::Array(list) => list.into_iter().flat_map(items).collect(),
        Value::Object(mut obj) => match obj.remove("@graph") {
            Some(graph) => {
                let mut out = items(graph);
                out.push(Value::Object(obj));
                out
            }
            None => vec![Value::Object(obj)],
        },
        _ => Vec::new(),
    }
}

impl Extractor for LinkedData {
    fn name(&self) -> &'static str {
        "ld+json"
    }

    fn extract(&self, page: &Page) -> Partial {
        let mut partial = Partial::default();
        for block in page.dom.select(&LD_JSON) {
            let raw = block.text().collect::<String>();
            let root = match serde_json::from_str::<Value>(&raw) {
                Ok(root) => root,
                Err(e) => {
                    log::debug!("Skipping unreadable ld+json block in {}: {e}", page.url);
                    continue;
                }
            };
            for item in items(root) {
                self.read(&item, &mut partial);
            }
        }
        partial
    }
}
