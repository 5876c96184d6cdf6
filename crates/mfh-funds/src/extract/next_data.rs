use chrono::NaiveDate;
use serde_json::Value;

use super::{Extractor, Page};
use crate::numeric::{age_from_inception, json_number};
use crate::record::{Field, Partial};

const RISK: &[(Field, &[&str])] = &[
    (Field::Alpha, &["alpha"]),
    (Field::Sharpe, &["sharpe", "sharpeRatio"]),
    (Field::Beta, &["beta"]),
    (Field::Sd, &["standardDeviation", "sd"]),
];

const ALLOCATION: &[(Field, &[&str])] = &[
    (Field::LargeCapPct, &["largeCap"]),
    (Field::MidCapPct, &["midCap"]),
    (Field::SmallCapPct, &["smallCap"]),
    (Field::OtherCapPct, &["otherCap", "other"]),
];

const RETURNS: &[(Field, &[&str])] = &[
    (Field::Return1m, &["1M", "oneMonth"]),
    (Field::Return3m, &["3M", "threeMonth"]),
    (Field::Return6m, &["6M", "sixMonth"]),
    (Field::Return1y, &["1Y", "oneYear"]),
    (Field::Return3y, &["3Y", "threeYear"]),
    (Field::Return5y, &["5Y", "fiveYear"]),
    (Field::ReturnSinceInception, &["sinceInception", "SI"]),
];

/// Reads the page-props JSON blob embedded by the site's framework.
///
/// Values are looked up in `fundDetails`, then `fundInfo`, then the page
/// props themselves.
pub struct NextData {
    as_of: NaiveDate,
}

impl NextData {
    pub fn new(as_of: NaiveDate) -> Self {
        Self { as_of }
    }

    fn read(&self, root: &Value) -> Partial {
        let mut partial = Partial::default();
        let Some(props) = root.pointer("/props/pageProps").filter(|v| v.is_object()) else {
            return partial;
        };
        let sources: Vec<&Value> = ["fundDetails", "fundInfo"]
            .iter()
            .filter_map(|k| props.get(*k))
            .chain(std::iter::once(props))
            .collect();

        partial.name = lookup(&sources, &["fundName", "schemeName"])
            .and_then(Value::as_str)
            .map(str::to_string);

        let age = lookup(&sources, &["fundAge"]).and_then(json_number).or_else(|| {
            lookup(&sources, &["inceptionDate"])
                .and_then(Value::as_str)
                .and_then(|d| age_from_inception(d, self.as_of))
        });
        partial.insert(Field::FundAgeYears, age);
        partial.insert(Field::AumCr, lookup(&sources, &["aum"]).and_then(json_number));
        partial.insert(
            Field::ExpenseRatio,
            lookup(&sources, &["expenseRatio"]).and_then(json_number),
        );

        for (group, fields) in [
            ("riskMetrics", RISK),
            ("allocation", ALLOCATION),
            ("returns", RETURNS),
        ] {
            let Some(section) = lookup(&sources, &[group]) else {
                continue;
            };
            for (field, keys) in fields {
                partial.insert(*field, lookup(&[section], keys).and_then(json_number));
            }
        }
        partial
    }
}

/// First non-empty value under any of `keys`, scanning sources in order.
fn lookup<'a>(sources: &[&'a Value], keys: &[&str]) -> Option<&'a Value> {
    sources
        .iter()
        .flat_map(|&src| keys.iter().filter_map(move |k| src.get(*k)))
        .find(|v| !is_empty(v))
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

impl Extractor for NextData {
    fn name(&self) -> &'static str {
        "next-data"
    }

    fn extract(&self, page: &Page) -> Partial {
        let Some(raw) = page.structured_data else {
            return Partial::default();
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(root) => self.read(&root),
            Err(e) => {
                log::warn!("Unreadable page data in {}: {e}", page.url);
                Partial::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor() -> NextData {
        NextData::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    #[test]
    fn reads_all_sections() {
        let root = json!({"props": {"pageProps": {
            "fundName": "Alpha Flexi Cap Fund",
            "fundDetails": {
                "aum": "12,345.6",
                "expenseRatio": 0.62,
                "inceptionDate": "2014-01-01T00:00:00Z",
                "riskMetrics": {"alpha": "2.1", "sharpe": 1.2, "beta": "0.9", "standardDeviation": "13.4%"},
                "allocation": {"largeCap": 60, "midCap": "20%", "smallCap": 15, "other": 5},
                "returns": {"1M": "-1.2", "oneYear": "18.5%", "3Y": 15, "SI": "14.1"}
            }
        }}});

        let partial = extractor().read(&root);
        let m = &partial.metrics;
        assert_eq!(partial.name.as_deref(), Some("Alpha Flexi Cap Fund"));
        assert_eq!(m[&Field::FundAgeYears], 10.0);
        assert_eq!(m[&Field::AumCr], 12345.6);
        assert_eq!(m[&Field::ExpenseRatio], 0.62);
        assert_eq!(m[&Field::Sd], 13.4);
        assert_eq!(m[&Field::OtherCapPct], 5.0);
        assert_eq!(m[&Field::Return1m], -1.2);
        assert_eq!(m[&Field::Return1y], 18.5);
        assert_eq!(m[&Field::ReturnSinceInception], 14.1);
        assert!(!m.contains_key(&Field::Return5y));
    }

    #[test]
    fn fund_info_fills_gaps_of_fund_details() {
        let root = json!({"props": {"pageProps": {
            "fundDetails": {"aum": "", "expenseRatio": null},
            "fundInfo": {"aum": "500", "expenseRatio": "1.1", "fundAge": "7.5"}
        }}});
        let partial = extractor().read(&root);
        assert_eq!(partial.name, None);
        assert_eq!(partial.metrics[&Field::AumCr], 500.0);
        assert_eq!(partial.metrics[&Field::ExpenseRatio], 1.1);
        assert_eq!(partial.metrics[&Field::FundAgeYears], 7.5);
    }

    #[test]
    fn unexpected_shapes_yield_nothing() {
        assert_eq!(extractor().read(&json!({"props": []})), Partial::default());
        assert_eq!(extractor().read(&json!("text")), Partial::default());
    }
}
