use std::collections::BTreeMap;

use serde::Serialize;

/// Every numeric column of the dataset, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    FundAgeYears,
    AumCr,
    ExpenseRatio,
    Alpha,
    Sharpe,
    Beta,
    Sd,
    LargeCapPct,
    MidCapPct,
    SmallCapPct,
    OtherCapPct,
    Return1m,
    Return3m,
    Return6m,
    Return1y,
    Return3y,
    Return5y,
    ReturnSinceInception,
}

impl Field {
    pub const ALL: [Field; 18] = [
        Field::FundAgeYears,
        Field::AumCr,
        Field::ExpenseRatio,
        Field::Alpha,
        Field::Sharpe,
        Field::Beta,
        Field::Sd,
        Field::LargeCapPct,
        Field::MidCapPct,
        Field::SmallCapPct,
        Field::OtherCapPct,
        Field::Return1m,
        Field::Return3m,
        Field::Return6m,
        Field::Return1y,
        Field::Return3y,
        Field::Return5y,
        Field::ReturnSinceInception,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Self::FundAgeYears => "fund_age_years",
            Self::AumCr => "aum_cr",
            Self::ExpenseRatio => "expense_ratio",
            Self::Alpha => "alpha",
            Self::Sharpe => "sharpe",
            Self::Beta => "beta",
            Self::Sd => "sd",
            Self::LargeCapPct => "large_cap_pct",
            Self::MidCapPct => "mid_cap_pct",
            Self::SmallCapPct => "small_cap_pct",
            Self::OtherCapPct => "other_cap_pct",
            Self::Return1m => "return_1m",
            Self::Return3m => "return_3m",
            Self::Return6m => "return_6m",
            Self::Return1y => "return_1y",
            Self::Return3y => "return_3y",
            Self::Return5y => "return_5y",
            Self::ReturnSinceInception => "return_since_inception",
        }
    }

    /// Maps a human label ("Sharpe Ratio", "3Y", "Fund size") to its column.
    pub fn from_label(label: &str) -> Option<Self> {
        let key: String = label
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        let key = key
            .strip_suffix("returns")
            .or_else(|| key.strip_suffix("return"))
            .unwrap_or(&key);

        let field = match key {
            "age" | "fundage" | "fundageyears" => Self::FundAgeYears,
            "aum" | "aumfundsize" | "fundsize" | "assetsundermanagement" => Self::AumCr,
            "expenseratio" | "totalexpenseratio" | "ter" => Self::ExpenseRatio,
            "alpha" => Self::Alpha,
            "sharpe" | "sharperatio" => Self::Sharpe,
            "beta" => Self::Beta,
            "sd" | "standarddeviation" | "stddev" => Self::Sd,
            "largecap" => Self::LargeCapPct,
            "midcap" => Self::MidCapPct,
            "smallcap" => Self::SmallCapPct,
            "othercap" | "other" | "others" => Self::OtherCapPct,
            "1m" | "1month" | "onemonth" | "return1m" => Self::Return1m,
            "3m" | "3months" | "threemonth" | "return3m" => Self::Return3m,
            "6m" | "6months" | "sixmonth" | "return6m" => Self::Return6m,
            "1y" | "1year" | "oneyear" | "return1y" => Self::Return1y,
            "3y" | "3years" | "threeyear" | "return3y" => Self::Return3y,
            "5y" | "5years" | "fiveyear" | "return5y" => Self::Return5y,
            "si" | "sinceinception" | "returnsinceinception" | "returnssinceinception" => {
                Self::ReturnSinceInception
            }
            _ => return None,
        };
        Some(field)
    }
}

/// One row of the output dataset. `None` means "not extractable".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundRecord {
    #[serde(rename = "fund_name")]
    pub name: String,
    #[serde(rename = "fund_url")]
    pub url: String,
    pub fund_age_years: Option<f64>,
    pub aum_cr: Option<f64>,
    pub expense_ratio: Option<f64>,
    pub alpha: Option<f64>,
    pub sharpe: Option<f64>,
    pub beta: Option<f64>,
    pub sd: Option<f64>,
    pub large_cap_pct: Option<f64>,
    pub mid_cap_pct: Option<f64>,
    pub small_cap_pct: Option<f64>,
    pub other_cap_pct: Option<f64>,
    pub return_1m: Option<f64>,
    pub return_3m: Option<f64>,
    pub return_6m: Option<f64>,
    pub return_1y: Option<f64>,
    pub return_3y: Option<f64>,
    pub return_5y: Option<f64>,
    pub return_since_inception: Option<f64>,
}

impl FundRecord {
    pub const COLUMNS: [&'static str; 20] = [
        "fund_name",
        "fund_url",
        "fund_age_years",
        "aum_cr",
        "expense_ratio",
        "alpha",
        "sharpe",
        "beta",
        "sd",
        "large_cap_pct",
        "mid_cap_pct",
        "small_cap_pct",
        "other_cap_pct",
        "return_1m",
        "return_3m",
        "return_6m",
        "return_1y",
        "return_3y",
        "return_5y",
        "return_since_inception",
    ];

    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            fund_age_years: None,
            aum_cr: None,
            expense_ratio: None,
            alpha: None,
            sharpe: None,
            beta: None,
            sd: None,
            large_cap_pct: None,
            mid_cap_pct: None,
            small_cap_pct: None,
            other_cap_pct: None,
            return_1m: None,
            return_3m: None,
            return_6m: None,
            return_1y: None,
            return_3y: None,
            return_5y: None,
            return_since_inception: None,
        }
    }

    fn slot(&mut self, field: Field) -> &mut Option<f64> {
        match field {
            Field::FundAgeYears => &mut self.fund_age_years,
            Field::AumCr => &mut self.aum_cr,
            Field::ExpenseRatio => &mut self.expense_ratio,
            Field::Alpha => &mut self.alpha,
            Field::Sharpe => &mut self.sharpe,
            Field::Beta => &mut self.beta,
            Field::Sd => &mut self.sd,
            Field::LargeCapPct => &mut self.large_cap_pct,
            Field::MidCapPct => &mut self.mid_cap_pct,
            Field::SmallCapPct => &mut self.small_cap_pct,
            Field::OtherCapPct => &mut self.other_cap_pct,
            Field::Return1m => &mut self.return_1m,
            Field::Return3m => &mut self.return_3m,
            Field::Return6m => &mut self.return_6m,
            Field::Return1y => &mut self.return_1y,
            Field::Return3y => &mut self.return_3y,
            Field::Return5y => &mut self.return_5y,
            Field::ReturnSinceInception => &mut self.return_since_inception,
        }
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::FundAgeYears => self.fund_age_years,
            Field::AumCr => self.aum_cr,
            Field::ExpenseRatio => self.expense_ratio,
            Field::Alpha => self.alpha,
            Field::Sharpe => self.sharpe,
            Field::Beta => self.beta,
            Field::Sd => self.sd,
            Field::LargeCapPct => self.large_cap_pct,
            Field::MidCapPct => self.mid_cap_pct,
            Field::SmallCapPct => self.small_cap_pct,
            Field::OtherCapPct => self.other_cap_pct,
            Field::Return1m => self.return_1m,
            Field::Return3m => self.return_3m,
            Field::Return6m => self.return_6m,
            Field::Return1y => self.return_1y,
            Field::Return3y => self.return_3y,
            Field::Return5y => self.return_5y,
            Field::ReturnSinceInception => self.return_since_inception,
        }
    }

    pub fn set(&mut self, field: Field, value: Option<f64>) {
        *self.slot(field) = value;
    }

    pub fn missing_fields(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }
}

/// Fields one extraction source resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partial {
    pub name: Option<String>,
    pub metrics: BTreeMap<Field, f64>,
}

impl Partial {
    pub fn insert(&mut self, field: Field, value: Option<f64>) {
        if let Some(v) = value {
            self.metrics.entry(field).or_insert(v);
        }
    }

    /// First write wins: values already present are never replaced.
    pub fn merge(&mut self, other: Partial) {
        if self.name.is_none() {
            self.name = other.name;
        }
        for (field, value) in other.metrics {
            self.metrics.entry(field).or_insert(value);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.metrics.len() == Field::ALL.len()
    }
}
