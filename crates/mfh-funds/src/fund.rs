use std::path::PathBuf;

use chrono::NaiveDate;
use mfh_crawler::{
    CrawlingContext, HarvestReport, RawDocument, ScrapError, Scrapable, Seed,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::extract::ExtractionEngine;
use crate::record::{Field, FundRecord};
use crate::writer::{self, CsvWriterConfig, FileMode};

pub const DEFAULT_CATEGORY: &str = "https://www.etmoney.com/mutual-funds/equity/flexi-cap/79";

fn default_detail_pattern() -> String {
    r"^/mutual-funds/[^/]+/\d+$".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundScraperConfig {
    /// Listing pages to discover funds from
    #[serde(default)]
    pub categories: Vec<String>,
    /// Fund pages harvested directly, bypassing discovery
    #[serde(default)]
    pub pages: Vec<String>,
    /// Path shape of a fund detail page, matched on the listing's host
    #[serde(default = "default_detail_pattern")]
    pub detail_pattern: String,
    /// Dataset destination, `-` for stdout
    pub csv_file: PathBuf,
    #[serde(default)]
    pub failures_file: Option<PathBuf>,
    #[serde(default)]
    pub file_mode: FileMode,
    #[serde(default)]
    pub csv: CsvWriterConfig,
    /// Reference date for fund ages, today when unset
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

impl FundScraperConfig {
    pub fn new(csv_file: impl Into<PathBuf>) -> Self {
        Self {
            categories: Vec::new(),
            pages: Vec::new(),
            detail_pattern: default_detail_pattern(),
            csv_file: csv_file.into(),
            failures_file: None,
            file_mode: FileMode::default(),
            csv: CsvWriterConfig::default(),
            as_of: None,
        }
    }
}

/// `funds_<slug>.csv` from the category's second-to-last path segment.
pub fn default_output_file(category: &str) -> PathBuf {
    let slug = Url::parse(category).ok().and_then(|url| {
        let segments: Vec<String> = url
            .path_segments()?
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let slug = segments.iter().rev().nth(1)?.replace('-', "");
        (!slug.is_empty()).then_some(slug)
    });
    match slug {
        Some(slug) => PathBuf::from(format!("funds_{slug}.csv")),
        None => PathBuf::from("funds.csv"),
    }
}

pub struct FundScraper {
    config: FundScraperConfig,
    detail: Regex,
    engine: ExtractionEngine,
}

impl FundScraper {
    fn warn_missing(record: &FundRecord) {
        let missing = record.missing_fields();
        if missing.is_empty() {
            return;
        }
        let names: Vec<_> = missing.iter().map(Field::column).collect();
        log::warn!(
            "Missing {} fields for {}: {}",
            missing.len(),
            record.name,
            names.join(", ")
        );
    }
}

impl Scrapable for FundScraper {
    type Config = FundScraperConfig;
    type Record = FundRecord;

    fn new(config: &FundScraperConfig) -> anyhow::Result<Self> {
        let detail = Regex::new(&config.detail_pattern)?;
        let as_of = config
            .as_of
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        Ok(Self {
            config: config.clone(),
            detail,
            engine: ExtractionEngine::new(as_of),
        })
    }

    fn seed(&self) -> Seed {
        if !self.config.pages.is_empty() {
            Seed::Pages(self.config.pages.clone())
        } else if !self.config.categories.is_empty() {
            Seed::Categories(self.config.categories.clone())
        } else {
            Seed::Categories(vec![DEFAULT_CATEGORY.to_string()])
        }
    }

    fn accept(&self, url: &Url, ctx: &CrawlingContext) -> bool {
        url.host_str() == ctx.category.host_str() && self.detail.is_match(url.path())
    }

    fn scrap(&self, doc: RawDocument) -> Result<FundRecord, ScrapError> {
        let record = self.engine.extract(&doc)?;
        log::debug!("Extracted {} from {} page", record.name, doc.strategy);
        Self::warn_missing(&record);
        Ok(record)
    }

    fn finalizer(&mut self, report: &HarvestReport<FundRecord>) -> anyhow::Result<()> {
        let rows = writer::write_table(
            &self.config.csv_file,
            self.config.file_mode,
            &self.config.csv,
            &FundRecord::COLUMNS,
            &report.records,
        )?;
        log::info!("Wrote {rows} records to {}", self.config.csv_file.display());

        for failure in &report.failures {
            log::warn!(
                "Failed {} {}: {} ({})",
                failure.scope,
                failure.url,
                failure.reason,
                failure.detail
            );
        }
        if let Some(path) = &self.config.failures_file {
            writer::write_failures(
                path,
                self.config.file_mode,
                &self.config.csv,
                &report.failures,
            )?;
            log::info!(
                "Wrote {} failures to {}",
                report.failures.len(),
                path.display()
            );
        }
        Ok(())
    }
}
