mod extract;
mod fund;
mod numeric;
mod record;
mod writer;

pub use extract::{
    clean_name, ExtractError, ExtractionEngine, Extractor, LinkedData, NextData, Page, Pattern,
};
pub use fund::{default_output_file, FundScraper, FundScraperConfig, DEFAULT_CATEGORY};
pub use numeric::{age_from_inception, age_in_years, json_number, parse_date, parse_number};
pub use record::{Field, FundRecord, Partial};
pub use writer::{
    write_failures, write_table, CsvWriter, CsvWriterConfig, FileMode, LineEnding,
};
