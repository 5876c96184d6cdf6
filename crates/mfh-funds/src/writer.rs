use std::io;
use std::path::Path;

use fs_err as fs;
use mfh_crawler::Failure;
use serde::{Deserialize, Serialize};

/// Dialect of the emitted tables. The defaults produce plain comma
/// separated, LF terminated rows that Parquet converters load as-is.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvWriterConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Escape character for quotes; doubled quotes when unset
    #[serde(default)]
    pub escape: Option<char>,
    #[serde(default)]
    pub flexible: bool,
    #[serde(default)]
    pub line_ending: LineEnding,
    /// Quote every field instead of only those that need it
    #[serde(default)]
    pub quote_all: bool,
}

impl Default for CsvWriterConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            escape: None,
            flexible: false,
            line_ending: LineEnding::default(),
            quote_all: false,
        }
    }
}

fn default_delimiter() -> char {
    ','
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Lf,
    Crlf,
}

impl CsvWriterConfig {
    /// Headers are left to [`CsvWriter::open`] so appends can skip them.
    fn builder(&self) -> anyhow::Result<csv::WriterBuilder> {
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(single_byte("delimiter", self.delimiter)?)
            .flexible(self.flexible)
            .has_headers(false)
            .terminator(match self.line_ending {
                LineEnding::Lf => csv::Terminator::Any(b'\n'),
                LineEnding::Crlf => csv::Terminator::CRLF,
            })
            .quote_style(if self.quote_all {
                csv::QuoteStyle::Always
            } else {
                csv::QuoteStyle::Necessary
            });
        match self.escape {
            Some(escape) => builder
                .double_quote(false)
                .escape(single_byte("escape", escape)?),
            None => builder.double_quote(true),
        };
        Ok(builder)
    }
}

fn single_byte(what: &str, c: char) -> anyhow::Result<u8> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| anyhow::anyhow!("CSV {what} must be an ASCII character, got {c:?}"))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileMode {
    #[default]
    Create,
    Append,
}

impl FileMode {
    fn open(&self, path: &Path) -> io::Result<fs::File> {
        let mut opts = fs::OpenOptions::new();
        opts.write(true).create(true);
        match self {
            Self::Create => opts.truncate(true),
            Self::Append => opts.append(true),
        };
        opts.open(path)
    }
}

pub enum CsvWriter {
    File(csv::Writer<fs::File>),
    Stdout(csv::Writer<io::Stdout>),
}

impl CsvWriter {
    /// Opens `path`, or stdout for `-`. The header is written unless rows
    /// are appended to a file that already has content.
    pub fn open(
        path: &Path,
        mode: FileMode,
        config: &CsvWriterConfig,
        header: &[&str],
    ) -> anyhow::Result<Self> {
        let builder = config.builder()?;
        let (mut wtr, needs_header) = if path == Path::new("-") {
            (Self::Stdout(builder.from_writer(io::stdout())), true)
        } else {
            let needs_header = match mode {
                FileMode::Create => true,
                FileMode::Append => fs::metadata(path).map_or(true, |m| m.len() == 0),
            };
            (Self::File(builder.from_writer(mode.open(path)?)), needs_header)
        };
        if needs_header {
            wtr.write_record(header)?;
        }
        Ok(wtr)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::File(wtr) => wtr.flush(),
            Self::Stdout(wtr) => wtr.flush(),
        }
    }

    pub fn write_record<I, T>(&mut self, record: I) -> csv::Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        match self {
            Self::File(wtr) => wtr.write_record(record),
            Self::Stdout(wtr) => wtr.write_record(record),
        }
    }

    pub fn serialize<S: Serialize>(&mut self, row: S) -> csv::Result<()> {
        match self {
            Self::File(wtr) => wtr.serialize(row),
            Self::Stdout(wtr) => wtr.serialize(row),
        }
    }
}

/// Writes a whole table at once and returns the number of data rows.
pub fn write_table<R, I>(
    path: &Path,
    mode: FileMode,
    config: &CsvWriterConfig,
    header: &[&str],
    rows: I,
) -> anyhow::Result<usize>
where
    R: Serialize,
    I: IntoIterator<Item = R>,
{
    let mut wtr = CsvWriter::open(path, mode, config, header)?;
    let mut count = 0;
    for row in rows {
        wtr.serialize(row)?;
        count += 1;
    }
    wtr.flush()?;
    Ok(count)
}

pub const FAILURE_COLUMNS: [&str; 4] = ["url", "scope", "reason", "detail"];

#[derive(Serialize)]
struct FailureRow<'a> {
    url: &'a str,
    scope: String,
    reason: &'static str,
    detail: &'a str,
}

impl<'a> From<&'a Failure> for FailureRow<'a> {
    fn from(f: &'a Failure) -> Self {
        Self {
            url: &f.url,
            scope: f.scope.to_string(),
            reason: f.reason.as_str(),
            detail: &f.detail,
        }
    }
}

pub fn write_failures(
    path: &Path,
    mode: FileMode,
    config: &CsvWriterConfig,
    failures: &[Failure],
) -> anyhow::Result<usize> {
    write_table(
        path,
        mode,
        config,
        &FAILURE_COLUMNS,
        failures.iter().map(FailureRow::from),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfh_crawler::{FailureReason, FailureScope};

    #[derive(Serialize)]
    struct Row {
        a: &'static str,
        b: Option<f64>,
    }

    #[test]
    fn append_skips_header_on_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let conf = CsvWriterConfig::default();

        write_table(&path, FileMode::Append, &conf, &["a", "b"], [Row { a: "x", b: Some(1.5) }])
            .unwrap();
        write_table(&path, FileMode::Append, &conf, &["a", "b"], [Row { a: "y", b: None }])
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a,b\nx,1.5\ny,\n");
    }

    #[test]
    fn create_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "stale\n").unwrap();

        let rows: Vec<Row> = Vec::new();
        let n = write_table(&path, FileMode::Create, &CsvWriterConfig::default(), &["a", "b"], rows)
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n");
    }

    #[test]
    fn failures_are_tabulated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failures.csv");
        let failures = vec![Failure {
            url: "https://funds.test/f/3".into(),
            scope: FailureScope::Item,
            reason: FailureReason::RetryExhausted,
            detail: "503, after 3 attempts".into(),
        }];

        let conf = CsvWriterConfig {
            delimiter: ';',
            ..Default::default()
        };
        write_failures(&path, FileMode::Create, &conf, &failures).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "url;scope;reason;detail\nhttps://funds.test/f/3;item;retry-exhausted;503, after 3 attempts\n"
        );
    }

    #[test]
    fn dialect_is_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let conf = CsvWriterConfig {
            line_ending: LineEnding::Crlf,
            quote_all: true,
            ..Default::default()
        };
        write_table(&path, FileMode::Create, &conf, &["a", "b"], [Row { a: "x", b: Some(2.0) }])
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "\"a\",\"b\"\r\n\"x\",\"2.0\"\r\n"
        );
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let conf = CsvWriterConfig {
            delimiter: '§',
            ..Default::default()
        };
        let rows: Vec<Row> = Vec::new();
        let err = write_table(&dir.path().join("out.csv"), FileMode::Create, &conf, &["a"], rows)
            .unwrap_err();
        assert!(err.to_string().contains("delimiter"));
    }

    #[test]
    fn config_deserializes() {
        let conf: CsvWriterConfig =
            serde_json::from_str(r#"{"delimiter": "\t", "lineEnding": "crlf"}"#).unwrap();
        assert_eq!(conf.delimiter, '\t');
        assert_eq!(conf.line_ending, LineEnding::Crlf);
        assert!(!conf.quote_all);
        let mode: FileMode = serde_json::from_str(r#""append""#).unwrap();
        assert_eq!(mode, FileMode::Append);
    }
}
