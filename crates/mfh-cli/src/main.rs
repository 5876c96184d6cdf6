use std::env;
use std::io;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use fs_err as fs;
use mfh_crawler::{
    crawl_site, CrawlerConfig, HarvestReport, RawDocument, Scrapable, Strategy, StructuredData,
    Throttle, Transport,
};
use mfh_funds::{
    default_output_file, write_table, CsvWriterConfig, FileMode, FundRecord, FundScraper,
    FundScraperConfig, DEFAULT_CATEGORY,
};
use tokio::runtime;

const PROXY_VARS: [&str; 3] = ["MFH_PROXY", "HTTPS_PROXY", "HTTP_PROXY"];

/// Mutual Fund metrics Harvester
#[derive(Debug, Parser)]
#[clap(version)]
pub struct Args {
    #[clap(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[clap(name = "harvest")]
    Harvest(HarvestArgs),
    #[clap(name = "scrap")]
    Scrap(ScrapArgs),
    #[clap(hide = true)]
    Completion,
}

/// Discover funds from category listings and harvest their metrics to CSV
#[derive(Debug, clap::Args)]
pub struct HarvestArgs {
    /// Category listing URL, can be repeated
    #[clap(long = "url")]
    pub urls: Vec<String>,
    /// File with one category listing URL per line
    #[clap(parse(from_os_str), long)]
    pub categories: Option<PathBuf>,
    /// File with one fund page URL per line, harvested without discovery
    #[clap(parse(from_os_str), long, conflicts_with_all = &["urls", "categories"])]
    pub pages: Option<PathBuf>,
    /// Path to the output csv file, `-` for stdout (default derived from the first category)
    #[clap(parse(from_os_str), long, short)]
    pub output_file: Option<PathBuf>,
    /// Path to a csv file listing the URLs that could not be harvested
    #[clap(parse(from_os_str), long)]
    pub failures_file: Option<PathBuf>,
    /// Append to existing output files instead of truncating them
    #[clap(long)]
    pub append: bool,
    /// Optional default crawler yaml configuration file
    #[clap(env = "MFH_CRAWLER_CONFIG", parse(from_os_str), long)]
    pub crawler_config: Option<PathBuf>,
    /// Maximum number of funds to harvest across all categories
    #[clap(long)]
    pub limit: Option<usize>,
    /// Override the delay in seconds between two requests
    #[clap(long)]
    pub delay: Option<f32>,
    /// Proxy URL (falls back to MFH_PROXY, HTTPS_PROXY then HTTP_PROXY)
    #[clap(long)]
    pub proxy: Option<String>,
    /// Override crawler's user agent
    #[clap(long)]
    pub user_agent: Option<String>,
    /// Override crawler's number of funds fetched concurrently
    #[clap(long)]
    pub concurrency: Option<usize>,
    /// Override crawler's attempts per fetch strategy
    #[clap(long)]
    pub max_attempts: Option<u32>,
    /// Never escalate to the headless browser
    #[clap(long)]
    pub no_render: bool,
    /// When quiet no logs are outputted
    #[clap(long, short)]
    pub quiet: bool,
}

/// First non-empty proxy among the CLI value, the environment, and the config file.
fn resolve_proxy<F>(cli: Option<&str>, env_var: F, file: Option<String>) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |p: String| {
        let p = p.trim().to_string();
        (!p.is_empty()).then_some(p)
    };
    cli.map(str::to_string)
        .and_then(non_empty)
        .or_else(|| PROXY_VARS.iter().find_map(|var| env_var(var).and_then(non_empty)))
        .or_else(|| file.and_then(non_empty))
}

fn load_crawler_config(path: Option<&Path>) -> anyhow::Result<CrawlerConfig> {
    match path {
        Some(path) => Ok(serde_yaml::from_reader(fs::File::open(path)?)?),
        None => Ok(CrawlerConfig::default()),
    }
}

impl TryFrom<&HarvestArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &HarvestArgs) -> Result<Self, Self::Error> {
        let mut conf = load_crawler_config(args.crawler_config.as_deref())?;
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(delay) = args.delay {
            conf.throttle = Some(Throttle::Delay(delay));
        }
        if let Some(concurrency) = args.concurrency {
            conf.concurrency = concurrency;
        }
        if let Some(max_attempts) = args.max_attempts {
            conf.retry.max_attempts = max_attempts;
        }
        if args.limit.is_some() {
            conf.item_limit = args.limit;
        }
        if args.no_render {
            conf.render.enabled = false;
        }
        conf.proxy = resolve_proxy(
            args.proxy.as_deref(),
            |var| env::var(var).ok(),
            conf.proxy.take(),
        );
        Ok(conf)
    }
}

/// Non-empty, trimmed lines of `path`; `#` starts a comment line.
fn load_url_list(path: &Path) -> anyhow::Result<Vec<String>> {
    let urls: Vec<String> = fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect();
    if urls.is_empty() {
        anyhow::bail!("No URL found in {}", path.display());
    }
    Ok(urls)
}

impl TryFrom<&HarvestArgs> for FundScraperConfig {
    type Error = anyhow::Error;

    fn try_from(args: &HarvestArgs) -> Result<Self, Self::Error> {
        let mut categories = args.urls.clone();
        if let Some(path) = &args.categories {
            categories.extend(load_url_list(path)?);
        }
        let pages = match &args.pages {
            Some(path) => load_url_list(path)?,
            None => Vec::new(),
        };

        let output_file = args.output_file.clone().unwrap_or_else(|| {
            let first = categories.first().map_or(DEFAULT_CATEGORY, String::as_str);
            default_output_file(first)
        });

        let mut conf = FundScraperConfig::new(output_file);
        conf.categories = categories;
        conf.pages = pages;
        conf.failures_file = args.failures_file.clone();
        if args.append {
            conf.file_mode = FileMode::Append;
        }
        Ok(conf)
    }
}

/// A run fails only when nothing was harvested and something went wrong.
fn succeeded<R>(report: &HarvestReport<R>) -> bool {
    !report.records.is_empty() || report.failures.is_empty()
}

pub fn harvest(args: HarvestArgs) -> anyhow::Result<()> {
    let crawler_conf: CrawlerConfig = (&args).try_into()?;
    let scraper_conf: FundScraperConfig = (&args).try_into()?;
    log::info!("Writing funds to {}", scraper_conf.csv_file.display());

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let report = rt.block_on(crawl_site::<FundScraper>(&crawler_conf, &scraper_conf))?;
    if !succeeded(&report) {
        anyhow::bail!(
            "No fund data harvested, {} URLs failed",
            report.failures.len()
        );
    }
    Ok(())
}

/// Extract a single fund page and print its record to stdout
#[derive(Debug, clap::Args)]
#[clap(group = clap::ArgGroup::new("page").required(true))]
pub struct ScrapArgs {
    /// A local html page to extract
    #[clap(group = "page", parse(from_os_str), long)]
    pub file: Option<PathBuf>,
    /// A distant html page to extract, fetched without rendering
    #[clap(group = "page", long)]
    pub url: Option<String>,
    /// Custom user agent to download the page
    #[clap(long, conflicts_with = "file")]
    pub ua: Option<String>,
}

pub fn scrap(args: ScrapArgs) -> anyhow::Result<()> {
    let mut crawler_conf = CrawlerConfig::default();
    let (url, html) = if let Some(url) = args.url {
        if let Some(ua) = args.ua {
            crawler_conf.user_agent = ua;
        }
        crawler_conf.proxy = resolve_proxy(None, |var| env::var(var).ok(), None);
        let transport = Transport::new(&crawler_conf)?;
        let rt = runtime::Builder::new_current_thread().enable_all().build()?;
        let html = rt.block_on(transport.get(&url))?;
        (url, html)
    } else if let Some(path) = args.file {
        let html = fs::read_to_string(&path)?;
        (path.display().to_string(), html)
    } else {
        anyhow::bail!("Missing `url` or `file`");
    };

    let blob = StructuredData::new(&crawler_conf.structured_data)?;
    let doc = RawDocument {
        url,
        structured_data: blob.read(&html),
        html,
        strategy: Strategy::Static,
    };
    let scraper = <FundScraper as Scrapable>::new(&FundScraperConfig::new("-"))?;
    let record = scraper.scrap(doc)?;
    write_table(
        Path::new("-"),
        FileMode::Create,
        &CsvWriterConfig::default(),
        &FundRecord::COLUMNS,
        [record],
    )?;
    Ok(())
}

fn init_logger(filter: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Harvest(args) => {
            if !args.quiet {
                init_logger("mfh=info,mfh_crawler=info,mfh_funds=info");
            }
            harvest(args)
        }
        SubCommand::Scrap(args) => {
            init_logger("mfh_funds=warn");
            scrap(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "mfh", &mut io::stdout());
            Ok(())
        }
    }
}
