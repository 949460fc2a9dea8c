//! Sumi-Sitecrawl main entry point
//!
//! This is the command-line interface for the Sumi-Sitecrawl crawl engine.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sumi_sitecrawl::config::{load_config_with_hash, EngineConfig};
use sumi_sitecrawl::storage::JobFilter;
use sumi_sitecrawl::{CrawlEngine, HttpExtractor, Job, JobConfig, JobStatus, ScopePolicy, StopOutcome};
use tracing_subscriber::EnvFilter;

/// Sumi-Sitecrawl: a polite site crawler
///
/// Crawls a single site breadth-first while respecting robots.txt, per-domain
/// rate limits and page/duration limits. Every job is persisted under the
/// data directory and can be inspected, exported or deleted afterwards.
#[derive(Parser, Debug)]
#[command(name = "sumi-sitecrawl")]
#[command(version)]
#[command(about = "A polite site crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl a site and wait for the job to finish (Ctrl-C stops it)
    Crawl(CrawlArgs),

    /// Show a job's status and counters
    Status { job_id: String },

    /// List jobs, newest first
    List {
        /// Only jobs with this status
        #[arg(long)]
        status: Option<String>,

        /// Only jobs for this registrable domain
        #[arg(long)]
        domain: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// List a job's page records in crawl order
    Pages {
        job_id: String,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Print a job's event log
    Logs { job_id: String },

    /// Delete all data of a finished job
    Delete { job_id: String },

    /// Export a job's pages
    Export {
        job_id: String,

        #[arg(long, value_enum, default_value_t = ExportFormat::Jsonl)]
        format: ExportFormat,
    },
}

#[derive(clap::Args, Debug)]
struct CrawlArgs {
    /// Start URL
    url: String,

    /// Maximum pages to discover (1-5000)
    #[arg(long, default_value_t = 1000)]
    max_pages: u32,

    /// Maximum crawl duration in seconds (60-43200)
    #[arg(long, default_value_t = 3600)]
    max_duration: u64,

    /// Scope policy
    #[arg(long, value_enum, default_value_t = ScopeArg::Domain)]
    scope: ScopeArg,

    /// Pattern for --scope regex
    #[arg(long, required_if_eq("scope", "regex"))]
    scope_pattern: Option<String>,

    /// Requests per second per domain (0.1-10.0)
    #[arg(long, default_value_t = 1.0)]
    rate_limit: f64,

    /// Ignore robots.txt
    #[arg(long)]
    ignore_robots: bool,

    /// Download images found on crawled pages
    #[arg(long)]
    include_assets: bool,

    /// Regex of URLs to crawl regardless of scope (repeatable)
    #[arg(long = "include")]
    include: Vec<String>,

    /// Regex of URLs never to crawl (repeatable)
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// Workers for this job (1-32)
    #[arg(long, default_value_t = 4)]
    concurrency: u32,

    /// Do not follow links found on pages at this depth
    #[arg(long)]
    max_depth: Option<u32>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ScopeArg {
    Domain,
    Host,
    Path,
    Regex,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ExportFormat {
    Jsonl,
    Zip,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => EngineConfig::default(),
    };

    let extractor = HttpExtractor::from_config(
        &config.user_agent,
        Duration::from_secs(config.engine.fetch_timeout_secs),
    )?;
    // Only a crawling process finalizes abandoned jobs
    let engine = match &cli.command {
        Command::Crawl(_) => CrawlEngine::new(config, Arc::new(extractor))?,
        _ => CrawlEngine::attach(config, Arc::new(extractor))?,
    };

    match cli.command {
        Command::Crawl(args) => handle_crawl(&engine, args).await?,
        Command::Status { job_id } => print_job(&engine.get_status(&job_id)?),
        Command::List {
            status,
            domain,
            limit,
            offset,
        } => {
            let status = match status.as_deref() {
                Some(s) => match JobStatus::from_db_string(s) {
                    Some(status) => Some(status),
                    None => bail!("Unknown status '{}'", s),
                },
                None => None,
            };
            let jobs = engine.list_jobs(&JobFilter { status, domain }, limit, offset)?;
            for job in &jobs {
                println!(
                    "{}  {:<9}  {:>5} pages  {}  {}",
                    job.id,
                    job.status,
                    job.counters.pages_crawled,
                    job.created_at.format("%Y-%m-%d %H:%M:%S"),
                    job.config.start_url
                );
            }
            if jobs.is_empty() {
                println!("No jobs");
            }
        }
        Command::Pages {
            job_id,
            limit,
            offset,
        } => {
            let list = engine.list_pages(&job_id, limit, offset)?;
            for page in &list.pages {
                let outcome = match (page.success, page.skip_reason) {
                    (true, _) => "ok".to_string(),
                    (false, Some(reason)) => reason.to_string(),
                    (false, None) => "failed".to_string(),
                };
                println!(
                    "{:>2}  {:>3}  {:<18}  {}",
                    page.depth,
                    page.status_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
                    outcome,
                    page.url
                );
            }
            println!("\n{} of {} pages shown", list.pages.len(), list.total);
        }
        Command::Logs { job_id } => print!("{}", engine.get_logs(&job_id)?),
        Command::Delete { job_id } => {
            engine.delete_job(&job_id)?;
            println!("✓ Deleted job {}", job_id);
        }
        Command::Export { job_id, format } => {
            let path = match format {
                ExportFormat::Jsonl => engine.export_jsonl(&job_id)?,
                ExportFormat::Zip => engine.export_archive(&job_id)?,
            };
            println!("✓ Exported to: {}", path.display());
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_sitecrawl=info,warn"),
            1 => EnvFilter::new("sumi_sitecrawl=debug,info"),
            2 => EnvFilter::new("sumi_sitecrawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the crawl command: starts a job and waits for it
async fn handle_crawl(engine: &CrawlEngine, args: CrawlArgs) -> anyhow::Result<()> {
    let mut config = JobConfig::new(args.url);
    config.max_pages = args.max_pages;
    config.max_duration_secs = args.max_duration;
    config.scope = match args.scope {
        ScopeArg::Domain => ScopePolicy::Domain,
        ScopeArg::Host => ScopePolicy::Host,
        ScopeArg::Path => ScopePolicy::Path,
        ScopeArg::Regex => ScopePolicy::Regex(args.scope_pattern.unwrap_or_default()),
    };
    config.rate_limit = args.rate_limit;
    config.respect_robots = !args.ignore_robots;
    config.include_assets = args.include_assets;
    config.custom_patterns.include = args.include;
    config.custom_patterns.exclude = args.exclude;
    config.concurrency = args.concurrency;
    config.max_depth = args.max_depth;

    let job_id = engine.start_job(config)?;
    println!("Started job {}", job_id);

    let job = tokio::select! {
        job = engine.wait(&job_id) => job?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping job {}", job_id);
            match engine.stop_job(&job_id).await? {
                StopOutcome::Stopped => {}
                StopOutcome::AlreadyTerminal(status) => {
                    tracing::info!("Job {} had already finished as {}", job_id, status);
                }
            }
            engine.get_status(&job_id)?
        }
    };

    print_job(&job);
    Ok(())
}

fn print_job(job: &Job) {
    let counters = &job.counters;
    println!("Job:       {}", job.id);
    println!("Start URL: {}", job.config.start_url);
    println!("Status:    {}", job.status);
    println!("Created:   {}", job.created_at.to_rfc3339());
    if let Some(started) = job.started_at {
        println!("Started:   {}", started.to_rfc3339());
    }
    if let Some(finished) = job.finished_at {
        println!("Finished:  {}", finished.to_rfc3339());
    }
    if let Some(elapsed) = job.elapsed() {
        println!("Elapsed:   {}s", elapsed.num_seconds());
    }
    println!(
        "Pages:     {} found, {} crawled, {} remaining",
        counters.pages_found, counters.pages_crawled, counters.pages_remaining
    );
    println!(
        "Outcomes:  {} ok, {} failed, {} skipped",
        counters.pages_ok, counters.pages_failed, counters.pages_skipped
    );
    if !job.errors.is_empty() {
        println!("\nErrors:");
        for error in &job.errors {
            println!("  - {}", error);
        }
    }
}
