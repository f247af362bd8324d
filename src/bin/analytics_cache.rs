//! # Analytics Cache Tool
//!
//! Command-line companion for the analytics pipeline: validate configuration,
//! compute cache keys for saved queries and plan background refreshes.
//!
//! Query files are JSON arrays of serialized `QueryParameters`:
//!
//! ```json
//! [{"report_type": "realtime", "dimensions": [{"name": "country"}], "metrics": [{"name": "activeUsers"}]}]
//! ```

use analytics_core::cache::KeyGenerator;
use analytics_core::config::{AnalyticsConfig, ConfigManager};
use analytics_core::messaging::FetchJob;
use analytics_core::models::{QueryParameters, ReportType};
use analytics_core::orchestration::ttl_for;
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "analytics-cache")]
#[command(about = "Inspect analytics cache configuration and plan refreshes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to load (development, test, production)
    #[arg(short, long)]
    environment: Option<String>,

    /// Configuration directory (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate configuration, then print it
    ValidateConfig,

    /// Print the cache key and lifetime of every query in a file
    Keys {
        /// JSON file holding an array of queries
        #[arg(short, long)]
        params: PathBuf,
    },

    /// Print the background jobs a refresh would enqueue
    Refresh {
        /// Report types to refresh
        #[arg(short = 't', long = "type", value_enum, default_value = "all")]
        report_type: RefreshTarget,

        /// JSON file holding an array of queries
        #[arg(short, long)]
        params: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RefreshTarget {
    Report,
    Realtime,
    Dimension,
    All,
}

impl RefreshTarget {
    fn includes(self, report_type: ReportType) -> bool {
        match self {
            RefreshTarget::All => true,
            RefreshTarget::Report => report_type == ReportType::Report,
            RefreshTarget::Realtime => report_type == ReportType::Realtime,
            RefreshTarget::Dimension => report_type == ReportType::Dimension,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = load_config(&cli).and_then(|manager| match &cli.command {
        Commands::ValidateConfig => validate_config(&manager),
        Commands::Keys { params } => print_keys(manager.config(), params),
        Commands::Refresh {
            report_type,
            params,
        } => plan_refresh(manager.config(), *report_type, params),
    });

    if let Err(e) = result {
        error!("analytics-cache failed: {e:#}");
        eprintln!("❌ {e:#}");
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<std::sync::Arc<ConfigManager>> {
    let manager = match &cli.environment {
        Some(env) => ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), env),
        None => ConfigManager::load_from_directory(cli.config_dir.clone()),
    };
    manager.context("failed to load analytics configuration")
}

fn validate_config(manager: &ConfigManager) -> anyhow::Result<()> {
    println!("🔧 Analytics configuration");
    println!("Environment: {}", manager.environment());
    println!("Config Directory: {}", manager.config_directory().display());
    println!();
    println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
    println!();
    println!("✅ Configuration is valid");
    Ok(())
}

fn read_queries(path: &Path) -> anyhow::Result<Vec<QueryParameters>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of queries", path.display()))
}

fn print_keys(config: &AnalyticsConfig, path: &Path) -> anyhow::Result<()> {
    let keys = KeyGenerator::new();

    for params in read_queries(path)? {
        let ttl = ttl_for(params.report_type(), &config.cache);
        println!(
            "{:<10} {}:{}  ttl={}s",
            params.report_type(),
            config.cache.prefix,
            keys.key_for(&params),
            ttl.as_secs()
        );
    }
    Ok(())
}

fn plan_refresh(config: &AnalyticsConfig, target: RefreshTarget, path: &Path) -> anyhow::Result<()> {
    let keys = KeyGenerator::new();
    let queries: Vec<QueryParameters> = read_queries(path)?
        .into_iter()
        .filter(|params| target.includes(params.report_type()))
        .collect();

    if queries.is_empty() {
        println!("Nothing to refresh for {target:?}");
        return Ok(());
    }

    if !config.background_jobs.enabled {
        println!("⚠️  Background jobs are disabled; refreshes would run synchronously");
    }

    println!(
        "Queue: {}  (max attempts {}, backoff {}s)",
        config.background_jobs.queue_name,
        config.background_jobs.max_attempts,
        config.background_jobs.retry_backoff_seconds,
    );
    for params in queries {
        let key = keys.key_for(&params);
        let mut job = FetchJob::new(params)
            .with_cache_key(key.clone())
            .on_queue(config.background_jobs.queue_name.clone());
        if job.report_type.is_realtime() && config.realtime.enabled {
            job = job.with_delay(config.realtime.update_interval());
        }

        println!(
            "  {} {:<10} {}  delay={}s",
            job.id,
            job.report_type,
            key,
            job.delay.map(|d| d.as_secs()).unwrap_or(0)
        );
    }
    Ok(())
}
