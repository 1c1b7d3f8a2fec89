//! # Scheduler Configuration Validator
//!
//! Loads a scheduler configuration the same way `TaskQueue` does (defaults, optional TOML
//! file, `TASKER_SCHEDULER__*` environment overrides), validates it and prints the
//! resolved result. Exits non-zero when the configuration is invalid.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tasker_scheduler::config::SchedulerConfig;
use tasker_scheduler::orchestration::BackoffCalculator;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate task scheduler configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (TOML); environment overrides apply on top
    #[arg(short, long, env = "TASKER_SCHEDULER_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate and print a short summary
    Validate,

    /// Print the resolved policy of every configured task type as JSON
    Policies,

    /// Print the full resolved configuration as JSON
    Show,

    /// Print the retry delays a task type would see, without jitter
    Backoff {
        /// Configured task type; the default policy when omitted
        #[arg(short, long)]
        task_type: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    match run(&cli) {
        Ok(()) => {
            info!("Configuration validation completed successfully");
        }
        Err(e) => {
            error!("Configuration validation failed: {e:#}");
            eprintln!("invalid configuration: {e:#}");
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = SchedulerConfig::load(cli.config.as_deref())?;

    match &cli.command {
        None | Some(Commands::Validate) => print_summary(cli, &config),
        Some(Commands::Policies) => {
            let policies: std::collections::BTreeMap<_, _> = config.policies().into_iter().collect();
            println!("{}", serde_json::to_string_pretty(&policies)?);
        }
        Some(Commands::Show) => println!("{}", serde_json::to_string_pretty(&config)?),
        Some(Commands::Backoff { task_type }) => print_backoff(&config, task_type.as_deref())?,
    }
    Ok(())
}

fn print_summary(cli: &Cli, config: &SchedulerConfig) {
    match &cli.config {
        Some(path) => println!("Configuration file: {}", path.display()),
        None => println!("Configuration file: (none, defaults and environment only)"),
    }
    println!("Tick interval:      {} ms", config.tick_interval_ms);
    println!("History limit:      {}", config.history_limit);
    println!("Metrics window:     {} s", config.metrics_window_secs);
    println!("Shutdown grace:     {} ms", config.shutdown_grace_ms);
    println!("Task types:         {}", config.types.len());
    for (task_type, policy) in config.policies() {
        println!(
            "  {task_type}: concurrency={} timeout={}ms max_retries={} backoff={}..{}ms",
            policy.concurrency,
            policy.timeout.as_millis(),
            policy.max_retries,
            policy.retry_delay_base.as_millis(),
            policy.retry_delay_max.as_millis()
        );
    }
    println!("Configuration is valid");
}

fn print_backoff(config: &SchedulerConfig, task_type: Option<&str>) -> anyhow::Result<()> {
    let policy = match task_type {
        None => config.default_policy(),
        Some(name) => config
            .policies()
            .into_iter()
            .find(|(configured, _)| configured == name)
            .map(|(_, policy)| policy)
            .ok_or_else(|| anyhow::anyhow!("task type '{name}' is not configured"))?,
    };

    let calculator = BackoffCalculator::without_jitter();
    for retry in 1..=policy.max_retries.max(1) {
        println!(
            "retry {retry}: {} ms",
            calculator.base_delay_for(retry, &policy).as_millis()
        );
    }
    Ok(())
}
