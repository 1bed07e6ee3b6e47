//! Stampede CLI
//!
//! Drives bursts of concurrent callers through a coalescing cache in front of
//! a simulated slow upstream, and reports how many upstream calls got through.

mod upstream;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stampede_cache::{AsyncCoalescingCache, CacheStats, CoalescingCache};
use stampede_core::{CacheConfig, StampedeError, MAX_TTL};

use crate::upstream::Upstream;

/// Stampede - TTL cache with single-flight request coalescing
#[derive(Parser)]
#[command(name = "stampede")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the run report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hammer the blocking cache from OS threads
    Run(LoadArgs),

    /// Hammer the async cache from tokio tasks
    RunAsync(LoadArgs),

    /// Print the effective cache configuration
    Config,
}

#[derive(Args, Clone, Debug)]
struct LoadArgs {
    /// Concurrent callers per round
    #[arg(short, long, default_value = "32", env = "STAMPEDE_CALLERS")]
    callers: usize,

    /// Number of bursts
    #[arg(short, long, default_value = "5")]
    rounds: usize,

    /// Upstream latency in milliseconds
    #[arg(long, default_value = "200", env = "STAMPEDE_LATENCY_MS")]
    latency_ms: u64,

    /// Cache TTL in milliseconds (defaults to the configured TTL)
    #[arg(long, env = "STAMPEDE_TTL_MS")]
    ttl_ms: Option<u64>,

    /// Pause between bursts in milliseconds
    #[arg(long, default_value = "400")]
    pause_ms: u64,

    /// Make every Nth upstream call fail
    #[arg(long)]
    fail_every: Option<u64>,
}

/// Outcome of a load run.
#[derive(Debug, Serialize)]
struct RunReport {
    mode: &'static str,
    callers: usize,
    rounds: usize,
    ttl_ms: u64,
    upstream_calls: u64,
    ok: u64,
    errors: u64,
    elapsed_ms: u64,
    stats: CacheStats,
}

/// Shared per-run tallies.
#[derive(Default)]
struct Tally {
    ok: AtomicU64,
    errors: AtomicU64,
}

impl Tally {
    fn record<T>(&self, outcome: &std::result::Result<T, StampedeError>) {
        match outcome {
            Ok(_) => self.ok.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.errors.fetch_add(1, Ordering::Relaxed),
        };
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before clap reads its env fallbacks
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "stampede=debug,info"
    } else {
        "stampede=info,warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env().context("Failed to load cache configuration")?;

    match cli.command {
        Commands::Run(args) => {
            let report = cmd_run(config, args).await?;
            print_report(&report, cli.json)
        }
        Commands::RunAsync(args) => {
            let report = cmd_run_async(config, args).await?;
            print_report(&report, cli.json)
        }
        Commands::Config => cmd_config(&config),
    }
}

/// Resolves the TTL for a run from flags and config.
fn resolve_ttl(config: &CacheConfig, args: &LoadArgs) -> Result<Duration> {
    let ttl = args
        .ttl_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.default_ttl());
    if ttl > MAX_TTL {
        return Err(StampedeError::InvalidConfig(format!(
            "ttl {}ms exceeds maximum of {}ms",
            ttl.as_millis(),
            MAX_TTL.as_millis()
        ))
        .into());
    }
    Ok(ttl)
}

fn progress_bar(rounds: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(rounds as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} bursts ({elapsed})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Run bursts against the blocking cache
async fn cmd_run(config: CacheConfig, args: LoadArgs) -> Result<RunReport> {
    let ttl = resolve_ttl(&config, &args)?;
    let pb = progress_bar(args.rounds)?;
    info!(callers = args.callers, rounds = args.rounds, ttl_ms = ttl.as_millis() as u64, "Starting blocking run");

    let handle = tokio::task::spawn_blocking(move || {
        let cache: CoalescingCache<String, StampedeError> = CoalescingCache::with_config(config);
        let upstream = Upstream::new(Duration::from_millis(args.latency_ms), args.fail_every);
        let tally = Tally::default();
        let start = Instant::now();

        for _ in 0..args.rounds {
            std::thread::scope(|s| {
                for _ in 0..args.callers {
                    s.spawn(|| {
                        let outcome = cache.execute(ttl, || upstream.fetch_blocking());
                        tally.record(&outcome);
                    });
                }
            });
            pb.inc(1);
            std::thread::sleep(Duration::from_millis(args.pause_ms));
        }
        pb.finish_and_clear();

        RunReport {
            mode: "blocking",
            callers: args.callers,
            rounds: args.rounds,
            ttl_ms: ttl.as_millis() as u64,
            upstream_calls: upstream.calls(),
            ok: tally.ok.load(Ordering::Relaxed),
            errors: tally.errors.load(Ordering::Relaxed),
            elapsed_ms: start.elapsed().as_millis() as u64,
            stats: cache.stats(),
        }
    });

    handle.await.context("Blocking run panicked")
}

/// Run bursts against the async cache
async fn cmd_run_async(config: CacheConfig, args: LoadArgs) -> Result<RunReport> {
    let ttl = resolve_ttl(&config, &args)?;
    let pb = progress_bar(args.rounds)?;
    info!(callers = args.callers, rounds = args.rounds, ttl_ms = ttl.as_millis() as u64, "Starting async run");

    let cache: Arc<AsyncCoalescingCache<String, StampedeError>> =
        Arc::new(AsyncCoalescingCache::with_config(config));
    let upstream = Arc::new(Upstream::new(
        Duration::from_millis(args.latency_ms),
        args.fail_every,
    ));
    let tally = Arc::new(Tally::default());
    let start = Instant::now();

    for _ in 0..args.rounds {
        let tasks = (0..args.callers).map(|_| {
            let cache = cache.clone();
            let upstream = upstream.clone();
            let tally = tally.clone();
            tokio::spawn(async move {
                let outcome = cache.execute(ttl, || upstream.fetch()).await;
                tally.record(&outcome);
            })
        });
        for joined in futures::future::join_all(tasks).await {
            joined.context("Caller task failed")?;
        }
        pb.inc(1);
        tokio::time::sleep(Duration::from_millis(args.pause_ms)).await;
    }
    pb.finish_and_clear();

    Ok(RunReport {
        mode: "async",
        callers: args.callers,
        rounds: args.rounds,
        ttl_ms: ttl.as_millis() as u64,
        upstream_calls: upstream.calls(),
        ok: tally.ok.load(Ordering::Relaxed),
        errors: tally.errors.load(Ordering::Relaxed),
        elapsed_ms: start.elapsed().as_millis() as u64,
        stats: cache.stats(),
    })
}

/// Print effective configuration
fn cmd_config(config: &CacheConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let requests = (report.callers * report.rounds) as u64;
    println!("\n{} ({})", "📈 Results:".green().bold(), report.mode);
    println!("   {} {}", "Requests:".dimmed(), requests);
    println!("   {} {}", "Upstream calls:".yellow(), report.upstream_calls);
    println!("   {} {} ok / {} failed", "Outcomes:".dimmed(), report.ok, report.errors);
    println!(
        "   {} {} hits, {} leaders, {} followers",
        "Cache:".dimmed(),
        report.stats.hits,
        report.stats.leaders,
        report.stats.followers
    );
    println!("   {} {:.1}%", "Deduplicated:".dimmed(), report.stats.dedup_ratio() * 100.0);
    println!("   {} {}ms", "Elapsed:".dimmed(), report.elapsed_ms);

    if report.upstream_calls <= report.rounds as u64 {
        println!("   {} At most one upstream call per burst", "✅".green());
    } else {
        println!(
            "   {} {} upstream calls over {} bursts (TTL lapses or failures)",
            "ℹ️ ".cyan(),
            report.upstream_calls,
            report.rounds
        );
    }

    Ok(())
}
