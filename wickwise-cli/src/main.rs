//! Wickwise CLI — replay bar files through the decision engine.
//!
//! Commands:
//! - `run` — step the trading system over a CSV bar file, emit events as JSON lines
//! - `synthetic` — write a deterministic random-walk bar file
//! - `check-config` — validate a TOML config and print the effective values

mod bars;

use anyhow::{bail, Context, Result};
use chrono::{Duration, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wickwise_core::synthetic::random_walk_bars;
use wickwise_core::{EngineConfig, StepReport, TradingSystem};

#[derive(Parser)]
#[command(name = "wickwise", about = "Wickwise CLI — candlestick decision engine replay")]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a bar file through the trading system.
    Run {
        /// CSV with timestamp,open,high,low,close,volume columns.
        #[arg(long)]
        bars: PathBuf,

        /// TOML config. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bars loaded before the first step.
        #[arg(long, default_value_t = 50)]
        warmup: usize,

        /// Feed only the last N bars to each step.
        #[arg(long)]
        window: Option<usize>,

        /// Write events as JSON lines here instead of stdout.
        #[arg(long)]
        events: Option<PathBuf>,
    },
    /// Write a deterministic random-walk bar file.
    Synthetic {
        #[arg(long, default_value_t = 2000)]
        count: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Bar spacing in minutes.
        #[arg(long, default_value_t = 15)]
        interval: i64,

        #[arg(long)]
        output: PathBuf,
    },
    /// Validate a TOML config and print the effective configuration.
    CheckConfig { path: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            bars,
            config,
            warmup,
            window,
            events,
        } => run_replay(&bars, config.as_deref(), warmup, window, events.as_deref()),
        Commands::Synthetic {
            count,
            seed,
            interval,
            output,
        } => run_synthetic(count, seed, interval, &output),
        Commands::CheckConfig { path } => run_check_config(&path),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path).with_context(|| format!("load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn run_replay(
    bars_path: &Path,
    config_path: Option<&Path>,
    warmup: usize,
    window: Option<usize>,
    events_path: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let bars = bars::read_bars(bars_path)?;
    if warmup > bars.len() {
        bail!("warmup of {warmup} bars exceeds the {} bars in {}", bars.len(), bars_path.display());
    }
    if window == Some(0) {
        bail!("--window must be at least 1");
    }
    info!(bars = bars.len(), symbol = %config.instrument.symbol, "replay starting");

    let mut out: Box<dyn Write> = match events_path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut system = TradingSystem::new(config)?;
    let mut steps = 0usize;
    let mut event_count = 0usize;
    for end in warmup.max(1)..=bars.len() {
        let start = window.map_or(0, |w| end.saturating_sub(w));
        let report = system
            .on_bar(&bars[start..end])
            .with_context(|| format!("step at {}", bars[end - 1].timestamp))?;
        event_count += write_events(&mut out, &report)?;
        steps += 1;
    }
    out.flush()?;
    drop(out);

    print_summary(&system, steps, event_count);
    Ok(())
}

fn write_events(out: &mut dyn Write, report: &StepReport) -> Result<usize> {
    for event in &report.events {
        serde_json::to_writer(&mut *out, event)?;
        writeln!(out)?;
    }
    Ok(report.events.len())
}

fn print_summary(system: &TradingSystem, steps: usize, events: usize) {
    let risk = system.risk_manager();
    let history = risk.history();
    let realized: f64 = history.iter().map(|r| r.net_profit()).sum();
    let winners = history.iter().filter(|r| r.is_winner()).count();
    let snapshot = risk.get_daily_stats();

    eprintln!();
    eprintln!("=== Replay Summary ===");
    eprintln!("Steps:            {steps}");
    eprintln!("Events:           {events}");
    eprintln!("Positions opened: {}", system.trade_manager().next_ticket().0 - wickwise_core::Ticket::FIRST.0);
    eprintln!("Closes recorded:  {} ({winners} winning)", history.len());
    eprintln!("Realized P&L:     {realized:.2}");
    eprintln!("Open positions:   {}", system.trade_manager().open_count());
    if let Some(date) = snapshot.date {
        eprintln!(
            "Day {date}:   profit {:.2}, loss {:.2}, net {:.2}, trading {}",
            snapshot.profit,
            snapshot.loss,
            snapshot.net,
            if snapshot.trading_allowed { "allowed" } else { "restricted" }
        );
    }
    if let Some(reason) = snapshot.restricted_reason {
        eprintln!("Restricted:       {reason}");
    }
}

fn run_synthetic(count: usize, seed: u64, interval: i64, output: &Path) -> Result<()> {
    if interval <= 0 {
        bail!("--interval must be positive");
    }
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().context("start timestamp")?;
    let bars = random_walk_bars(seed, start, count, Duration::minutes(interval));
    bars::write_bars(output, &bars)?;
    println!("Wrote {count} bars to {}", output.display());
    Ok(())
}

fn run_check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    print!("{}", config.to_toml()?);
    Ok(())
}
