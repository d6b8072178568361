//! Breakout CLI — config checks, candle streaming, and news event commands.
//!
//! Commands:
//! - `config check` — load and validate a strategy config, print a summary
//! - `config init` — write the sample GBP/USD config to disk
//! - `stream` — feed candles through a controller, print actions as JSON lines
//! - `news list|add|remove|settings|check|upcoming` — administer the event store
//!
//! Logs go to stderr (filter with `RUST_LOG`, default `breakout=info`) so
//! stdout stays machine-readable. A `.env` file is honored for
//! `BREAKOUT_CONFIG` and `BREAKOUT_EVENTS`.

mod input;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use breakout_core::clock::{Clock, SystemClock};
use breakout_core::config::SAMPLE_CONFIG_TOML;
use breakout_core::news::{
    parse_timestamp, EventStore, Impact, JsonFileEventStore, NewEventRequest, NewsAvoidanceWindow,
    SettingsPatch,
};
use breakout_core::{StrategyConfig, StrategyController};

use input::{for_each_candle, InputFormat};

#[derive(Parser)]
#[command(
    name = "breakout",
    about = "Breakout CLI — Asian-range / London-open breakout decision engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Strategy config commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run candles through a strategy controller and print actions as JSON lines.
    Stream {
        /// Strategy config (TOML). Defaults to the built-in GBP/USD sample.
        #[arg(long, env = "BREAKOUT_CONFIG")]
        config: Option<PathBuf>,

        /// News event store (JSON). Without it news avoidance is inactive.
        #[arg(long, env = "BREAKOUT_EVENTS")]
        events: Option<PathBuf>,

        /// Candle input file. Reads stdin when omitted.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Input format.
        #[arg(long, value_enum, default_value = "jsonl")]
        format: InputFormat,

        /// Spread in pips for candles that carry no `spread` field.
        #[arg(long, default_value_t = 1.0)]
        spread: f64,
    },
    /// News event store commands.
    News {
        /// News event store (JSON). Created on first write.
        #[arg(long, env = "BREAKOUT_EVENTS", default_value = "data/news_events.json")]
        events: PathBuf,

        #[command(subcommand)]
        action: NewsAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Load and validate a config, then print the resolved settings.
    Check {
        /// Strategy config (TOML).
        #[arg(long, env = "BREAKOUT_CONFIG")]
        config: PathBuf,
    },
    /// Write the sample config.
    Init {
        /// Destination path.
        #[arg(long, default_value = "breakout.toml")]
        output: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum NewsAction {
    /// List stored events, oldest first.
    List,
    /// Add an event.
    Add {
        #[arg(long)]
        title: String,

        /// Currency code (e.g. USD).
        #[arg(long)]
        currency: String,

        /// Event time (ISO-8601; naive times are UTC).
        #[arg(long, value_parser = parse_at)]
        at: DateTime<Utc>,

        /// high, medium or low. Only high-impact events gate trading.
        #[arg(long, default_value = "high")]
        impact: Impact,
    },
    /// Remove an event by id.
    Remove { id: u64 },
    /// Show avoidance settings, updating any that are given.
    Settings {
        #[arg(long)]
        minutes_before: Option<u32>,

        #[arg(long)]
        minutes_after: Option<u32>,

        #[arg(long)]
        minutes_before_close: Option<u32>,

        #[arg(long)]
        enabled: Option<bool>,
    },
    /// Evaluate the entry and close gates for a pair.
    Check {
        /// Instrument, e.g. GBP_USD.
        #[arg(long, default_value = "GBP_USD")]
        pair: String,

        /// Evaluation time. Defaults to now.
        #[arg(long, value_parser = parse_at)]
        at: Option<DateTime<Utc>>,
    },
    /// High-impact events in the next few hours.
    Upcoming {
        #[arg(long, default_value_t = 24)]
        hours: u32,

        /// Only this currency.
        #[arg(long)]
        currency: Option<String>,

        /// Reference time. Defaults to now.
        #[arg(long, value_parser = parse_at)]
        at: Option<DateTime<Utc>>,
    },
}

fn parse_at(s: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(s).ok_or_else(|| format!("invalid timestamp '{s}'"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("breakout=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Check { config } => run_config_check(&config),
            ConfigAction::Init { output, force } => run_config_init(&output, force),
        },
        Commands::Stream {
            config,
            events,
            input,
            format,
            spread,
        } => run_stream(config.as_deref(), events.as_deref(), input.as_deref(), format, spread),
        Commands::News { events, action } => run_news(&events, action),
    }
}

// ── config ───────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<StrategyConfig> {
    match path {
        Some(path) => StrategyConfig::from_file(path)
            .with_context(|| format!("loading strategy config {}", path.display())),
        None => {
            info!("no config given, using the built-in GBP/USD sample");
            Ok(StrategyConfig::sample()?)
        }
    }
}

fn run_config_check(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    print_config(&config);
    Ok(())
}

fn run_config_init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists (pass --force to overwrite)",
            output.display()
        );
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, SAMPLE_CONFIG_TOML)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("Sample config written to: {}", output.display());
    Ok(())
}

fn print_config(config: &StrategyConfig) {
    let hm = |t: chrono::NaiveTime| t.format("%H:%M").to_string();
    println!();
    println!("=== Strategy Config ===");
    println!("Pair:           {}", config.asset_pair);
    println!("Timezone:       {}", config.timezone);
    println!(
        "Asian range:    {} - {}",
        hm(config.asian_start),
        hm(config.asian_end)
    );
    println!("Probe start:    {}", hm(config.london_probe_start));
    println!(
        "Trade window:   {} - {}",
        hm(config.london_window_start),
        hm(config.london_window_end)
    );
    println!(
        "Range pips:     {} - {}",
        config.min_asian_range_pips, config.max_asian_range_pips
    );
    println!("Buffer pips:    {}", config.breakout_buffer_pips);
    println!("Stop pips:      {}", config.initial_stop_pips);
    println!("ATR period:     {}", config.atr_period);
    println!("Max probes:     {}", config.probe_max_count);
    println!("Max spread:     {}", config.max_spread_pips);
    println!("Pip value:      {}", config.pip_value);
    println!("News avoidance: {}", config.news_avoidance_enabled);
    println!(
        "Flatten:        {} {}",
        hm(config.flatten.cutoff),
        config.flatten.timezone
    );
    println!();
    println!("--- ATR take-profit bands ---");
    for band in &config.atr_tp_bands {
        println!("  ATR <= {:<8} TP {} pips", band.max_atr_pips, band.tp_pips);
    }
    println!("--- Trailing tiers ---");
    for (i, tier) in config.trailing_tiers.iter().enumerate() {
        println!(
            "  {}: at +{} pips move stop to {:+} pips",
            i + 1,
            tier.trigger_pips,
            tier.sl_pips
        );
    }
    println!();
}

// ── stream ───────────────────────────────────────────────────────────

fn open_window(path: &Path) -> Result<Arc<NewsAvoidanceWindow>> {
    let store = JsonFileEventStore::open(path)
        .with_context(|| format!("opening news event store {}", path.display()))?;
    Ok(Arc::new(NewsAvoidanceWindow::new(Arc::new(store))))
}

fn run_stream(
    config_path: Option<&Path>,
    events: Option<&Path>,
    input: Option<&Path>,
    format: InputFormat,
    default_spread: f64,
) -> Result<()> {
    let config = load_config(config_path)?;
    let news = events.map(open_window).transpose()?;
    if config.news_avoidance_enabled && news.is_none() {
        warn!("news avoidance enabled but no event store given, entries are not news-gated");
    }
    let mut controller = StrategyController::new(config, news);

    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(std::io::stdin().lock())),
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut last_time: Option<DateTime<Utc>> = None;
    let mut out_of_order = 0usize;
    let mut actions = 0usize;

    let stats = for_each_candle(reader, format, |item| {
        let candle = item.candle;
        if last_time.is_some_and(|t| candle.time <= t) {
            out_of_order += 1;
            warn!(time = %candle.time, "skipping out-of-order candle");
            return Ok(());
        }
        last_time = Some(candle.time);

        let spread = item.spread_pips.unwrap_or(default_spread);
        // replay: decision time is the candle's own time
        if let Some(action) = controller.process_candle(&candle, spread, candle.time) {
            serde_json::to_writer(&mut out, &action)?;
            writeln!(out)?;
            actions += 1;
        }
        Ok(())
    })?;
    out.flush()?;

    info!(
        candles = stats.accepted,
        skipped = stats.skipped,
        out_of_order,
        actions,
        "stream finished"
    );
    Ok(())
}

// ── news ─────────────────────────────────────────────────────────────

fn run_news(path: &Path, action: NewsAction) -> Result<()> {
    let store = Arc::new(
        JsonFileEventStore::open(path)
            .with_context(|| format!("opening news event store {}", path.display()))?,
    );

    match action {
        NewsAction::List => {
            let snapshot = store.load_events()?;
            if snapshot.events.is_empty() {
                println!("No events in {}", path.display());
                return Ok(());
            }
            let mut events = snapshot.events.clone();
            events.sort_by_key(|e| e.event_time);
            println!(
                "{:>5} {:<22} {:<5} {:<7} Title",
                "Id", "Time (UTC)", "Ccy", "Impact"
            );
            println!("{}", "-".repeat(60));
            for e in &events {
                println!(
                    "{:>5} {:<22} {:<5} {:<7} {}",
                    e.id,
                    e.event_time.format("%Y-%m-%d %H:%M"),
                    e.currency,
                    e.impact,
                    e.title
                );
            }
            if snapshot.skipped > 0 {
                println!();
                println!("WARNING: {} malformed record(s) ignored", snapshot.skipped);
            }
        }
        NewsAction::Add {
            title,
            currency,
            at,
            impact,
        } => {
            let event = store.append(NewEventRequest {
                title,
                currency,
                event_time: at,
                impact,
            })?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        NewsAction::Remove { id } => {
            if !store.remove(id)? {
                bail!("no event with id {id}");
            }
            println!("Removed event {id}");
        }
        NewsAction::Settings {
            minutes_before,
            minutes_after,
            minutes_before_close,
            enabled,
        } => {
            let patch = SettingsPatch {
                minutes_before,
                minutes_after,
                minutes_before_close,
                enabled,
            };
            let settings = if patch.is_empty() {
                store.load_events()?.settings
            } else {
                store.update_settings(patch)?
            };
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        NewsAction::Check { pair, at } => {
            let now = at.unwrap_or_else(|| SystemClock.now());
            let window = NewsAvoidanceWindow::new(store);
            let report = serde_json::json!({
                "pair": pair,
                "now": now,
                "entry": window.should_avoid_trading(&pair, now),
                "close": window.should_close_positions(&pair, now),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        NewsAction::Upcoming {
            hours,
            currency,
            at,
        } => {
            let now = at.unwrap_or_else(|| SystemClock.now());
            let window = NewsAvoidanceWindow::new(store);
            let events = window.upcoming(now, hours, currency.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn news_add_parses_time_and_impact() {
        let cli = Cli::try_parse_from([
            "breakout",
            "news",
            "--events",
            "x.json",
            "add",
            "--title",
            "CPI",
            "--currency",
            "usd",
            "--at",
            "2025-11-20T13:30:00Z",
            "--impact",
            "Medium",
        ])
        .unwrap();
        let Commands::News { events, action } = cli.command else {
            panic!("expected news command");
        };
        assert_eq!(events, PathBuf::from("x.json"));
        match action {
            NewsAction::Add { at, impact, .. } => {
                assert_eq!(at, parse_timestamp("2025-11-20T13:30:00Z").unwrap());
                assert_eq!(impact, Impact::Medium);
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let result = Cli::try_parse_from([
            "breakout", "news", "check", "--at", "yesterday",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn config_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("breakout.toml");
        run_config_init(&path, false).unwrap();
        assert!(StrategyConfig::from_file(&path).is_ok());
        assert!(run_config_init(&path, false).is_err());
        run_config_init(&path, true).unwrap();
    }

    #[test]
    fn stream_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candles.jsonl");
        std::fs::write(
            &path,
            "{\"time\": \"2024-03-05T00:00:00Z\", \"open\": 1.26, \"high\": 1.2605, \"low\": 1.2595, \"close\": 1.26}\n",
        )
        .unwrap();
        run_stream(None, None, Some(&path), InputFormat::Jsonl, 1.0).unwrap();
    }
}
