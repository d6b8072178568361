//! Candle input for `breakout stream`: JSON lines or CSV.
//!
//! Both formats carry the same fields: `time, open, high, low, close`, an
//! optional `volume` and an optional per-candle `spread` in pips. Records
//! that fail to parse are skipped with a warning instead of aborting the run.

use anyhow::{Context, Result};
use breakout_core::news::parse_timestamp;
use breakout_core::Candle;
use serde::Deserialize;
use std::io::BufRead;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InputFormat {
    /// One JSON object per line.
    Jsonl,
    /// Header row, then one candle per row.
    Csv,
}

/// Raw record. `time` stays a string so a bad stamp skips the record.
#[derive(Debug, Deserialize)]
struct CandleRecord {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<u64>,
    #[serde(default)]
    spread: Option<f64>,
}

/// A parsed candle and the spread it was quoted with, if the input had one.
#[derive(Debug, Clone, PartialEq)]
pub struct InputCandle {
    pub candle: Candle,
    pub spread_pips: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub accepted: usize,
    pub skipped: usize,
}

impl CandleRecord {
    fn into_input(self) -> Result<InputCandle, String> {
        let time = parse_timestamp(&self.time)
            .ok_or_else(|| format!("malformed timestamp '{}'", self.time))?;
        let candle = Candle {
            time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume.unwrap_or(0),
        };
        if !candle.is_sane() {
            return Err(format!(
                "inconsistent OHLC o={} h={} l={} c={}",
                candle.open, candle.high, candle.low, candle.close
            ));
        }
        Ok(InputCandle {
            candle,
            spread_pips: self.spread,
        })
    }
}

/// Feed every valid candle from `reader` to `sink`, in input order.
///
/// Errors returned by `sink` and I/O errors abort the read; bad records do not.
pub fn for_each_candle<R, F>(reader: R, format: InputFormat, mut sink: F) -> Result<ReadStats>
where
    R: BufRead,
    F: FnMut(InputCandle) -> Result<()>,
{
    let mut stats = ReadStats::default();
    let mut accept = |line: usize, parsed: Result<InputCandle, String>| -> Result<()> {
        match parsed {
            Ok(item) => {
                stats.accepted += 1;
                sink(item)
            }
            Err(reason) => {
                stats.skipped += 1;
                warn!(line, %reason, "skipping candle record");
                Ok(())
            }
        }
    };

    match format {
        InputFormat::Jsonl => {
            for (idx, line) in reader.lines().enumerate() {
                let line = line.context("reading candle input")?;
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let parsed = serde_json::from_str::<CandleRecord>(line)
                    .map_err(|e| e.to_string())
                    .and_then(CandleRecord::into_input);
                accept(idx + 1, parsed)?;
            }
        }
        InputFormat::Csv => {
            let mut rdr = csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .flexible(true)
                .from_reader(reader);
            for (idx, record) in rdr.deserialize::<CandleRecord>().enumerate() {
                // header is line 1
                let line = idx + 2;
                let parsed = match record {
                    Ok(rec) => rec.into_input(),
                    Err(e) if e.is_io_error() => {
                        return Err(e).context("reading candle input");
                    }
                    Err(e) => Err(e.to_string()),
                };
                accept(line, parsed)?;
            }
        }
    }
    Ok(stats)
}
