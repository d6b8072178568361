//! Session tracking: per-trading-day Asian range, probe budget and the
//! bookkeeping the entry gates read.
//!
//! A trading day is keyed by the local date on which the Asian window ends,
//! so a range that opens in the evening survives midnight intact.

pub mod window;

pub use window::TimeWindow;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::StrategyConfig;
use crate::domain::{to_pips, Candle, Direction};

/// Asian-range progress is logged once every this many Asian candles.
pub const ASIAN_LOG_EVERY: u64 = 60;

/// Flat-state entry diagnostics are logged once every this many candles.
pub const ENTRY_LOG_EVERY: u64 = 20;

/// Per-trading-day state. Replaced wholesale when the trading day changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub session_date: NaiveDate,
    pub asian_high: Option<f64>,
    pub asian_low: Option<f64>,
    /// Cached at lock time; `None` until locked or when no Asian candle was seen.
    pub range_pips: Option<f64>,
    pub range_locked: bool,
    pub probes_used: u32,
    /// Set after a take-profit: no further entries this session.
    pub session_done: bool,
    pub last_failed_direction: Option<Direction>,
    pub last_failed_time: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(session_date: NaiveDate) -> Self {
        Self {
            session_date,
            asian_high: None,
            asian_low: None,
            range_pips: None,
            range_locked: false,
            probes_used: 0,
            session_done: false,
            last_failed_direction: None,
            last_failed_time: None,
        }
    }

    fn observe(&mut self, candle: &Candle) {
        self.asian_high = Some(match self.asian_high {
            Some(h) => h.max(candle.high),
            None => candle.high,
        });
        self.asian_low = Some(match self.asian_low {
            Some(l) => l.min(candle.low),
            None => candle.low,
        });
    }

    fn lock(&mut self, pip_value: f64) {
        self.range_locked = true;
        self.range_pips = match (self.asian_high, self.asian_low) {
            (Some(h), Some(l)) => Some(to_pips(h - l, pip_value)),
            _ => None,
        };
    }

    /// Locked range bounds, if the range is locked and has extrema.
    pub fn locked_range(&self) -> Option<(f64, f64)> {
        if !self.range_locked {
            return None;
        }
        Some((self.asian_high?, self.asian_low?))
    }

    /// Locked range bounds, only when the width lies in `[min_pips, max_pips]`.
    pub fn valid_range(&self, min_pips: f64, max_pips: f64) -> Option<(f64, f64)> {
        let pips = self.range_pips?;
        if pips < min_pips || pips > max_pips {
            return None;
        }
        self.locked_range()
    }

    pub fn record_probe(&mut self) -> u32 {
        self.probes_used += 1;
        self.probes_used
    }

    pub fn mark_done(&mut self) {
        self.session_done = true;
    }

    pub fn record_failure(&mut self, direction: Direction, at: DateTime<Utc>) {
        self.last_failed_direction = Some(direction);
        self.last_failed_time = Some(at);
    }
}

/// Throttle counters for diagnostic logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticCounters {
    pub asian_candles: u64,
    pub flat_candles: u64,
}

impl DiagnosticCounters {
    /// Count an Asian candle; true when progress should be logged.
    pub fn tick_asian(&mut self) -> bool {
        self.asian_candles += 1;
        self.asian_candles % ASIAN_LOG_EVERY == 0
    }

    /// Count a flat candle; true when entry diagnostics should be logged.
    pub fn tick_flat(&mut self) -> bool {
        self.flat_candles += 1;
        self.flat_candles % ENTRY_LOG_EVERY == 0
    }
}

/// What [`SessionTracker::refresh`] did for a candle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    /// The candle started a trading day different from the stored one.
    pub new_session: bool,
    /// The Asian range locked on this candle.
    pub locked: bool,
}

#[derive(Debug, Clone)]
pub struct SessionTracker {
    timezone: Tz,
    asian: TimeWindow,
    lock_until: NaiveTime,
    pip_value: f64,
    min_range_pips: f64,
    max_range_pips: f64,
    state: Option<SessionState>,
    counters: DiagnosticCounters,
}

impl SessionTracker {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            timezone: config.timezone,
            asian: config.asian_window(),
            lock_until: config.london_window_end,
            pip_value: config.pip_value,
            min_range_pips: config.min_asian_range_pips,
            max_range_pips: config.max_asian_range_pips,
            state: None,
            counters: DiagnosticCounters::default(),
        }
    }

    /// Feed one candle: roll the trading day if needed, grow the Asian
    /// range while it is open, and lock it once the window has passed.
    pub fn refresh(&mut self, candle: &Candle) -> SessionUpdate {
        let local = candle.time.with_timezone(&self.timezone);
        let day = self.asian.trading_day(&local);
        let t = local.time();

        let mut update = SessionUpdate::default();
        let rolled = self.state.as_ref().map_or(true, |s| s.session_date != day);
        if rolled {
            if let Some(prev) = &self.state {
                info!(
                    previous = %prev.session_date,
                    session = %day,
                    probes_used = prev.probes_used,
                    "new trading session"
                );
            } else {
                info!(session = %day, "first trading session");
            }
            self.state = Some(SessionState::new(day));
            self.counters = DiagnosticCounters::default();
            update.new_session = true;
        }

        let pip_value = self.pip_value;
        let (min, max) = (self.min_range_pips, self.max_range_pips);
        let Some(state) = self.state.as_mut() else {
            return update;
        };

        if state.range_locked {
            return update;
        }

        if self.asian.contains_half_open(t) {
            state.observe(candle);
            if self.counters.tick_asian() {
                debug!(
                    session = %state.session_date,
                    candles = self.counters.asian_candles,
                    high = ?state.asian_high,
                    low = ?state.asian_low,
                    "building asian range"
                );
            }
        } else if self.asian.has_ended(t) && t <= self.lock_until {
            state.lock(pip_value);
            update.locked = true;
            match state.range_pips {
                Some(pips) if (min..=max).contains(&pips) => info!(
                    session = %state.session_date,
                    high = ?state.asian_high,
                    low = ?state.asian_low,
                    range_pips = pips,
                    "asian range locked"
                ),
                Some(pips) => warn!(
                    session = %state.session_date,
                    range_pips = pips,
                    min_pips = min,
                    max_pips = max,
                    "asian range locked outside allowed bounds"
                ),
                None => warn!(
                    session = %state.session_date,
                    "asian range locked without any asian candles"
                ),
            }
        }

        update
    }

    /// True if the range is locked and its width is within the configured bounds.
    pub fn is_range_valid(&self) -> bool {
        self.state
            .as_ref()
            .and_then(|s| s.valid_range(self.min_range_pips, self.max_range_pips))
            .is_some()
    }

    pub fn state(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }

    pub fn state_mut(&mut self) -> Option<&mut SessionState> {
        self.state.as_mut()
    }

    pub fn counters_mut(&mut self) -> &mut DiagnosticCounters {
        &mut self.counters
    }

    pub fn counters(&self) -> DiagnosticCounters {
        self.counters
    }
}
