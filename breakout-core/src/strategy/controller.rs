//! Per-instrument strategy state machine.
//!
//! Two states: flat and open. Each candle runs, in order: history and
//! session refresh, the pre-news close gate, position management, and
//! (only when flat) the entry gates.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::breakout::BreakoutDetector;
use crate::config::StrategyConfig;
use crate::domain::{Action, Candle, Direction, ExitReason};
use crate::news::NewsAvoidanceWindow;
use crate::position_management::{PositionManager, PositionState};
use crate::session::{DiagnosticCounters, SessionState, SessionTracker};

/// First entry gate that failed on a flat candle.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryBlock {
    SessionDone,
    OutsideProbeWindow,
    ProbesExhausted { used: u32, max: u32 },
    InvalidRange { range_pips: Option<f64> },
    SpreadTooWide { spread_pips: f64, max_pips: f64 },
    News { reason: String },
    NoBreakout,
    SameDirectionAfterLoss(Direction),
    BeforeTradeWindow(Direction),
}

impl fmt::Display for EntryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryBlock::SessionDone => write!(f, "session done after take-profit"),
            EntryBlock::OutsideProbeWindow => write!(f, "outside london probe window"),
            EntryBlock::ProbesExhausted { used, max } => write!(f, "max probes reached ({used}/{max})"),
            EntryBlock::InvalidRange { range_pips: Some(p) } => write!(f, "asian range invalid ({p:.1} pips)"),
            EntryBlock::InvalidRange { range_pips: None } => write!(f, "asian range not available"),
            EntryBlock::SpreadTooWide { spread_pips, max_pips } => {
                write!(f, "spread too wide ({spread_pips:.1}/{max_pips:.1} pips)")
            }
            EntryBlock::News { reason } => write!(f, "news: {reason}"),
            EntryBlock::NoBreakout => write!(f, "no breakout"),
            EntryBlock::SameDirectionAfterLoss(d) => write!(f, "same-direction retry blocked after SL ({d})"),
            EntryBlock::BeforeTradeWindow(d) => write!(f, "{d} breakout before trade window; waiting"),
        }
    }
}

pub struct StrategyController {
    config: StrategyConfig,
    news: Option<Arc<NewsAvoidanceWindow>>,
    tracker: SessionTracker,
    detector: BreakoutDetector,
    positions: PositionManager,
    history: Vec<Candle>,
    history_cap: usize,
    last_block: Option<EntryBlock>,
}

impl fmt::Debug for StrategyController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyController")
            .field("asset_pair", &self.config.asset_pair)
            .field("session", &self.tracker.state())
            .field("position", &self.positions.position())
            .field("news", &self.news.is_some())
            .finish()
    }
}

impl StrategyController {
    pub fn new(config: StrategyConfig, news: Option<Arc<NewsAvoidanceWindow>>) -> Self {
        let history_cap = config.atr_period + 5;
        Self {
            tracker: SessionTracker::new(&config),
            detector: BreakoutDetector::new(&config),
            positions: PositionManager::new(&config),
            history: Vec::with_capacity(history_cap + 1),
            history_cap,
            last_block: None,
            news,
            config,
        }
    }

    /// Process one candle. Returns at most one action.
    ///
    /// `now` drives the news gates; the candle's own time drives sessions,
    /// the flatten cutoff and action timestamps.
    pub fn process_candle(
        &mut self,
        candle: &Candle,
        spread_pips: f64,
        now: DateTime<Utc>,
    ) -> Option<Action> {
        self.history.push(*candle);
        if self.history.len() > self.history_cap {
            let excess = self.history.len() - self.history_cap;
            self.history.drain(..excess);
        }

        let update = self.tracker.refresh(candle);
        if update.new_session {
            if let Some(stale) = self.positions.clear() {
                warn!(
                    direction = %stale.direction,
                    entry = stale.entry_price,
                    "position carried into a new session, clearing"
                );
            }
            self.last_block = None;
        }

        if self.positions.is_open() {
            if let Some(exit) = self.news_close(candle, now) {
                return Some(exit);
            }
            let session = self.tracker.state_mut()?;
            return self.positions.manage(candle, session);
        }

        match self.entry_direction(candle, spread_pips, now) {
            Ok(direction) => {
                self.last_block = None;
                let session = self.tracker.state_mut()?;
                Some(self.positions.enter(
                    direction,
                    candle.close,
                    &self.history,
                    session,
                    candle.time,
                ))
            }
            Err(block) => {
                if self.tracker.counters_mut().tick_flat() {
                    let local = candle.time.with_timezone(&self.config.timezone);
                    let state = self.tracker.state();
                    debug!(
                        local_time = %local.format("%H:%M"),
                        range_valid = self.tracker.is_range_valid(),
                        range_pips = ?state.and_then(|s| s.range_pips),
                        probes_used = state.map_or(0, |s| s.probes_used),
                        probe_max = self.config.probe_max_count,
                        spread_pips,
                        blocked_by = %block,
                        "entry check"
                    );
                }
                self.last_block = Some(block);
                None
            }
        }
    }

    fn news_gate_active(&self) -> Option<&NewsAvoidanceWindow> {
        if self.config.news_avoidance_enabled {
            self.news.as_deref()
        } else {
            None
        }
    }

    fn news_close(&mut self, candle: &Candle, now: DateTime<Utc>) -> Option<Action> {
        let decision = self
            .news_gate_active()?
            .should_close_positions(&self.config.asset_pair, now);
        if !decision.close_positions {
            return None;
        }
        info!(reason = %decision.reason, "closing position ahead of news");
        self.positions
            .close(candle.close, ExitReason::NewsClose, candle.time)
    }

    /// Run the entry gates in order, returning the breakout direction when
    /// every gate passes.
    fn entry_direction(
        &self,
        candle: &Candle,
        spread_pips: f64,
        now: DateTime<Utc>,
    ) -> Result<Direction, EntryBlock> {
        let session = self.tracker.state().ok_or(EntryBlock::OutsideProbeWindow)?;
        if session.session_done {
            return Err(EntryBlock::SessionDone);
        }

        let t = candle.time.with_timezone(&self.config.timezone).time();
        if !self.config.probe_window().contains(t) {
            return Err(EntryBlock::OutsideProbeWindow);
        }
        if session.probes_used >= self.config.probe_max_count {
            return Err(EntryBlock::ProbesExhausted {
                used: session.probes_used,
                max: self.config.probe_max_count,
            });
        }
        if !self.tracker.is_range_valid() {
            return Err(EntryBlock::InvalidRange {
                range_pips: session.range_pips,
            });
        }
        if spread_pips.is_nan() || spread_pips > self.config.max_spread_pips {
            return Err(EntryBlock::SpreadTooWide {
                spread_pips,
                max_pips: self.config.max_spread_pips,
            });
        }
        if let Some(news) = self.news_gate_active() {
            let decision = news.should_avoid_trading(&self.config.asset_pair, now);
            if decision.avoid_trading {
                return Err(EntryBlock::News {
                    reason: decision.reason,
                });
            }
        }
        let direction = self
            .detector
            .check(candle, session)
            .ok_or(EntryBlock::NoBreakout)?;
        if session.last_failed_direction == Some(direction) {
            return Err(EntryBlock::SameDirectionAfterLoss(direction));
        }
        if !self.config.trade_window().contains(t) {
            return Err(EntryBlock::BeforeTradeWindow(direction));
        }
        Ok(direction)
    }

    /// Record broker trade ids on the open position. Returns false when flat.
    pub fn attach_broker_trade_ids(&mut self, ids: Vec<String>) -> bool {
        self.positions.attach_broker_trade_ids(ids)
    }

    /// Force the core flat when authoritative broker data says the position
    /// is gone. Emits no action; returns the dropped position, if any.
    pub fn reconcile_flat(&mut self) -> Option<PositionState> {
        let dropped = self.positions.clear();
        if let Some(pos) = &dropped {
            info!(
                direction = %pos.direction,
                entry = pos.entry_price,
                "position reconciled flat"
            );
        }
        dropped
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&SessionState> {
        self.tracker.state()
    }

    pub fn position(&self) -> Option<&PositionState> {
        self.positions.position()
    }

    pub fn is_flat(&self) -> bool {
        !self.positions.is_open()
    }

    pub fn is_range_valid(&self) -> bool {
        self.tracker.is_range_valid()
    }

    pub fn counters(&self) -> DiagnosticCounters {
        self.tracker.counters()
    }

    /// Why the most recent flat candle did not enter, if it didn't.
    pub fn last_entry_block(&self) -> Option<&EntryBlock> {
        self.last_block.as_ref()
    }

    pub fn history(&self) -> &[Candle] {
        &self.history
    }
}
