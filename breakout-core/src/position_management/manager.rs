/// Position lifecycle: entry sizing of stop/target, tiered trailing,
/// intrabar hit detection and the exchange-time flatten.
///
/// The manager owns at most one open position. Every exit clears it, and
/// every action it returns is advisory for the execution layer.
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::{StrategyConfig, TrailTier};
use crate::domain::{Action, Candle, Direction, EnterAction, ExitAction, ExitReason, UpdateSlAction};
use crate::indicators::atr_pips;
use crate::position_management::path_policy::{IntrabarHit, IntrabarPolicy};
use crate::position_management::ratchet::RatchetState;
use crate::session::SessionState;

/// Quantize a price to tenths of a pip (the broker's quote precision).
pub fn quantize(price: f64, pip_value: f64) -> f64 {
    let scale = (10.0 / pip_value).round();
    (price * scale).round() / scale
}

/// The open position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionState {
    pub direction: Direction,
    pub entry_price: f64,
    pub sl_price: f64,
    pub tp_price: f64,
    pub max_favorable_pips: f64,
    pub opened_at: DateTime<Utc>,
    pub probe_number: u32,
    /// Opaque broker trade ids, filled in by the execution layer after a fill.
    pub broker_trade_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PositionManager {
    config: StrategyConfig,
    policy: IntrabarPolicy,
    position: Option<PositionState>,
    ratchet: Option<RatchetState>,
}

impl PositionManager {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            config: config.clone(),
            policy: IntrabarPolicy::default(),
            position: None,
            ratchet: None,
        }
    }

    pub fn position(&self) -> Option<&PositionState> {
        self.position.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.position.is_some()
    }

    /// Open a position at `price`.
    ///
    /// The target distance comes from the ATR band table; short history
    /// falls back to a fixed ATR. Consumes one probe from `session`.
    pub fn enter(
        &mut self,
        direction: Direction,
        price: f64,
        history: &[Candle],
        session: &mut SessionState,
        at: DateTime<Utc>,
    ) -> Action {
        let pip = self.config.pip_value;
        let atr = atr_pips(history, self.config.atr_period, pip);
        let tp_pips = self.config.take_profit_pips(atr);

        let sl_price = quantize(direction.offset(price, -self.config.initial_stop_pips, pip), pip);
        let tp_price = quantize(direction.offset(price, tp_pips, pip), pip);
        let probe_number = session.record_probe();

        info!(
            %direction,
            entry = price,
            sl = sl_price,
            tp = tp_price,
            atr_pips = atr,
            tp_pips,
            probe = probe_number,
            "enter"
        );

        self.position = Some(PositionState {
            direction,
            entry_price: price,
            sl_price,
            tp_price,
            max_favorable_pips: 0.0,
            opened_at: at,
            probe_number,
            broker_trade_ids: Vec::new(),
        });
        self.ratchet = Some(RatchetState::new(direction, sl_price));

        Action::Enter(EnterAction {
            direction,
            entry_price: price,
            sl_price,
            tp_price,
            probe_number,
            timestamp: at,
        })
    }

    /// True once `candle` is at or past the exchange-time flatten cutoff.
    pub fn is_past_flatten(&self, candle: &Candle) -> bool {
        let rule = &self.config.flatten;
        candle.time.with_timezone(&rule.timezone).time() >= rule.cutoff
    }

    /// Manage the open position against one candle.
    ///
    /// Order: flatten cutoff, favorable excursion, trailing tiers, intrabar
    /// hit detection, then a stop update if the stop moved.
    pub fn manage(&mut self, candle: &Candle, session: &mut SessionState) -> Option<Action> {
        if self.position.is_none() {
            return None;
        }

        if self.is_past_flatten(candle) {
            return self.close(candle.close, ExitReason::LondonCloseFlat, candle.time);
        }

        let pip = self.config.pip_value;
        let tiers = self.config.trailing_tiers;
        let policy = self.policy;
        let pos = self.position.as_mut()?;
        let ratchet = self.ratchet.get_or_insert(RatchetState::new(pos.direction, pos.sl_price));

        let extreme = match pos.direction {
            Direction::Long => candle.high,
            Direction::Short => candle.low,
        };
        let excursion = pos.direction.favorable_pips(pos.entry_price, extreme, pip);
        if excursion > pos.max_favorable_pips {
            pos.max_favorable_pips = excursion;
        }

        let previous_sl = pos.sl_price;
        apply_tiers(&tiers, pos, ratchet, pip);
        let sl_moved = pos.sl_price != previous_sl;
        if sl_moved {
            info!(
                direction = %pos.direction,
                from = previous_sl,
                to = pos.sl_price,
                max_favorable_pips = pos.max_favorable_pips,
                "trailing stop ratcheted"
            );
        }

        match policy.resolve(pos.direction, candle, pos.sl_price, pos.tp_price) {
            Some(IntrabarHit::Stop) => {
                let (direction, level) = (pos.direction, pos.sl_price);
                session.record_failure(direction, candle.time);
                self.close(level, ExitReason::SlHit, candle.time)
            }
            Some(IntrabarHit::Target) => {
                let level = pos.tp_price;
                session.mark_done();
                self.close(level, ExitReason::TpHit, candle.time)
            }
            None if sl_moved => Some(Action::UpdateSl(UpdateSlAction {
                sl_price: pos.sl_price,
                max_favorable_pips: pos.max_favorable_pips,
                timestamp: candle.time,
            })),
            None => None,
        }
    }

    /// Close the open position at `price`. Returns `None` when already flat,
    /// which makes repeated closes idempotent.
    pub fn close(
        &mut self,
        price: f64,
        reason: ExitReason,
        at: DateTime<Utc>,
    ) -> Option<Action> {
        let pos = self.position.take()?;
        self.ratchet = None;
        let pnl_pips = pos
            .direction
            .favorable_pips(pos.entry_price, price, self.config.pip_value);
        info!(
            direction = %pos.direction,
            exit = price,
            pnl_pips,
            reason = ?reason,
            "exit"
        );
        Some(Action::Exit(ExitAction {
            exit_price: price,
            exit_reason: reason,
            pnl_pips,
            timestamp: at,
        }))
    }

    /// Drop the position without emitting an action.
    pub fn clear(&mut self) -> Option<PositionState> {
        self.ratchet = None;
        self.position.take()
    }

    pub fn attach_broker_trade_ids(&mut self, ids: Vec<String>) -> bool {
        match self.position.as_mut() {
            Some(pos) => {
                pos.broker_trade_ids = ids;
                true
            }
            None => false,
        }
    }
}

/// Apply every tier whose trigger the excursion has reached, lowest first.
fn apply_tiers(tiers: &[TrailTier], pos: &mut PositionState, ratchet: &mut RatchetState, pip: f64) {
    for tier in tiers {
        if pos.max_favorable_pips >= tier.trigger_pips {
            let proposed = quantize(pos.direction.offset(pos.entry_price, tier.sl_pips, pip), pip);
            pos.sl_price = ratchet.apply(proposed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};

    const PIP: f64 = 0.0001;

    fn config() -> StrategyConfig {
        StrategyConfig::sample().unwrap()
    }

    fn session() -> SessionState {
        SessionState::new(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
    }

    /// 03:00 New York on 2024-03-05 plus `minutes`.
    fn at(minutes: i64) -> DateTime<Utc> {
        chrono_tz::America::New_York
            .with_ymd_and_hms(2024, 3, 5, 3, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
            + Duration::minutes(minutes)
    }

    fn candle(minutes: i64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            time: at(minutes),
            open: close,
            high,
            low,
            close,
            volume: 0,
        }
    }

    /// 15 candles of 20-pip true range: ATR 20 selects the 25-pip target.
    fn wide_history() -> Vec<Candle> {
        (0..15)
            .map(|i| candle(-15 * (15 - i), 1.2610, 1.2590, 1.2600))
            .collect()
    }

    /// Long at 1.2600, stop 1.2580, target 1.2625.
    fn open_long(pm: &mut PositionManager, s: &mut SessionState) {
        pm.enter(Direction::Long, 1.2600, &wide_history(), s, at(0));
    }

    #[test]
    fn enter_uses_fallback_atr_band() {
        let mut pm = PositionManager::new(&config());
        let mut s = session();
        let action = pm.enter(Direction::Long, 1.2656, &[], &mut s, at(0));
        let Action::Enter(enter) = action else {
            panic!("expected ENTER");
        };
        // 6-pip fallback ATR selects the 15-pip band
        assert_eq!(enter.tp_price, 1.2671);
        assert_eq!(enter.sl_price, 1.2636);
        assert_eq!(enter.probe_number, 1);
        assert_eq!(s.probes_used, 1);
        assert!(pm.is_open());
    }

    #[test]
    fn short_entry_levels_mirror_long() {
        let mut pm = PositionManager::new(&config());
        let mut s = session();
        let Action::Enter(enter) = pm.enter(Direction::Short, 1.2595, &[], &mut s, at(0)) else {
            panic!("expected ENTER");
        };
        assert_eq!(enter.sl_price, 1.2615);
        assert_eq!(enter.tp_price, 1.2580);
    }

    #[test]
    fn tier_one_moves_stop_and_emits_update() {
        let mut pm = PositionManager::new(&config());
        let mut s = session();
        open_long(&mut pm, &mut s);
        // +12 pips: tier 1 (10 pips -> entry - 5)
        let action = pm.manage(&candle(15, 1.2612, 1.2605, 1.2610), &mut s);
        match action {
            Some(Action::UpdateSl(u)) => {
                assert_eq!(u.sl_price, 1.2595);
                assert!((u.max_favorable_pips - 12.0).abs() < 1e-6);
            }
            other => panic!("expected UPDATE_SL, got {other:?}"),
        }
        // no further movement: nothing to report
        assert_eq!(pm.manage(&candle(30, 1.2611, 1.2605, 1.2608), &mut s), None);
    }

    #[test]
    fn exact_whole_pip_move_meets_tier_trigger() {
        for entry in [1.2600, 1.2656, 1.3000, 1.2713, 1.1] {
            let mut pm = PositionManager::new(&config());
            let mut s = session();
            pm.enter(Direction::Long, entry, &[], &mut s, at(0));
            // exactly +10.0 pips
            let action = pm.manage(&candle(15, entry + 0.0010, entry + 0.0002, entry + 0.0005), &mut s);
            let Some(Action::UpdateSl(u)) = action else {
                panic!("entry {entry}: expected UPDATE_SL, got {action:?}");
            };
            assert_eq!(u.max_favorable_pips, 10.0);
            assert_eq!(u.sl_price, quantize(entry - 0.0005, PIP));
        }
    }

    #[test]
    fn all_met_tiers_apply_in_one_candle() {
        let mut pm = PositionManager::new(&config());
        let mut s = session();
        open_long(&mut pm, &mut s);
        // +21 pips at once: tiers 1..3 all met, tier 3 wins (entry + 2)
        let action = pm.manage(&candle(15, 1.2621, 1.2610, 1.2615), &mut s);
        let Some(Action::UpdateSl(u)) = action else {
            panic!("expected UPDATE_SL, got {action:?}");
        };
        assert_eq!(u.sl_price, 1.2602);
    }

    #[test]
    fn sl_hit_at_exact_level_records_failure() {
        let mut pm = PositionManager::new(&config());
        let mut s = session();
        open_long(&mut pm, &mut s);
        pm.manage(&candle(15, 1.2621, 1.2610, 1.2615), &mut s);
        // low above the stop: nothing
        assert_eq!(pm.manage(&candle(30, 1.2610, 1.2603, 1.2605), &mut s), None);
        // low exactly at the stop: SL_HIT
        let exit = pm.manage(&candle(45, 1.2608, 1.2602, 1.2604), &mut s).unwrap();
        let Action::Exit(e) = exit else { panic!("expected EXIT") };
        assert_eq!(e.exit_reason, ExitReason::SlHit);
        assert_eq!(e.exit_price, 1.2602);
        assert!((e.pnl_pips - 2.0).abs() < 1e-6);
        assert_eq!(s.last_failed_direction, Some(Direction::Long));
        assert_eq!(s.last_failed_time, Some(at(45)));
        assert!(!pm.is_open());
    }

    #[test]
    fn tp_hit_marks_session_done() {
        let mut pm = PositionManager::new(&config());
        let mut s = session();
        open_long(&mut pm, &mut s);
        let exit = pm.manage(&candle(15, 1.2625, 1.2610, 1.2620), &mut s).unwrap();
        assert_eq!(exit.exit_reason(), Some(ExitReason::TpHit));
        let Action::Exit(e) = exit else { unreachable!() };
        assert_eq!(e.exit_price, 1.2625);
        assert!((e.pnl_pips - 25.0).abs() < 1e-6);
        assert!(s.session_done);
        assert_eq!(s.last_failed_direction, None);
    }

    #[test]
    fn stop_wins_same_candle_tie() {
        let mut pm = PositionManager::new(&config());
        let mut s = session();
        open_long(&mut pm, &mut s);
        // touches both 1.2580 (stop) and 1.2625 (target)
        let exit = pm.manage(&candle(15, 1.2630, 1.2575, 1.2600), &mut s).unwrap();
        assert_eq!(exit.exit_reason(), Some(ExitReason::SlHit));
        assert!(!s.session_done);
    }

    #[test]
    fn flatten_at_noon_new_york_uses_close() {
        let mut pm = PositionManager::new(&config());
        let mut s = session();
        open_long(&mut pm, &mut s);
        // 12:00 New York = 9 hours after 03:00
        let noon = candle(9 * 60, 1.2700, 1.2500, 1.2607);
        assert!(pm.is_past_flatten(&noon));
        let exit = pm.manage(&noon, &mut s).unwrap();
        let Action::Exit(e) = exit else { panic!("expected EXIT") };
        assert_eq!(e.exit_reason, ExitReason::LondonCloseFlat);
        assert_eq!(e.exit_price, 1.2607);
        assert!((e.pnl_pips - 7.0).abs() < 1e-6);
        // already flat: idempotent
        assert_eq!(pm.manage(&candle(9 * 60 + 15, 1.27, 1.25, 1.26), &mut s), None);
        assert_eq!(pm.close(1.26, ExitReason::LondonCloseFlat, at(600)), None);
    }

    #[test]
    fn quantize_snaps_to_tenth_pip() {
        assert_eq!(quantize(1.2600 + 2.0 * PIP, PIP), 1.2602);
        assert_eq!(quantize(1.260_204_9, PIP), 1.2602);
        assert_eq!(quantize(1.260_205_1, PIP), 1.26021);
    }

    #[test]
    fn broker_ids_attach_only_when_open() {
        let mut pm = PositionManager::new(&config());
        let mut s = session();
        assert!(!pm.attach_broker_trade_ids(vec!["1".into()]));
        open_long(&mut pm, &mut s);
        assert!(pm.attach_broker_trade_ids(vec!["101".into(), "102".into()]));
        assert_eq!(pm.position().unwrap().broker_trade_ids, vec!["101", "102"]);
    }
}
