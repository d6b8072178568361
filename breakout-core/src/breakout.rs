//! Breakout detection against the locked Asian range.

use crate::config::StrategyConfig;
use crate::domain::{Candle, Direction};
use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakoutDetector {
    buffer: f64,
    min_range_pips: f64,
    max_range_pips: f64,
}

impl BreakoutDetector {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            buffer: config.pips_to_price(config.breakout_buffer_pips),
            min_range_pips: config.min_asian_range_pips,
            max_range_pips: config.max_asian_range_pips,
        }
    }

    /// Breakout direction of `close` relative to `(high, low)`, if any.
    ///
    /// Long requires `close > high + buffer`, short `close < low - buffer`.
    /// Closing exactly on a boundary is not a breakout.
    pub fn direction(&self, close: f64, high: f64, low: f64) -> Option<Direction> {
        if close > high + self.buffer {
            Some(Direction::Long)
        } else if close < low - self.buffer {
            Some(Direction::Short)
        } else {
            None
        }
    }

    /// Check a candle against the session's range. Nothing breaks out of a
    /// range that is unlocked or outside the configured width bounds.
    pub fn check(&self, candle: &Candle, session: &SessionState) -> Option<Direction> {
        let (high, low) = session.valid_range(self.min_range_pips, self.max_range_pips)?;
        self.direction(candle.close, high, low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn detector() -> BreakoutDetector {
        BreakoutDetector::new(&StrategyConfig::sample().unwrap())
    }

    fn locked_session(high: f64, low: f64) -> SessionState {
        let mut s = SessionState::new(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        s.asian_high = Some(high);
        s.asian_low = Some(low);
        s.range_locked = true;
        s.range_pips = Some(crate::domain::to_pips(high - low, 0.0001));
        s
    }

    fn candle(close: f64) -> Candle {
        Candle {
            time: Utc.with_ymd_and_hms(2024, 3, 5, 7, 30, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
        }
    }

    #[test]
    fn long_breakout_above_buffer() {
        let s = locked_session(1.2650, 1.2600);
        assert_eq!(detector().check(&candle(1.2656), &s), Some(Direction::Long));
    }

    #[test]
    fn short_breakout_below_buffer() {
        let s = locked_session(1.2650, 1.2600);
        assert_eq!(detector().check(&candle(1.2595), &s), Some(Direction::Short));
    }

    #[test]
    fn inside_buffer_is_not_a_breakout() {
        let s = locked_session(1.2650, 1.2600);
        assert_eq!(detector().check(&candle(1.2651), &s), None);
        assert_eq!(detector().check(&candle(1.2625), &s), None);
        assert_eq!(detector().check(&candle(1.2599), &s), None);
    }

    #[test]
    fn range_outside_width_bounds_never_breaks_out() {
        // 10 pips is below the 20-pip minimum, 90 above the 80-pip maximum
        let narrow = locked_session(1.2610, 1.2600);
        assert_eq!(detector().check(&candle(1.2700), &narrow), None);
        let wide = locked_session(1.2690, 1.2600);
        assert_eq!(detector().check(&candle(1.2800), &wide), None);
    }

    #[test]
    fn width_bounds_are_inclusive() {
        let at_min = locked_session(1.2620, 1.2600);
        assert_eq!(detector().check(&candle(1.2623), &at_min), Some(Direction::Long));
        let at_max = locked_session(1.2680, 1.2600);
        assert_eq!(detector().check(&candle(1.2597), &at_max), Some(Direction::Short));
    }

    #[test]
    fn unlocked_range_never_breaks_out() {
        let mut s = locked_session(1.2650, 1.2600);
        s.range_locked = false;
        assert_eq!(detector().check(&candle(1.3000), &s), None);
    }
}
