//! Intrabar policy: which level is assumed to trade first when a single
//! candle touches both the stop and the target.

use crate::domain::{Candle, Direction};

/// Level hit within a candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrabarHit {
    Stop,
    Target,
}

/// Intrabar ordering assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntrabarPolicy {
    /// Adversarial: the stop is checked before the target.
    #[default]
    StopFirst,
}

impl IntrabarPolicy {
    /// Resolve which level (if any) the candle hit.
    ///
    /// Long: stop when `low <= sl`, target when `high >= tp`.
    /// Short: stop when `high >= sl`, target when `low <= tp`.
    pub fn resolve(
        self,
        direction: Direction,
        candle: &Candle,
        sl_price: f64,
        tp_price: f64,
    ) -> Option<IntrabarHit> {
        let (stop_hit, target_hit) = match direction {
            Direction::Long => (candle.low <= sl_price, candle.high >= tp_price),
            Direction::Short => (candle.high >= sl_price, candle.low <= tp_price),
        };
        match self {
            IntrabarPolicy::StopFirst => {
                if stop_hit {
                    Some(IntrabarHit::Stop)
                } else if target_hit {
                    Some(IntrabarHit::Target)
                } else {
                    None
                }
            }
        }
    }
}
