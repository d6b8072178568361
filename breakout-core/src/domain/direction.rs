use serde::{Deserialize, Serialize};
use std::fmt;

/// Price distance in pips, snapped to the tenth-pip quote grid.
///
/// Raw division leaves float noise (0.0010 / 0.0001 is 9.999999999998899),
/// which breaks inclusive comparisons against whole-pip thresholds.
pub fn to_pips(distance: f64, pip_value: f64) -> f64 {
    (distance / pip_value * 10.0).round() / 10.0
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Pips moved in favor of a position opened at `entry`, given `price`.
    ///
    /// Negative when the price moved against the position. Snapped to
    /// tenths of a pip like every other pip distance.
    pub fn favorable_pips(self, entry: f64, price: f64, pip_value: f64) -> f64 {
        to_pips(self.sign() * (price - entry), pip_value)
    }

    /// Price that sits `pips` in favor of `entry` (negative pips = against).
    pub fn offset(self, entry: f64, pips: f64, pip_value: f64) -> f64 {
        entry + self.sign() * pips * pip_value
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}
