/// Stop ratchet
///
/// **Core Rule:** a stop may tighten, never loosen.
///
/// Trailing tiers propose new stop levels; the ratchet decides whether the
/// proposal is accepted. Once a higher tier has moved the stop, a lower
/// tier's proposal can never pull it back.
use crate::domain::Direction;

/// Ratchet over a position's stop-loss level.
///
/// - Long positions: stop can only rise
/// - Short positions: stop can only fall
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatchetState {
    level: f64,
    direction: Direction,
}

impl RatchetState {
    /// Start the ratchet at the initial stop.
    pub fn new(direction: Direction, initial_level: f64) -> Self {
        Self {
            level: initial_level,
            direction,
        }
    }

    /// Offer a proposed stop level; returns the level after ratcheting.
    ///
    /// # Example
    /// ```
    /// use breakout_core::domain::Direction;
    /// use breakout_core::position_management::RatchetState;
    ///
    /// let mut ratchet = RatchetState::new(Direction::Long, 1.2636);
    ///
    /// // Tightening is accepted
    /// assert_eq!(ratchet.apply(1.2651), 1.2651);
    ///
    /// // Loosening is ignored
    /// assert_eq!(ratchet.apply(1.2640), 1.2651);
    /// ```
    pub fn apply(&mut self, proposed: f64) -> f64 {
        if proposed.is_nan() {
            return self.level;
        }
        self.level = match self.direction {
            Direction::Long => self.level.max(proposed),
            Direction::Short => self.level.min(proposed),
        };
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_tightening_allowed() {
        let mut ratchet = RatchetState::new(Direction::Long, 1.2636);
        assert_eq!(ratchet.apply(1.2651), 1.2651);
        assert_eq!(ratchet.apply(1.2640), 1.2651);
    }

    #[test]
    fn long_loosening_blocked() {
        let mut ratchet = RatchetState::new(Direction::Long, 1.2656);
        assert_eq!(ratchet.apply(1.2651), 1.2656);
    }

    #[test]
    fn short_tightening_allowed() {
        let mut ratchet = RatchetState::new(Direction::Short, 1.2615);
        assert_eq!(ratchet.apply(1.2600), 1.2600);
        assert_eq!(ratchet.apply(1.2590), 1.2590);
    }

    #[test]
    fn short_loosening_blocked() {
        let mut ratchet = RatchetState::new(Direction::Short, 1.2600);
        assert_eq!(ratchet.apply(1.2610), 1.2600);
    }

    #[test]
    fn nan_proposal_is_ignored() {
        let mut ratchet = RatchetState::new(Direction::Long, 1.2600);
        assert_eq!(ratchet.apply(f64::NAN), 1.2600);
    }

    #[test]
    fn lower_tier_cannot_undo_higher_tier() {
        // tier 3 moved the stop to entry + 2; a later tier-1 proposal (entry - 5) is ignored
        let entry = 1.2600;
        let mut ratchet = RatchetState::new(Direction::Long, entry - 0.0020);
        ratchet.apply(entry + 0.0002);
        assert_eq!(ratchet.apply(entry - 0.0005), entry + 0.0002);
    }
}
