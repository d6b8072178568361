//! Breakout Core — candle-driven decision engine for an Asian-range /
//! London-open breakout strategy.
//!
//! This crate contains:
//! - Domain types (candles, directions, actions)
//! - Validated strategy configuration loaded from TOML
//! - Session tracking with a midnight-safe trading-day key
//! - Breakout detection against the locked range
//! - Position management with a three-tier ratcheting trailing stop
//! - News avoidance over a pluggable event store
//! - The per-instrument strategy controller
//!
//! Nothing here places orders. Actions are advisory and the execution
//! layer reports back through the controller's reconciliation hooks.

pub mod breakout;
pub mod clock;
pub mod config;
pub mod domain;
pub mod indicators;
pub mod news;
pub mod position_management;
pub mod session;
pub mod strategy;

pub use config::{ConfigError, StrategyConfig};
pub use domain::{Action, Candle, Direction, ExitReason};
pub use strategy::StrategyController;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: core types are Send + Sync.
    ///
    /// One controller runs per instrument, possibly on its own thread, and
    /// they all share a single news window.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Candle>();
        require_sync::<domain::Candle>();
        require_send::<domain::Action>();
        require_sync::<domain::Action>();
        require_send::<domain::Direction>();
        require_sync::<domain::Direction>();

        // Config
        require_send::<config::StrategyConfig>();
        require_sync::<config::StrategyConfig>();

        // Engine components
        require_send::<session::SessionTracker>();
        require_sync::<session::SessionTracker>();
        require_send::<breakout::BreakoutDetector>();
        require_sync::<breakout::BreakoutDetector>();
        require_send::<position_management::PositionManager>();
        require_sync::<position_management::PositionManager>();
        require_send::<strategy::StrategyController>();
        require_sync::<strategy::StrategyController>();

        // News
        require_send::<news::NewsAvoidanceWindow>();
        require_sync::<news::NewsAvoidanceWindow>();
        require_send::<news::InMemoryEventStore>();
        require_sync::<news::InMemoryEventStore>();
        require_send::<news::JsonFileEventStore>();
        require_sync::<news::JsonFileEventStore>();
        require_send::<std::sync::Arc<dyn news::EventStore>>();
        require_sync::<std::sync::Arc<dyn news::EventStore>>();

        // Clocks
        require_send::<clock::SystemClock>();
        require_sync::<clock::SystemClock>();
        require_send::<clock::FixedClock>();
        require_sync::<clock::FixedClock>();
    }

    /// Architecture contract: the controller's decision entry point takes
    /// `now` explicitly and has no clock parameter or field.
    #[test]
    fn process_candle_takes_explicit_now() {
        fn _check_signature(
            controller: &mut StrategyController,
            candle: &Candle,
            now: chrono::DateTime<chrono::Utc>,
        ) -> Option<Action> {
            controller.process_candle(candle, 1.0, now)
        }
    }
}
