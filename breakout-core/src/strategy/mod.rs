//! Strategy controller: wires session tracking, breakout detection,
//! position management and news gating into one per-candle decision.

pub mod controller;

pub use controller::{EntryBlock, StrategyController};
