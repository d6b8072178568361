//! Indicators computed from the bounded candle history.

pub mod atr;

pub use atr::{atr_pips, simple_atr, true_range, FALLBACK_ATR_PIPS};
