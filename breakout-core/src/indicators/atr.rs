//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR here is the simple mean of the most recent `period` true ranges, so
//! it needs `period + 1` candles (every TR needs a previous close).

use crate::domain::Candle;

/// ATR used when the history is too short, in pips.
pub const FALLBACK_ATR_PIPS: f64 = 6.0;

/// True Range of `candle` given the previous candle's close.
pub fn true_range(candle: &Candle, prev_close: f64) -> f64 {
    let h = candle.high;
    let l = candle.low;
    (h - l).max((h - prev_close).abs()).max((l - prev_close).abs())
}

/// Simple-mean ATR over the last `period` true ranges, in price units.
///
/// Returns `None` when fewer than `period + 1` candles are available or
/// any value in the lookback is NaN.
pub fn simple_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let tail = &candles[candles.len() - (period + 1)..];
    let sum: f64 = tail
        .windows(2)
        .map(|pair| true_range(&pair[1], pair[0].close))
        .sum();
    let atr = sum / period as f64;
    if atr.is_nan() {
        None
    } else {
        Some(atr)
    }
}

/// ATR in pips, falling back to [`FALLBACK_ATR_PIPS`] on short history.
pub fn atr_pips(candles: &[Candle], period: usize, pip_value: f64) -> f64 {
    simple_atr(candles, period)
        .map(|atr| atr / pip_value)
        .unwrap_or(FALLBACK_ATR_PIPS)
}
