//! Bar — one OHLCV sample at a fixed timeframe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar stamped with its open time (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// Returns true if any OHLC field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite() && self.high.is_finite() && self.low.is_finite() && self.close.is_finite())
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn body_top(&self) -> f64 {
        self.open.max(self.close)
    }

    pub fn body_bottom(&self) -> f64 {
        self.open.min(self.close)
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.body_top()
    }

    pub fn lower_wick(&self) -> f64 {
        self.body_bottom() - self.low
    }

    /// Midpoint of the bar's range.
    pub fn hl2(&self) -> f64 {
        (self.high + self.low) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_bar() -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap(),
            open: 1.1000,
            high: 1.1050,
            low: 1.0980,
            close: 1.1030,
            volume: 1_200,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_high_below_low_is_insane() {
        let mut bar = sample_bar();
        bar.high = 1.0970;
        assert!(!bar.is_sane());
    }

    #[test]
    fn nan_bar_is_void() {
        let mut bar = sample_bar();
        bar.close = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn wick_geometry() {
        let bar = sample_bar();
        assert!(bar.is_bullish());
        assert!((bar.body() - 0.0030).abs() < 1e-12);
        assert!((bar.upper_wick() - 0.0020).abs() < 1e-12);
        assert!((bar.lower_wick() - 0.0020).abs() < 1e-12);
        assert!((bar.hl2() - 1.1015).abs() < 1e-12);
    }
}
