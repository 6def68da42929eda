//! Feature indicators.
//!
//! Each indicator is a stateless transform over a bar prefix: `compute`
//! returns one output per bar, with warm-up bars carrying an empty value
//! (NaN for raw numeric series, `None` for typed outputs). Stages that need
//! upstream results take them as explicit arguments instead of re-reading
//! shared state; the `processor` module wires them together.

pub mod atr;
pub mod candles;
pub mod fresh_wicks;
pub mod levels;
pub mod range;
pub mod retracement;
pub mod sessions;
pub mod supertrend;
pub mod trend;

pub use atr::Atr;
pub use candles::{CandleFeatures, CandlePatterns, DominantWick};
pub use fresh_wicks::{FreshWickLevels, FreshWicks};
pub use levels::{Level, LevelKind, LevelSnapshot, LevelTracker, LevelTrackerOutput};
pub use range::{RangeDetector, RangeOutput, RangeSpan, RangeState};
pub use retracement::{Retracement, RetracementStops};
pub use sessions::{SessionClassifier, SessionLabel};
pub use supertrend::{Supertrend, SupertrendPoint};
pub use trend::{TrendDetector, TrendDirection};

use crate::domain::Bar;

/// A bar-only feature series.
pub trait FeatureIndicator: Send + Sync {
    type Output: Clone;

    /// Unique name for this indicator instance (e.g. "atr_20").
    fn name(&self) -> &str;

    /// Bars needed before the first non-empty output.
    fn lookback(&self) -> usize;

    /// One output per input bar.
    fn compute(&self, bars: &[Bar]) -> Vec<Self::Output>;
}

/// Map NaN/infinite to `None`.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Create synthetic 15-minute bars from close prices for testing.
///
/// open = prev_close (or close for the first bar), high/low extend 5 pips
/// beyond the body.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: bar_time(i),
                open,
                high: open.max(close) + 0.0005,
                low: open.min(close) - 0.0005,
                close,
                volume: 1000,
            }
        })
        .collect()
}

/// Create 15-minute bars from (open, high, low, close) tuples.
#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar {
            timestamp: bar_time(i),
            open,
            high,
            low,
            close,
            volume: 1000,
        })
        .collect()
}

#[cfg(test)]
pub fn bar_time(i: usize) -> chrono::DateTime<chrono::Utc> {
    use chrono::TimeZone;
    chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + chrono::Duration::minutes(15 * i as i64)
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
