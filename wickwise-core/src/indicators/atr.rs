//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|).
//! ATR is the simple rolling mean of TR over `period` bars, so the first
//! value appears at index `period - 1` (TR[0] is just high-low).

use crate::domain::Bar;
use crate::indicators::FeatureIndicator;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }
}

/// Compute the True Range series from bars.
/// TR[0] = high[0] - low[0] (no previous close).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = vec![f64::NAN; bars.len()];
    if bars.is_empty() {
        return tr;
    }

    tr[0] = bars[0].high - bars[0].low;
    for i in 1..bars.len() {
        let h = bars[i].high;
        let l = bars[i].low;
        let pc = bars[i - 1].close;
        tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
    }
    tr
}

/// Simple rolling mean. NaN until `period` values are available, and NaN
/// for any window containing a NaN.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    for end in (period - 1)..n {
        let window = &values[end + 1 - period..=end];
        if window.iter().all(|v| v.is_finite()) {
            result[end] = window.iter().sum::<f64>() / period as f64;
        }
    }
    result
}

impl FeatureIndicator for Atr {
    type Output = f64;

    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        rolling_mean(&true_range(bars), self.period)
    }
}
