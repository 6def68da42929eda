//! Fresh wick tracker.
//!
//! A wick larger than `ratio × ATR` (ATR at the wick's own candle) marks a
//! price level that stays fresh until a later bar's high (upper wick) or low
//! (lower wick) touches it. Per bar, only the most recent fresh level per
//! side is kept.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::indicators::Atr;
use crate::indicators::FeatureIndicator;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FreshWickLevels {
    pub upper: Option<f64>,
    pub lower: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct FreshWickOutput {
    /// Rolling ATR used for the wick threshold.
    pub atr: Vec<f64>,
    pub levels: Vec<FreshWickLevels>,
}

#[derive(Debug, Clone)]
pub struct FreshWicks {
    atr: Atr,
    atr_period: usize,
    ratio: f64,
    search: usize,
    name: String,
}

impl FreshWicks {
    pub fn new(atr_period: usize, ratio: f64, search: usize) -> Self {
        let atr_period = atr_period.max(1);
        Self {
            atr: Atr::new(atr_period),
            atr_period,
            ratio,
            search: search.max(1),
            name: format!("fresh_wicks_{atr_period}_{ratio}"),
        }
    }

    pub fn scan(&self, bars: &[Bar]) -> FreshWickOutput {
        let n = bars.len();
        let atr = self.atr.compute(bars);
        let mut levels = vec![FreshWickLevels::default(); n];

        for current in self.atr_period..n {
            // candle 0 never qualifies: its close is the only one not yet confirmed
            let first = current.saturating_sub(self.search).max(1);
            let mut highest_after = bars[current].high;
            let mut lowest_after = bars[current].low;
            let mut found = FreshWickLevels::default();

            for i in (first..current).rev() {
                let bar = &bars[i];
                if atr[i].is_finite() {
                    let threshold = atr[i] * self.ratio;
                    if found.upper.is_none() && bar.upper_wick() > threshold && highest_after < bar.high {
                        found.upper = Some(bar.high);
                    }
                    if found.lower.is_none() && bar.lower_wick() > threshold && lowest_after > bar.low {
                        found.lower = Some(bar.low);
                    }
                }
                if found.upper.is_some() && found.lower.is_some() {
                    break;
                }
                highest_after = highest_after.max(bar.high);
                lowest_after = lowest_after.min(bar.low);
            }
            levels[current] = found;
        }

        FreshWickOutput { atr, levels }
    }
}

impl FeatureIndicator for FreshWicks {
    type Output = FreshWickLevels;

    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.atr_period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<FreshWickLevels> {
        self.scan(bars).levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_ohlc_bars;

    /// Quiet 10-pip bars around 1.1000 with one long upper wick at `spike`.
    fn bars_with_spike(n: usize, spike: usize) -> Vec<Bar> {
        let data: Vec<(f64, f64, f64, f64)> = (0..n)
            .map(|i| {
                if i == spike {
                    (1.1000, 1.1060, 1.0995, 1.1005)
                } else {
                    (1.1000, 1.1008, 1.0992, 1.1002)
                }
            })
            .collect();
        make_ohlc_bars(&data)
    }

    #[test]
    fn untouched_upper_wick_is_fresh() {
        let bars = bars_with_spike(30, 22);
        let out = FreshWicks::new(5, 0.3, 100).scan(&bars);
        assert_eq!(out.levels[29].upper, Some(1.1060));
        // the spike bar itself is not reported until a later bar
        assert_eq!(out.levels[22].upper, None);
    }

    #[test]
    fn touched_wick_is_no_longer_fresh() {
        let mut bars = bars_with_spike(30, 22);
        bars[26].high = 1.1061;
        let out = FreshWicks::new(5, 0.3, 100).scan(&bars);
        assert_eq!(out.levels[25].upper, Some(1.1060));
        assert_ne!(out.levels[26].upper, Some(1.1060));
        assert_ne!(out.levels[29].upper, Some(1.1060));
    }

    #[test]
    fn nothing_before_atr_warm_up() {
        let bars = bars_with_spike(30, 2);
        let out = FreshWicks::new(20, 0.3, 100).scan(&bars);
        assert!(out.levels[..20].iter().all(|l| l.upper.is_none() && l.lower.is_none()));
    }

    #[test]
    fn most_recent_fresh_level_wins() {
        let mut bars = bars_with_spike(30, 20);
        // a lower second spike later on
        bars[24].high = 1.1040;
        let out = FreshWicks::new(5, 0.3, 100).scan(&bars);
        assert_eq!(out.levels[29].upper, Some(1.1040));
    }
}
