//! Candle pattern classifier: body/wick geometry and wick flags per bar.

use serde::{Deserialize, Serialize};

use crate::config::CandleConfig;
use crate::domain::Bar;
use crate::indicators::FeatureIndicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DominantWick {
    Top,
    Bottom,
    #[default]
    None,
}

/// Per-bar candle geometry and pattern flags.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CandleFeatures {
    pub body: f64,
    pub body_top: f64,
    pub body_bottom: f64,
    pub upper_wick: f64,
    pub lower_wick: f64,
    pub bullish: bool,
    pub bearish: bool,
    pub has_top_wick: bool,
    pub has_bottom_wick: bool,
    pub has_large_top_wick: bool,
    pub has_large_bottom_wick: bool,
    pub no_top_wick: bool,
    pub no_bottom_wick: bool,
    pub body_bigger: bool,
    pub body_smaller: bool,
    pub dominant_wick: DominantWick,
    pub top_exhaustion: bool,
    pub bottom_exhaustion: bool,
}

impl CandleFeatures {
    /// No significant wick on either side and no "wickless" side either.
    pub fn is_healthy(&self) -> bool {
        !self.has_top_wick && !self.has_bottom_wick && !self.no_top_wick && !self.no_bottom_wick
    }
}

#[derive(Debug, Clone)]
pub struct CandlePatterns {
    config: CandleConfig,
    pip_size: f64,
}

impl CandlePatterns {
    pub fn new(config: CandleConfig, pip_size: f64) -> Self {
        Self { config, pip_size }
    }

    fn classify(&self, bar: &Bar) -> CandleFeatures {
        let body = bar.body();
        let upper = bar.upper_wick();
        let lower = bar.lower_wick();
        let min_wick = self.config.min_wick_pips * self.pip_size;
        let no_wick = self.config.no_wick_pips * self.pip_size;
        let ratio = self.config.body_to_wick_ratio;
        let large = self.config.large_wick_ratio;

        let has_top_wick = upper >= min_wick && upper > body * ratio;
        let has_bottom_wick = lower >= min_wick && lower > body * ratio;
        let dominant_wick = match (has_top_wick, has_bottom_wick) {
            (true, false) => DominantWick::Top,
            (false, true) => DominantWick::Bottom,
            (true, true) if upper > lower => DominantWick::Top,
            (true, true) => DominantWick::Bottom,
            (false, false) => DominantWick::None,
        };

        CandleFeatures {
            body,
            body_top: bar.body_top(),
            body_bottom: bar.body_bottom(),
            upper_wick: upper,
            lower_wick: lower,
            bullish: bar.is_bullish(),
            bearish: bar.is_bearish(),
            has_top_wick,
            has_bottom_wick,
            has_large_top_wick: upper >= min_wick && upper > body * large,
            has_large_bottom_wick: lower >= min_wick && lower > body * large,
            no_top_wick: upper <= no_wick,
            no_bottom_wick: lower <= no_wick,
            dominant_wick,
            ..CandleFeatures::default()
        }
    }
}

impl FeatureIndicator for CandlePatterns {
    type Output = CandleFeatures;

    fn name(&self) -> &str {
        "candle_patterns"
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<CandleFeatures> {
        let window = self.config.exhaustion_window;
        let mut out: Vec<CandleFeatures> = bars.iter().map(|b| self.classify(b)).collect();

        for i in 1..out.len() {
            let prev_body = out[i - 1].body;
            out[i].body_bigger = out[i].body > prev_body;
            out[i].body_smaller = out[i].body < prev_body;

            if i >= window {
                let prior = &bars[i - window..i];
                let rolling_high = prior.iter().map(|b| b.high).fold(f64::MIN, f64::max);
                let rolling_low = prior.iter().map(|b| b.low).fold(f64::MAX, f64::min);
                out[i].top_exhaustion = out[i].has_large_top_wick && bars[i].high >= rolling_high;
                out[i].bottom_exhaustion = out[i].has_large_bottom_wick && bars[i].low <= rolling_low;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_ohlc_bars, DEFAULT_EPSILON};

    fn patterns() -> CandlePatterns {
        CandlePatterns::new(CandleConfig::default(), 0.0001)
    }

    #[test]
    fn shooting_star_has_top_wick() {
        // 5 pip body, 20 pip upper wick, 1 pip lower wick
        let bars = make_ohlc_bars(&[(1.1000, 1.1025, 1.0999, 1.1005)]);
        let c = patterns().compute(&bars)[0];
        assert!(c.bullish);
        assert!(c.has_top_wick);
        assert!(c.has_large_top_wick);
        assert!(!c.has_bottom_wick);
        assert!(!c.no_top_wick);
        assert!(!c.no_bottom_wick);
        assert_eq!(c.dominant_wick, DominantWick::Top);
        assert_approx(c.upper_wick, 0.0020, DEFAULT_EPSILON);
    }

    #[test]
    fn marubozu_has_no_wicks() {
        let bars = make_ohlc_bars(&[(1.1000, 1.1030, 1.1000, 1.1030)]);
        let c = patterns().compute(&bars)[0];
        assert!(c.no_top_wick);
        assert!(c.no_bottom_wick);
        assert!(!c.has_top_wick);
        assert!(!c.is_healthy());
        assert_eq!(c.dominant_wick, DominantWick::None);
    }

    #[test]
    fn small_wicks_on_big_body_are_healthy() {
        // 30 pip body, 3 pip wicks: above the no-wick threshold, below min wick
        let bars = make_ohlc_bars(&[(1.1000, 1.1033, 1.0997, 1.1030)]);
        let c = patterns().compute(&bars)[0];
        assert!(c.is_healthy());
    }

    #[test]
    fn body_comparison_uses_previous_bar() {
        let bars = make_ohlc_bars(&[
            (1.1000, 1.1025, 1.0995, 1.1020),
            (1.1020, 1.1050, 1.1015, 1.1045),
            (1.1045, 1.1050, 1.1030, 1.1040),
        ]);
        let c = patterns().compute(&bars);
        assert!(!c[0].body_bigger && !c[0].body_smaller);
        assert!(c[1].body_bigger);
        assert!(c[2].body_smaller);
    }

    #[test]
    fn top_exhaustion_at_rolling_high() {
        let mut data: Vec<(f64, f64, f64, f64)> = (0..20)
            .map(|i| {
                let base = 1.1000 + i as f64 * 0.0001;
                (base, base + 0.0005, base - 0.0005, base + 0.0001)
            })
            .collect();
        // new high with a long upper wick
        data.push((1.1020, 1.1060, 1.1019, 1.1022));
        let bars = make_ohlc_bars(&data);
        let c = patterns().compute(&bars);
        assert!(c[20].top_exhaustion);
        assert!(!c[20].bottom_exhaustion);
        assert!(!c[19].top_exhaustion);
    }
}
