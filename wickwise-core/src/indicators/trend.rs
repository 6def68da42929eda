//! Breakout trend detector.
//!
//! Keeps a single active resistance and support (the most recent two-candle
//! reversal, priced at the first candle's open). A close above the active
//! resistance flips the trend up, a close below the active support flips it
//! down; otherwise the previous trend holds. Starts with no trend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Side};
use crate::indicators::FeatureIndicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    #[default]
    None,
}

impl TrendDirection {
    /// True when the trend points against a trade on `side`.
    pub fn opposes(self, side: Side) -> bool {
        matches!(
            (self, side),
            (TrendDirection::Down, Side::Buy) | (TrendDirection::Up, Side::Sell)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveLevel {
    pub price: f64,
    pub set_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct TrendTrack {
    pub directions: Vec<TrendDirection>,
    pub resistance: Option<ActiveLevel>,
    pub support: Option<ActiveLevel>,
}

#[derive(Debug, Clone)]
pub struct TrendDetector {
    window: usize,
}

impl TrendDetector {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn track(&self, bars: &[Bar]) -> TrendTrack {
        let n = bars.len();
        let mut out = TrendTrack {
            directions: vec![TrendDirection::None; n],
            ..TrendTrack::default()
        };

        let mut trend = TrendDirection::None;
        for i in n.saturating_sub(self.window)..n {
            let curr = &bars[i];
            if i >= 1 {
                let prev = &bars[i - 1];
                if prev.is_bullish() && curr.is_bearish() {
                    out.resistance = Some(ActiveLevel {
                        price: prev.open,
                        set_at: curr.timestamp,
                    });
                }
                if prev.is_bearish() && curr.is_bullish() {
                    out.support = Some(ActiveLevel {
                        price: prev.open,
                        set_at: curr.timestamp,
                    });
                }
            }

            if let Some(breakout) = breakout(curr, out.resistance, out.support) {
                trend = breakout;
            }
            out.directions[i] = trend;
        }
        out
    }
}

fn breakout(bar: &Bar, resistance: Option<ActiveLevel>, support: Option<ActiveLevel>) -> Option<TrendDirection> {
    if let Some(r) = resistance {
        if bar.timestamp > r.set_at && bar.close > r.price {
            return Some(TrendDirection::Up);
        }
    }
    if let Some(s) = support {
        if bar.timestamp > s.set_at && bar.close < s.price {
            return Some(TrendDirection::Down);
        }
    }
    None
}

impl FeatureIndicator for TrendDetector {
    type Output = TrendDirection;

    fn name(&self) -> &str {
        "trend_detector"
    }

    fn lookback(&self) -> usize {
        3
    }

    fn compute(&self, bars: &[Bar]) -> Vec<TrendDirection> {
        self.track(bars).directions
    }
}
