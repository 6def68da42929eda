//! Wick-retracement stop-loss anchors.
//!
//! Per candle: a point `percent` of the way into each wick, measured from the
//! body edge. Only wicks with nonzero size produce an anchor.

use serde::{Deserialize, Serialize};

use crate::indicators::CandleFeatures;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RetracementStops {
    /// Anchor inside the upper wick (sell-side stop).
    pub up: Option<f64>,
    /// Anchor inside the lower wick (buy-side stop).
    pub down: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Retracement {
    percent: f64,
}

impl Retracement {
    pub fn new(percent: f64) -> Self {
        Self { percent }
    }

    pub fn anchor(&self, candle: &CandleFeatures) -> RetracementStops {
        let fraction = self.percent / 100.0;
        RetracementStops {
            up: (candle.upper_wick > 0.0).then(|| candle.body_top + candle.upper_wick * fraction),
            down: (candle.lower_wick > 0.0).then(|| candle.body_bottom - candle.lower_wick * fraction),
        }
    }

    pub fn compute(&self, candles: &[CandleFeatures]) -> Vec<RetracementStops> {
        candles.iter().map(|c| self.anchor(c)).collect()
    }
}
