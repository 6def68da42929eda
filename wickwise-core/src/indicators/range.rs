//! Consolidation range detector.
//!
//! A bar opens a range when the next `min_candles - 1` bars all stay inside
//! its high/low. The range stays active while bars remain inside and breaks
//! on the first bar whose high or low leaves the stored bounds. Only the
//! trailing `lookback` bars are scanned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::indicators::FeatureIndicator;

/// Range membership of a single bar.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RangeState {
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub in_range: bool,
    pub count: usize,
}

/// A contiguous run of in-range bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSpan {
    pub high: f64,
    pub low: f64,
    pub start_index: usize,
    pub end_index: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Still unbroken at the last bar.
    pub active: bool,
}

impl RangeSpan {
    pub fn bars(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    pub fn size_pips(&self, pip_size: f64) -> f64 {
        (self.high - self.low) / pip_size
    }
}

#[derive(Debug, Clone, Default)]
pub struct RangeOutput {
    pub states: Vec<RangeState>,
    /// Every range seen in the scanned window, oldest first.
    pub spans: Vec<RangeSpan>,
}

impl RangeOutput {
    /// The range still active at the last bar, if any.
    pub fn current(&self) -> Option<&RangeSpan> {
        self.spans.last().filter(|s| s.active)
    }

    /// Ranges lasting at least `min_bars` bars.
    pub fn ranges_at_least(&self, min_bars: usize) -> Vec<&RangeSpan> {
        self.spans.iter().filter(|s| s.bars() >= min_bars).collect()
    }
}

#[derive(Debug, Clone)]
pub struct RangeDetector {
    min_candles: usize,
    lookback: usize,
}

impl RangeDetector {
    pub fn new(min_candles: usize, lookback: usize) -> Self {
        Self {
            min_candles: min_candles.max(1),
            lookback: lookback.max(1),
        }
    }

    fn opens_range(&self, bars: &[Bar], index: usize) -> bool {
        if index + self.min_candles > bars.len() {
            return false;
        }
        let (high, low) = (bars[index].high, bars[index].low);
        bars[index + 1..index + self.min_candles]
            .iter()
            .all(|b| b.high <= high && b.low >= low)
    }

    pub fn detect(&self, bars: &[Bar]) -> RangeOutput {
        let n = bars.len();
        let mut out = RangeOutput {
            states: vec![RangeState::default(); n],
            spans: Vec::new(),
        };
        let mut current: Option<RangeSpan> = None;

        for i in n.saturating_sub(self.lookback)..n {
            let bar = &bars[i];
            match current.as_mut() {
                None => {
                    if self.opens_range(bars, i) {
                        current = Some(RangeSpan {
                            high: bar.high,
                            low: bar.low,
                            start_index: i,
                            end_index: i,
                            start_time: bar.timestamp,
                            end_time: bar.timestamp,
                            active: true,
                        });
                    }
                }
                Some(span) => {
                    if bar.high > span.high || bar.low < span.low {
                        span.active = false;
                        if let Some(done) = current.take() {
                            out.spans.push(done);
                        }
                        continue;
                    }
                    span.end_index = i;
                    span.end_time = bar.timestamp;
                }
            }

            if let Some(span) = current.as_ref() {
                out.states[i] = RangeState {
                    high: Some(span.high),
                    low: Some(span.low),
                    in_range: true,
                    count: span.bars(),
                };
            }
        }

        out.spans.extend(current);
        out
    }
}

impl FeatureIndicator for RangeDetector {
    type Output = RangeState;

    fn name(&self) -> &str {
        "range"
    }

    fn lookback(&self) -> usize {
        self.min_candles
    }

    fn compute(&self, bars: &[Bar]) -> Vec<RangeState> {
        self.detect(bars).states
    }
}
