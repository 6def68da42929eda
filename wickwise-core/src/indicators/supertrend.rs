//! SuperTrend — ATR-banded trend line.
//!
//! Inherently sequential: final bands ratchet (upper only moves down, lower
//! only moves up) until price closes through them, and the direction flips
//! when the close crosses the opposite band.
//!
//! Lookback: period (first bar with a valid rolling ATR).
//!
//! Output: the active band — final lower band when trending up, final upper
//! band when trending down.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::indicators::atr::{rolling_mean, true_range};
use crate::indicators::{FeatureIndicator, TrendDirection};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupertrendPoint {
    pub atr: f64,
    pub upper_band: f64,
    pub lower_band: f64,
    pub value: f64,
    pub direction: TrendDirection,
    /// Direction differs from the previous bar's.
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct Supertrend {
    period: usize,
    multiplier: f64,
    name: String,
}

impl Supertrend {
    pub fn new(period: usize, multiplier: f64) -> Self {
        let period = period.max(1);
        Self {
            period,
            multiplier,
            name: format!("supertrend_{period}_{multiplier}"),
        }
    }
}

impl FeatureIndicator for Supertrend {
    type Output = Option<SupertrendPoint>;

    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<Option<SupertrendPoint>> {
        let n = bars.len();
        let mut result = vec![None; n];
        let atr = rolling_mean(&true_range(bars), self.period);

        let start = match atr.iter().position(|v| v.is_finite()) {
            Some(idx) => idx,
            None => return result,
        };

        let hl2 = bars[start].hl2();
        let mut upper = hl2 + self.multiplier * atr[start];
        let mut lower = hl2 - self.multiplier * atr[start];
        let mut trending_up = true;
        result[start] = Some(SupertrendPoint {
            atr: atr[start],
            upper_band: upper,
            lower_band: lower,
            value: lower,
            direction: TrendDirection::Up,
            changed: false,
        });

        for i in (start + 1)..n {
            if !atr[i].is_finite() {
                continue;
            }
            let hl2 = bars[i].hl2();
            let basic_upper = hl2 + self.multiplier * atr[i];
            let basic_lower = hl2 - self.multiplier * atr[i];
            let prev_close = bars[i - 1].close;

            upper = if basic_upper < upper || prev_close > upper {
                basic_upper
            } else {
                upper
            };
            lower = if basic_lower > lower || prev_close < lower {
                basic_lower
            } else {
                lower
            };

            let was_up = trending_up;
            let close = bars[i].close;
            if trending_up && close <= lower {
                trending_up = false;
            } else if !trending_up && close >= upper {
                trending_up = true;
            }

            result[i] = Some(SupertrendPoint {
                atr: atr[i],
                upper_band: upper,
                lower_band: lower,
                value: if trending_up { lower } else { upper },
                direction: if trending_up {
                    TrendDirection::Up
                } else {
                    TrendDirection::Down
                },
                changed: was_up != trending_up,
            });
        }

        result
    }
}
