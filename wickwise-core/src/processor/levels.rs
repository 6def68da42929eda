//! Current-levels cache rebuilt after every processing pass.

use serde::{Deserialize, Serialize};

use crate::domain::Instrument;
use crate::processor::EnrichedBars;

/// The nearest support/resistance pair at the current bar and whether the
/// space between them is wide enough to trade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentLevels {
    pub min_resistance: Option<f64>,
    pub max_resistance: Option<f64>,
    pub max_support: Option<f64>,
    pub min_support: Option<f64>,
    pub trading_range_pips: Option<f64>,
    pub in_significant_range: bool,
    /// Max support when the range is significant.
    pub current_level_min: Option<f64>,
    /// Min resistance when the range is significant.
    pub current_level_max: Option<f64>,
    pub price_in_range: bool,
}

impl CurrentLevels {
    pub fn rebuild(table: &EnrichedBars, instrument: &Instrument, min_pips_for_range: f64) -> Self {
        let Some(row) = table.current() else {
            return Self::default();
        };
        let snap = &row.levels;
        let mut levels = Self {
            min_resistance: snap.min_resistance,
            max_resistance: snap.max_resistance,
            max_support: snap.max_support,
            min_support: snap.min_support,
            trading_range_pips: snap.trading_range_pips(instrument.pip_size),
            ..Self::default()
        };

        let significant = levels
            .trading_range_pips
            .is_some_and(|pips| pips >= min_pips_for_range);
        if significant {
            let (lo, hi) = (snap.max_support, snap.min_resistance);
            levels.in_significant_range = true;
            levels.current_level_min = lo;
            levels.current_level_max = hi;
            let close = row.bar.close;
            levels.price_in_range = matches!((lo, hi), (Some(lo), Some(hi)) if lo <= close && close <= hi);
        }
        levels
    }
}
