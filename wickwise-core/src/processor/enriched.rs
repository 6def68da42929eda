//! The enriched bar table produced by one processing pass.

use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::domain::Bar;
use crate::fingerprint::Fingerprint;
use crate::indicators::{
    CandleFeatures, FreshWickLevels, LevelSnapshot, RangeState, RetracementStops, SessionLabel,
    SupertrendPoint, TrendDirection,
};

/// A bar plus every indicator-derived field at the same timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedBar {
    pub bar: Bar,
    pub session: Option<SessionLabel>,
    pub candle: CandleFeatures,
    pub levels: LevelSnapshot,
    pub supertrend: Option<SupertrendPoint>,
    /// Breakout trend detector label.
    pub trend: TrendDirection,
    pub range: RangeState,
    /// Rolling ATR from the fresh-wick stage.
    pub atr: Option<f64>,
    pub fresh_wicks: FreshWickLevels,
    pub stops: RetracementStops,
}

impl EnrichedBar {
    pub fn supertrend_direction(&self) -> TrendDirection {
        self.supertrend.map(|p| p.direction).unwrap_or_default()
    }

    pub fn session_allows_trading(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.trade_allowed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedBars {
    rows: Vec<EnrichedBar>,
}

impl EnrichedBars {
    pub(crate) fn new(rows: Vec<EnrichedBar>) -> Self {
        Self { rows }
    }

    /// Row `back` bars before the last one (0 = current bar).
    pub fn from_end(&self, back: usize) -> Option<&EnrichedBar> {
        self.rows.len().checked_sub(back + 1).and_then(|i| self.rows.get(i))
    }

    pub fn current(&self) -> Option<&EnrichedBar> {
        self.from_end(0)
    }

    pub fn previous(&self) -> Option<&EnrichedBar> {
        self.from_end(1)
    }

    pub fn fingerprint(&self) -> Result<Fingerprint, serde_json::Error> {
        Fingerprint::of(&self.rows)
    }
}

impl Deref for EnrichedBars {
    type Target = [EnrichedBar];

    fn deref(&self) -> &[EnrichedBar] {
        &self.rows
    }
}
