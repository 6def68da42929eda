//! Entry scenarios.
//!
//! A scenario is a pure check over the processed indicator state: when all
//! of its conditions hold it returns the `TradeSetup` to execute. The
//! `ScenarioManager` owns the catalogue, its evaluation order and the
//! one-trade-per-bar gate.

pub mod breakout;
pub mod counter_trend;
pub mod manager;
pub mod trend_following;

pub use breakout::Breakout;
pub use counter_trend::CounterTrend;
pub use manager::{BarState, ScenarioManager, ScenarioResult};
pub use trend_following::TrendFollowing;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Side;
use crate::processor::{EnrichedBar, IndicatorProcessor};
use crate::trade::TradeSetup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    TrendFollowing,
    CounterTrend,
    Breakout,
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioKind::TrendFollowing => write!(f, "trend following"),
            ScenarioKind::CounterTrend => write!(f, "counter trend"),
            ScenarioKind::Breakout => write!(f, "breakout"),
        }
    }
}

/// One independently evaluable entry rule.
pub trait Scenario: Send + Sync + fmt::Debug {
    fn kind(&self) -> ScenarioKind;

    fn side(&self) -> Side;

    /// Setup to execute when every condition holds at the current bar.
    fn check(&self, processor: &IndicatorProcessor) -> Option<TradeSetup>;
}

/// The last `N` rows, oldest first, or `None` with fewer bars.
pub(crate) fn last_rows<const N: usize>(processor: &IndicatorProcessor) -> Option<[&EnrichedBar; N]> {
    let table = processor.enriched();
    let start = table.len().checked_sub(N)?;
    let mut rows = [table.first()?; N];
    for (slot, row) in rows.iter_mut().zip(&table[start..]) {
        *slot = row;
    }
    Some(rows)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Bar fixtures written in pips above 1.1000 as (open, high, low, close).

    use crate::config::EngineConfig;
    use crate::domain::Bar;
    use crate::indicators::make_ohlc_bars;
    use crate::processor::IndicatorProcessor;

    pub fn pip_bars(data: &[(i32, i32, i32, i32)]) -> Vec<Bar> {
        let px = |p: i32| 1.1000 + f64::from(p) * 0.0001;
        let ohlc: Vec<_> = data.iter().map(|&(o, h, l, c)| (px(o), px(h), px(l), px(c))).collect();
        make_ohlc_bars(&ohlc)
    }

    /// Reflect prices around 1.1000 so every buy setup becomes its sell twin.
    pub fn mirror(bars: &[Bar]) -> Vec<Bar> {
        bars.iter()
            .map(|b| Bar {
                open: 2.2 - b.open,
                high: 2.2 - b.low,
                low: 2.2 - b.high,
                close: 2.2 - b.close,
                ..b.clone()
            })
            .collect()
    }

    pub fn processed(config: &EngineConfig, bars: &[Bar]) -> IndicatorProcessor {
        let mut p = IndicatorProcessor::new(config).unwrap();
        p.process(bars).unwrap();
        p
    }

    /// Uptrend pulling back inside a 35-pip support/resistance band, closing
    /// on a bullish candle after a bearish one.
    pub fn trend_buy() -> Vec<Bar> {
        pip_bars(&[
            (10, 12, -5, 0),
            (0, 25, -2, 20),
            (50, 52, 28, 30),
            (-10, 12, -12, 10),
            (60, 62, 38, 40),
            (15, 35, 10, 25),
        ])
    }

    /// Downtrend with a bullish rejection candle closing above the previous
    /// high, supports at 110/20/10 and resistances at 150/160.
    pub fn counter_buy() -> Vec<Bar> {
        pip_bars(&[
            (30, 31, 19, 20),
            (20, 42, 18, 40),
            (40, 41, 29, 30),
            (10, 36, 9, 35),
            (35, 152, 34, 150),
            (160, 162, 138, 140),
            (140, 145, 135, 140),
            (140, 149, 139, 148),
            (150, 151, 119, 120),
            (120, 121, 29, 30),
            (110, 126, 100, 125),
        ])
    }

    /// Close through resistance 155 from below support 120, with an untouched
    /// upper wick at 215. Needs `breakout_config`.
    pub fn breakout_buy() -> Vec<Bar> {
        pip_bars(&[
            (100, 112, 98, 110),
            (110, 215, 108, 115),
            (115, 116, 104, 105),
            (100, 113, 99, 112),
            (125, 126, 117, 118),
            (120, 136, 119, 135),
            (135, 166, 134, 165),
            (170, 171, 149, 150),
            (150, 151, 149, 150),
            (150, 154, 148, 153),
            (155, 156, 139, 140),
            (140, 142, 138, 140),
            (145, 162, 115, 158),
            (160, 177, 158, 175),
        ])
    }

    /// Wide break buffer so the broken-through level survives the close, and
    /// a one-bar ATR so fresh wicks exist on a short fixture.
    pub fn breakout_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.indicators.level_break_buffer_pips = 30.0;
        config.indicators.fresh_wick_atr_period = 1;
        config
    }
}
