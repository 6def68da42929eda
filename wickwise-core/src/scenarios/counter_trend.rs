//! Counter trend: fade the breakout trend when a rejection candle closes
//! back through the previous bar's extreme.

use tracing::debug;

use crate::config::ScenarioConfig;
use crate::domain::Side;
use crate::indicators::TrendDirection;
use crate::processor::IndicatorProcessor;
use crate::scenarios::{last_rows, Scenario, ScenarioKind};
use crate::trade::TradeSetup;

#[derive(Debug, Clone)]
pub struct CounterTrend {
    side: Side,
    min_recent_move_pips: f64,
}

impl CounterTrend {
    pub fn new(side: Side, config: &ScenarioConfig) -> Self {
        Self {
            side,
            min_recent_move_pips: config.min_recent_move_pips,
        }
    }
}

impl Scenario for CounterTrend {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::CounterTrend
    }

    fn side(&self) -> Side {
        self.side
    }

    fn check(&self, processor: &IndicatorProcessor) -> Option<TradeSetup> {
        let [prev, current] = last_rows::<2>(processor)?;
        let (bar, c) = (&current.bar, &current.candle);

        let setup = match self.side {
            Side::Buy => {
                let recent_move = processor.pips(bar.low, prev.bar.high);
                let ok = recent_move >= self.min_recent_move_pips
                    && processor.trend() == TrendDirection::Down
                    && !c.no_top_wick
                    && !c.has_top_wick
                    && c.has_bottom_wick
                    && bar.close > prev.bar.high
                    && processor.is_in_significant_range();
                if !ok {
                    return None;
                }
                TradeSetup::buy(
                    Some(processor.stop_loss_price_down()?),
                    Some(processor.current_level_max()?),
                    "counter trend buy",
                )
            }
            Side::Sell => {
                let recent_move = processor.pips(bar.high, prev.bar.low);
                let ok = recent_move >= self.min_recent_move_pips
                    && processor.trend() == TrendDirection::Up
                    && !c.no_bottom_wick
                    && !c.has_bottom_wick
                    && c.has_top_wick
                    && bar.close < prev.bar.low
                    && processor.is_in_significant_range();
                if !ok {
                    return None;
                }
                TradeSetup::sell(
                    Some(processor.stop_loss_price_up()?),
                    Some(processor.current_level_min()?),
                    "counter trend sell",
                )
            }
        };
        debug!(scenario = %setup.comment, "setup detected");
        Some(setup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::indicators::assert_approx;
    use crate::scenarios::fixtures::{counter_buy, mirror, pip_bars, processed, trend_buy};

    fn scenario(side: Side) -> CounterTrend {
        CounterTrend::new(side, &ScenarioConfig::default())
    }

    #[test]
    fn rejection_candle_in_downtrend_buys() {
        let p = processed(&EngineConfig::default(), &counter_buy());
        assert_eq!(p.trend(), TrendDirection::Down);
        assert_approx(p.current_level_min().unwrap(), 1.1110, 1e-9);
        assert_approx(p.current_level_max().unwrap(), 1.1150, 1e-9);

        let setup = scenario(Side::Buy).check(&p).expect("setup");
        // body bottom 1.1110, 30% of a 10 pip wick, minus 10 pips
        assert_approx(setup.stop_loss.unwrap(), 1.1097, 1e-9);
        assert_approx(setup.take_profit.unwrap(), 1.1150, 1e-9);
    }

    #[test]
    fn mirrored_rejection_sells() {
        let p = processed(&EngineConfig::default(), &mirror(&counter_buy()));
        assert_eq!(p.trend(), TrendDirection::Up);
        let setup = scenario(Side::Sell).check(&p).expect("setup");
        assert_approx(setup.stop_loss.unwrap(), 2.2 - 1.1097, 1e-9);
        assert_approx(setup.take_profit.unwrap(), 2.2 - 1.1150, 1e-9);
    }

    #[test]
    fn uptrend_does_not_fade_upward() {
        // the trend-following fixture ends in an uptrend
        let p = processed(&EngineConfig::default(), &trend_buy());
        assert!(scenario(Side::Buy).check(&p).is_none());
    }

    #[test]
    fn small_recent_move_is_ignored() {
        let mut config = ScenarioConfig::default();
        config.min_recent_move_pips = 25.0;
        let p = processed(&EngineConfig::default(), &counter_buy());
        // low 1.1100 is 21 pips under the previous high
        assert!(CounterTrend::new(Side::Buy, &config).check(&p).is_none());
    }

    #[test]
    fn single_bar_is_not_enough() {
        let p = processed(&EngineConfig::default(), &pip_bars(&[(0, 10, -10, 5)]));
        assert!(scenario(Side::Buy).check(&p).is_none());
        assert!(scenario(Side::Sell).check(&p).is_none());
    }
}
