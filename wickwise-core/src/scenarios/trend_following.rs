//! Trend following: enter with the breakout trend on the first candle that
//! resumes it after a pullback.

use tracing::debug;

use crate::domain::Side;
use crate::indicators::TrendDirection;
use crate::processor::IndicatorProcessor;
use crate::scenarios::{last_rows, Scenario, ScenarioKind};
use crate::trade::TradeSetup;

#[derive(Debug, Clone)]
pub struct TrendFollowing {
    side: Side,
}

impl TrendFollowing {
    pub fn buy() -> Self {
        Self { side: Side::Buy }
    }

    pub fn sell() -> Self {
        Self { side: Side::Sell }
    }
}

impl Scenario for TrendFollowing {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::TrendFollowing
    }

    fn side(&self) -> Side {
        self.side
    }

    fn check(&self, processor: &IndicatorProcessor) -> Option<TradeSetup> {
        let [second_prev, prev, current] = last_rows::<3>(processor)?;
        let (c, p, pp) = (&current.candle, &prev.candle, &second_prev.candle);

        let setup = match self.side {
            Side::Buy => {
                let resumes = c.bullish && (p.bearish || pp.bearish);
                let ok = processor.trend() == TrendDirection::Up
                    && processor.is_in_significant_range()
                    && resumes
                    && !c.no_top_wick;
                if !ok {
                    return None;
                }
                TradeSetup::buy(
                    Some(processor.stop_loss_price_down()?),
                    Some(processor.current_level_max()?),
                    "follow trend buy",
                )
            }
            Side::Sell => {
                let resumes = c.bearish && (p.bullish || pp.bullish);
                let ok = processor.trend() == TrendDirection::Down
                    && processor.is_in_significant_range()
                    && resumes
                    && !c.no_bottom_wick;
                if !ok {
                    return None;
                }
                TradeSetup::sell(
                    Some(processor.stop_loss_price_up()?),
                    Some(processor.current_level_min()?),
                    "follow trend sell",
                )
            }
        };
        debug!(scenario = %setup.comment, "setup detected");
        Some(setup)
    }
}
