//! Break and close: the previous bar pierced the band edge, the current bar
//! closes clear of it with room left before the next untouched wick.

use tracing::debug;

use crate::config::ScenarioConfig;
use crate::domain::Side;
use crate::processor::IndicatorProcessor;
use crate::scenarios::{last_rows, Scenario, ScenarioKind};
use crate::trade::TradeSetup;

#[derive(Debug, Clone)]
pub struct Breakout {
    side: Side,
    cfg: ScenarioConfig,
}

impl Breakout {
    pub fn new(side: Side, config: &ScenarioConfig) -> Self {
        Self {
            side,
            cfg: config.clone(),
        }
    }

    fn check_buy(&self, p: &IndicatorProcessor) -> Option<TradeSetup> {
        let [prev, current] = last_rows::<2>(p)?;
        let (bar, c) = (&current.bar, &current.candle);
        let level_min = p.current_level_min();

        if !(prev.bar.close > p.min_resistance()? && bar.close > level_min?) {
            return None;
        }
        if prev.bar.low > bar.close || c.bearish {
            return None;
        }
        let level_min = level_min?;
        let ok = !c.no_top_wick
            && !c.body_smaller
            && p.is_in_significant_range()
            && prev.bar.close > level_min
            && prev.bar.low < level_min
            && prev.bar.high < bar.close
            && p.pips(bar.close, p.max_support()?) <= self.cfg.max_pips_to_opposite_level
            && p.pips(bar.close, prev.bar.high) < self.cfg.max_pips_from_previous_extreme;
        if !ok {
            return None;
        }

        let take_profit = p.current_level_max()?;
        let stop = p.stop_loss_price_down()?;
        let wick = p.fresh_wicks().upper?;
        if p.pips(bar.close, wick) < self.cfg.min_wick_clearance_pips {
            return None;
        }
        let extra = p.instrument().pips_to_price(self.cfg.breakout_extra_sl_pips);
        Some(TradeSetup::buy(Some(stop - extra), Some(take_profit), "break and close buy"))
    }

    fn check_sell(&self, p: &IndicatorProcessor) -> Option<TradeSetup> {
        let [prev, current] = last_rows::<2>(p)?;
        let (bar, c) = (&current.bar, &current.candle);
        let level_max = p.current_level_max();

        if !(prev.bar.close < p.max_support()? && bar.close < level_max?) {
            return None;
        }
        if prev.bar.high < bar.close || c.bullish {
            return None;
        }
        let level_max = level_max?;
        let ok = !c.no_bottom_wick
            && !c.body_smaller
            && p.is_in_significant_range()
            && prev.bar.close < level_max
            && prev.bar.high > level_max
            && prev.bar.low > bar.close
            && p.pips(bar.close, p.min_resistance()?) <= self.cfg.max_pips_to_opposite_level
            && p.pips(bar.close, prev.bar.low) < self.cfg.max_pips_from_previous_extreme;
        if !ok {
            return None;
        }

        let take_profit = p.current_level_min()?;
        let stop = p.stop_loss_price_up()?;
        let wick = p.fresh_wicks().lower?;
        if p.pips(bar.close, wick) < self.cfg.min_wick_clearance_pips {
            return None;
        }
        let extra = p.instrument().pips_to_price(self.cfg.breakout_extra_sl_pips);
        Some(TradeSetup::sell(Some(stop + extra), Some(take_profit), "break and close sell"))
    }
}

impl Scenario for Breakout {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::Breakout
    }

    fn side(&self) -> Side {
        self.side
    }

    fn check(&self, processor: &IndicatorProcessor) -> Option<TradeSetup> {
        let setup = match self.side {
            Side::Buy => self.check_buy(processor),
            Side::Sell => self.check_sell(processor),
        }?;
        debug!(scenario = %setup.comment, "setup detected");
        Some(setup)
    }
}
