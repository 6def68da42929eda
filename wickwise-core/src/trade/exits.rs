//! Exit management for open positions.
//!
//! Called once per processing step, after indicators are current. Positions
//! opened on the current bar are left alone by the bar-based exits.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::{EngineEvent, ExitFlags, Position, Side, StopChangeReason, Ticket};
use crate::error::EngineError;
use crate::processor::{EnrichedBar, IndicatorProcessor};
use crate::risk::RiskManager;
use crate::trade::manager::{EarlyExit, OpenRequest};
use crate::trade::TradeManager;

impl TradeManager {
    /// Protective stop and target hits inside the current bar, stop first.
    pub fn check_stops_and_targets(
        &mut self,
        processor: &IndicatorProcessor,
        risk: &mut RiskManager,
    ) -> Result<usize, EngineError> {
        let bar = &processor.current_bar().ok_or(EngineError::NotProcessed)?.bar;
        let now = bar.timestamp;

        let mut hits = Vec::new();
        for pos in self.positions.values().filter(|p| p.open_time < now) {
            let stop = pos.stop_loss();
            let hit = match pos.side {
                Side::Buy if bar.low <= stop => Some((stop, "stop loss")),
                Side::Buy if bar.high >= pos.take_profit => Some((pos.take_profit, "take profit")),
                Side::Sell if bar.high >= stop => Some((stop, "stop loss")),
                Side::Sell if bar.low <= pos.take_profit => Some((pos.take_profit, "take profit")),
                _ => None,
            };
            if let Some((price, reason)) = hit {
                hits.push((pos.ticket, price, reason));
            }
        }

        for (ticket, price, reason) in &hits {
            self.close_position_at(*ticket, *price, now, reason, risk)?;
        }
        Ok(hits.len())
    }

    /// Partial closes, breakeven and trailing stop, in that order per position.
    pub fn manage_open_positions(
        &mut self,
        price: Option<f64>,
        processor: &IndicatorProcessor,
        risk: &mut RiskManager,
    ) -> Result<(), EngineError> {
        let current = processor.current_bar().ok_or(EngineError::NotProcessed)?;
        let now = current.bar.timestamp;
        let price = price.unwrap_or(current.bar.close);
        let previous = processor.previous_bar();
        let cfg = self.positions_cfg.clone();

        let tickets: Vec<Ticket> = self.positions.keys().copied().collect();
        for ticket in tickets {
            let Some(pos) = self.positions.get(&ticket) else {
                continue;
            };
            let profit_pips = pos.profit_pips(price, &self.instrument);
            let flags = pos.flags;

            if cfg.enable_partial_close_profit
                && !flags.partial_profit_done
                && profit_pips >= cfg.partial_take_profit_pips
            {
                self.set_flag(ticket, |f| f.partial_profit_done = true);
                self.partial_close(ticket, cfg.partial_close_percent, price, now, "partial profit", risk)?;
            }

            if cfg.enable_partial_close_loss
                && !flags.partial_loss_done
                && profit_pips <= -cfg.partial_close_loss_pips
                && self.positions.contains_key(&ticket)
            {
                self.set_flag(ticket, |f| f.partial_loss_done = true);
                self.partial_close(ticket, cfg.partial_close_percent, price, now, "partial loss", risk)?;
            }

            if !self.positions.contains_key(&ticket) {
                continue;
            }

            if cfg.enable_breakeven && !flags.breakeven_set && profit_pips >= cfg.partial_take_profit_pips {
                self.set_breakeven(ticket, now);
            }

            let breakeven = self.positions.get(&ticket).is_some_and(|p| p.flags.breakeven_set);
            if cfg.enable_trailing_stop && breakeven {
                if let Some(prev) = previous {
                    self.update_trailing_stop(ticket, prev, now);
                }
            }
        }
        Ok(())
    }

    fn set_flag(&mut self, ticket: Ticket, set: impl FnOnce(&mut ExitFlags)) {
        if let Some(pos) = self.positions.get_mut(&ticket) {
            set(&mut pos.flags);
        }
    }

    fn set_breakeven(&mut self, ticket: Ticket, now: DateTime<Utc>) {
        let buffer = self.instrument.pips_to_price(self.positions_cfg.breakeven_buffer_pips);
        let Some(pos) = self.positions.get_mut(&ticket) else {
            return;
        };
        pos.flags.breakeven_set = true;
        let target = pos.open_price + pos.side.sign() * buffer;
        let old = pos.stop_loss();
        let new = pos.stop.apply(target);
        if new != old {
            info!(%ticket, stop = new, "stop moved to breakeven");
            self.events.push(EngineEvent::StopModified {
                time: now,
                ticket,
                old,
                new,
                reason: StopChangeReason::Breakeven,
            });
        }
    }

    fn update_trailing_stop(&mut self, ticket: Ticket, previous: &EnrichedBar, now: DateTime<Utc>) {
        let Some(pos) = self.positions.get_mut(&ticket) else {
            return;
        };
        let target = match pos.side {
            Side::Buy => previous.bar.low,
            Side::Sell => previous.bar.high,
        };
        let old = pos.stop_loss();
        let new = pos.stop.apply(target);
        if new != old {
            debug!(%ticket, stop = new, "trailing stop updated");
            self.events.push(EngineEvent::StopModified {
                time: now,
                ticket,
                old,
                new,
                reason: StopChangeReason::Trailing,
            });
        }
    }

    /// Close buys once price reaches the fresh upper wick and sells once it
    /// reaches the fresh lower wick.
    pub fn check_and_close_on_wick_touch(
        &mut self,
        upper: Option<f64>,
        lower: Option<f64>,
        price: Option<f64>,
        processor: &IndicatorProcessor,
        risk: &mut RiskManager,
    ) -> Result<usize, EngineError> {
        let bar = &processor.current_bar().ok_or(EngineError::NotProcessed)?.bar;
        let price = price.unwrap_or(bar.close);

        let touched: Vec<(Ticket, &'static str)> = self
            .positions
            .values()
            .filter_map(|pos| match pos.side {
                Side::Buy if upper.is_some_and(|u| price >= u) => Some((pos.ticket, "upper wick touched")),
                Side::Sell if lower.is_some_and(|l| price <= l) => Some((pos.ticket, "lower wick touched")),
                _ => None,
            })
            .collect();

        for (ticket, reason) in &touched {
            self.close_position_at(*ticket, price, bar.timestamp, reason, risk)?;
        }
        Ok(touched.len())
    }

    /// Trim positions once when the current candle turns against them.
    pub fn check_early_exit(
        &mut self,
        processor: &IndicatorProcessor,
        risk: &mut RiskManager,
    ) -> Result<usize, EngineError> {
        if !self.positions_cfg.enable_early_exit {
            return Ok(0);
        }
        let current = processor.current_bar().ok_or(EngineError::NotProcessed)?;
        let previous = processor.previous_bar();
        let now = current.bar.timestamp;

        let mut exits = Vec::new();
        for pos in self.positions.values() {
            if pos.flags.early_exit_done || pos.open_time >= now {
                continue;
            }
            if let Some(reason) = early_exit_reason(pos, current, previous) {
                exits.push((pos.ticket, reason));
            }
        }

        let percent = self.positions_cfg.early_exit_close_percent;
        for (ticket, reason) in &exits {
            info!(%ticket, reason, "early exit condition met");
            self.set_flag(*ticket, |f| f.early_exit_done = true);
            let closed = self.partial_close(*ticket, percent, current.bar.close, now, "early exit", risk)?;
            if closed > 0.0 && self.positions.contains_key(ticket) {
                self.early_exits.insert(*ticket, EarlyExit { at: now, volume: closed });
            }
        }
        Ok(exits.len())
    }

    /// Top a trimmed position back up once price resumes in its direction.
    ///
    /// Opens at most one linked position per call. The caller counts it as
    /// the bar's trade.
    pub fn execute_reentry(
        &mut self,
        processor: &IndicatorProcessor,
        risk: &RiskManager,
    ) -> Result<Option<Ticket>, EngineError> {
        if !self.positions_cfg.reentry || !risk.is_trading_allowed() {
            return Ok(None);
        }
        let current = processor.current_bar().ok_or(EngineError::NotProcessed)?;
        let Some(previous) = processor.previous_bar() else {
            return Ok(None);
        };
        let (bar, now) = (&current.bar, current.bar.timestamp);

        let candidate = self.early_exits.iter().find_map(|(ticket, exit)| {
            let pos = self.positions.get(ticket)?;
            let resumed = match pos.side {
                Side::Buy => bar.high > previous.bar.high,
                Side::Sell => bar.low < previous.bar.low,
            };
            let stop_ok = match pos.side {
                Side::Buy => pos.stop_loss() < bar.close,
                Side::Sell => pos.stop_loss() > bar.close,
            };
            let eligible = exit.at < now && resumed && stop_ok && !pos.flags.reentry_done && pos.reentry_of.is_none();
            eligible.then(|| (pos.clone(), exit.volume))
        });
        let Some((original, volume)) = candidate else {
            return Ok(None);
        };

        if let Some(pos) = self.positions.get_mut(&original.ticket) {
            pos.flags.reentry_done = true;
        }
        self.early_exits.remove(&original.ticket);

        let ticket = self.open(OpenRequest {
            side: original.side,
            price: bar.close,
            volume,
            stop_loss: original.stop_loss(),
            take_profit: original.take_profit,
            time: now,
            comment: format!("re-entry {}", original.ticket),
            reentry_of: Some(original.ticket),
        });
        info!(%ticket, original = %original.ticket, lots = volume, "re-entry executed");
        Ok(Some(ticket))
    }
}

fn early_exit_reason(pos: &Position, current: &EnrichedBar, previous: Option<&EnrichedBar>) -> Option<&'static str> {
    match pos.side {
        Side::Buy if current.candle.bearish => Some("bearish candle formed"),
        Side::Buy if previous.is_some_and(|p| current.bar.low < p.bar.low) => Some("previous low broken"),
        Side::Sell if current.candle.bullish => Some("bullish candle formed"),
        Side::Sell if previous.is_some_and(|p| current.bar.high > p.bar.high) => Some("previous high broken"),
        _ => None,
    }
}
