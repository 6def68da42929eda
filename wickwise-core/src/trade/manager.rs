//! The trade manager: position book, execution pipeline and closes.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, PositionConfig, RiskConfig};
use crate::domain::{EngineEvent, ExitFlags, Instrument, Position, Side, Ticket, TradeIntent, TradeRecord};
use crate::error::EngineError;
use crate::processor::IndicatorProcessor;
use crate::risk::RiskManager;
use crate::trade::{Rejection, StopRatchet, TradeOutcome, TradeSetup};

/// Float slack when comparing pip distances against configured caps.
const PIP_TOLERANCE: f64 = 1e-6;

/// Blocks entries while price sits in a consolidation range and for one
/// full bar interval after it leaves.
#[derive(Debug, Clone, Default)]
pub(crate) struct RangeGuard {
    was_in_range: bool,
    last_in_range: Option<DateTime<Utc>>,
}

impl RangeGuard {
    /// Record the range state at `now` and report whether entries are blocked.
    pub(crate) fn observe(&mut self, in_range: bool, now: DateTime<Utc>, interval: Duration) -> bool {
        if in_range {
            self.was_in_range = true;
            self.last_in_range = Some(now);
            return true;
        }
        if !self.was_in_range {
            return false;
        }
        match self.last_in_range {
            Some(last) if now - last <= interval => true,
            _ => {
                self.was_in_range = false;
                debug!(%now, "range cool-down over");
                false
            }
        }
    }
}

/// Volume removed by an early exit, kept until the position closes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EarlyExit {
    pub(crate) at: DateTime<Utc>,
    pub(crate) volume: f64,
}

/// Owner of the open-position set for one symbol.
#[derive(Debug, Clone)]
pub struct TradeManager {
    pub(crate) instrument: Instrument,
    pub(crate) positions_cfg: PositionConfig,
    pub(crate) risk_cfg: RiskConfig,
    balance: f64,
    pub(crate) positions: BTreeMap<Ticket, Position>,
    next_ticket: Ticket,
    pub(crate) events: Vec<EngineEvent>,
    range_guard: RangeGuard,
    pub(crate) early_exits: BTreeMap<Ticket, EarlyExit>,
}

impl TradeManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            instrument: config.instrument.clone(),
            positions_cfg: config.positions.clone(),
            risk_cfg: config.risk.clone(),
            balance: config.account.balance,
            positions: BTreeMap::new(),
            next_ticket: Ticket::FIRST,
            events: Vec::new(),
            range_guard: RangeGuard::default(),
            early_exits: BTreeMap::new(),
        }
    }

    // ─── Queries ───

    pub fn get_open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position(&self, ticket: Ticket) -> Option<&Position> {
        self.positions.get(&ticket)
    }

    pub fn has_open_positions(&self) -> bool {
        !self.positions.is_empty()
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    /// Ticket the next opened position will receive.
    pub fn next_ticket(&self) -> Ticket {
        self.next_ticket
    }

    /// Take every event emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    // ─── Execution ───

    pub fn execute_buy_trade(
        &mut self,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
        price: Option<f64>,
        processor: &IndicatorProcessor,
        risk: &RiskManager,
    ) -> Result<TradeOutcome, EngineError> {
        let setup = TradeSetup::buy(stop_loss, take_profit, "buy");
        self.execute_trade(&setup, price, processor, risk)
    }

    pub fn execute_sell_trade(
        &mut self,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
        price: Option<f64>,
        processor: &IndicatorProcessor,
        risk: &RiskManager,
    ) -> Result<TradeOutcome, EngineError> {
        let setup = TradeSetup::sell(stop_loss, take_profit, "sell");
        self.execute_trade(&setup, price, processor, risk)
    }

    /// Run the execution pipeline for `setup` at `price` (default: the
    /// current close).
    pub fn execute_trade(
        &mut self,
        setup: &TradeSetup,
        price: Option<f64>,
        processor: &IndicatorProcessor,
        risk: &RiskManager,
    ) -> Result<TradeOutcome, EngineError> {
        let bar = processor.current_bar().ok_or(EngineError::NotProcessed)?;
        let now = bar.bar.timestamp;
        let price = price.unwrap_or(bar.bar.close);
        let side = setup.side;

        if !risk.is_trading_allowed() {
            let reason = risk.get_trading_restricted_reason().unwrap_or_default();
            warn!(%side, %reason, "order rejected");
            return Ok(TradeOutcome::Rejected(Rejection::TradingRestricted(reason)));
        }

        if self.observe_range(processor) {
            debug!(%side, "order rejected: price is in range");
            return Ok(TradeOutcome::Rejected(Rejection::InsideRange));
        }

        let stop_loss = match setup.stop_loss.filter(|sl| stop_is_valid(side, price, *sl)) {
            Some(sl) => sl,
            None => {
                let sl = self.dynamic_stop_loss(side, price, processor.current_atr());
                debug!(%side, stop_loss = sl, "generated dynamic stop loss");
                sl
            }
        };

        let stop_pips = self.instrument.pips_between(price, stop_loss);
        let max_pips = self.risk_cfg.maximum_sl_pips;
        if stop_pips > max_pips + PIP_TOLERANCE {
            warn!(%side, stop_pips, max_pips, "order rejected: stop loss too wide");
            return Ok(TradeOutcome::Rejected(Rejection::StopLossTooWide { stop_pips, max_pips }));
        }

        let mut risk_percent = risk.get_position_size_params(self.balance).risk_percent;
        if processor.trend().opposes(side) {
            risk_percent = risk_percent.min(self.risk_cfg.min_risk_percent);
            debug!(%side, risk_percent, "entry with min risk against trend");
        }
        let risk_amount = self.balance * risk_percent / 100.0;
        let volume = self.instrument.lot_size(risk_amount, stop_pips)?;
        if !volume.is_finite() || volume <= 0.0 {
            return Ok(TradeOutcome::Rejected(Rejection::InvalidVolume));
        }

        let take_profit = setup
            .take_profit
            .filter(|tp| target_is_valid(side, price, *tp))
            .unwrap_or_else(|| price + side.sign() * self.instrument.pips_to_price(self.positions_cfg.default_target_pips));

        let ticket = self.open(OpenRequest {
            side,
            price,
            volume,
            stop_loss,
            take_profit,
            time: now,
            comment: setup.comment.clone(),
            reentry_of: None,
        });
        Ok(TradeOutcome::Opened { ticket })
    }

    /// Update the range cool-down with the current bar; true while blocked.
    pub fn observe_range(&mut self, processor: &IndicatorProcessor) -> bool {
        let Some(bar) = processor.current_bar() else {
            return false;
        };
        let interval = processor
            .bar_interval()
            .unwrap_or_else(|| Duration::minutes(self.positions_cfg.bar_interval_minutes));
        self.range_guard.observe(processor.is_in_range(), bar.bar.timestamp, interval)
    }

    fn dynamic_stop_loss(&self, side: Side, price: f64, atr: Option<f64>) -> f64 {
        let atr = atr.unwrap_or(self.risk_cfg.fallback_atr);
        let distance = (atr * self.risk_cfg.dynamic_stop_atr_multiple)
            .min(self.instrument.pips_to_price(self.risk_cfg.maximum_sl_pips));
        price - side.sign() * distance
    }

    pub(crate) fn open(&mut self, req: OpenRequest) -> Ticket {
        let ticket = self.next_ticket;
        self.next_ticket = ticket.next();

        self.events.push(EngineEvent::Intent {
            time: req.time,
            intent: TradeIntent {
                side: req.side,
                volume: req.volume,
                stop_loss: req.stop_loss,
                take_profit: req.take_profit,
                comment: req.comment.clone(),
            },
        });
        self.events.push(EngineEvent::Opened {
            time: req.time,
            ticket,
            side: req.side,
            volume: req.volume,
            price: req.price,
            stop_loss: req.stop_loss,
            take_profit: req.take_profit,
        });
        info!(
            %ticket,
            side = %req.side,
            lots = req.volume,
            entry = req.price,
            sl = req.stop_loss,
            tp = req.take_profit,
            "order executed"
        );

        self.positions.insert(
            ticket,
            Position {
                ticket,
                symbol: self.instrument.symbol.clone(),
                side: req.side,
                open_price: req.price,
                volume: req.volume,
                original_volume: req.volume,
                closed_volume: 0.0,
                stop: StopRatchet::new(req.side, req.stop_loss),
                take_profit: req.take_profit,
                open_time: req.time,
                comment: req.comment,
                flags: ExitFlags::default(),
                reentry_of: req.reentry_of,
            },
        );
        ticket
    }

    // ─── Closing ───

    /// Close `ticket` at the current close.
    pub fn close_position(
        &mut self,
        ticket: Ticket,
        reason: &str,
        processor: &IndicatorProcessor,
        risk: &mut RiskManager,
    ) -> Result<TradeRecord, EngineError> {
        let bar = processor.current_bar().ok_or(EngineError::NotProcessed)?;
        self.close_position_at(ticket, bar.bar.close, bar.bar.timestamp, reason, risk)
    }

    /// Close the remaining volume of `ticket` at `price`, report the trade
    /// to the risk manager and drop the position.
    pub fn close_position_at(
        &mut self,
        ticket: Ticket,
        price: f64,
        time: DateTime<Utc>,
        reason: &str,
        risk: &mut RiskManager,
    ) -> Result<TradeRecord, EngineError> {
        let mut position = self.positions.remove(&ticket).ok_or(EngineError::UnknownTicket(ticket))?;
        self.early_exits.remove(&ticket);

        let volume = position.volume;
        let record = self.trade_record(&position, volume, price, time, reason);
        position.closed_volume = self.instrument.round_lots(position.closed_volume + volume);
        position.volume = 0.0;

        self.events.push(EngineEvent::Closed {
            time,
            ticket,
            reason: reason.to_string(),
            price,
            profit: record.profit,
        });
        info!(%ticket, reason, price, profit = record.profit, "position closed");
        risk.add_trade(record.clone());
        Ok(record)
    }

    /// Take `percent` of the remaining volume off `ticket`.
    ///
    /// The slice is rounded to the lot step; a zero slice is skipped and a
    /// slice covering the whole remainder becomes a full close. Returns the
    /// closed volume.
    pub fn partial_close(
        &mut self,
        ticket: Ticket,
        percent: f64,
        price: f64,
        time: DateTime<Utc>,
        reason: &str,
        risk: &mut RiskManager,
    ) -> Result<f64, EngineError> {
        let position = self.positions.get(&ticket).ok_or(EngineError::UnknownTicket(ticket))?;
        let remaining = position.volume;
        let slice = self.instrument.round_lots(remaining * percent / 100.0).min(remaining);

        if slice <= 0.0 {
            debug!(%ticket, reason, "partial close rounds to zero, skipped");
            return Ok(0.0);
        }
        if remaining - slice < self.instrument.lot_step / 2.0 {
            self.close_position_at(ticket, price, time, reason, risk)?;
            return Ok(remaining);
        }

        let record = self.trade_record(position, slice, price, time, reason);
        let left = self.instrument.round_lots(remaining - slice);
        let closed = self.instrument.round_lots(position.closed_volume + slice);
        if let Some(position) = self.positions.get_mut(&ticket) {
            position.volume = left;
            position.closed_volume = closed;
        }

        self.events.push(EngineEvent::VolumeModified {
            time,
            ticket,
            old: remaining,
            new: left,
            reason: reason.to_string(),
        });
        info!(%ticket, reason, closed = slice, remaining = left, percent, "partial close");
        risk.add_trade(record);
        Ok(slice)
    }

    fn trade_record(
        &self,
        position: &Position,
        volume: f64,
        price: f64,
        time: DateTime<Utc>,
        reason: &str,
    ) -> TradeRecord {
        let pips = position.profit_pips(price, &self.instrument);
        TradeRecord {
            ticket: position.ticket,
            symbol: position.symbol.clone(),
            side: position.side,
            volume,
            open_price: position.open_price,
            close_price: price,
            open_time: position.open_time,
            close_time: time,
            profit: self.instrument.profit(pips, volume),
            commission: 0.0,
            swap: 0.0,
            reason: reason.to_string(),
        }
    }
}

/// Everything needed to put a new position on the book.
#[derive(Debug, Clone)]
pub(crate) struct OpenRequest {
    pub(crate) side: Side,
    pub(crate) price: f64,
    pub(crate) volume: f64,
    pub(crate) stop_loss: f64,
    pub(crate) take_profit: f64,
    pub(crate) time: DateTime<Utc>,
    pub(crate) comment: String,
    pub(crate) reentry_of: Option<Ticket>,
}

fn stop_is_valid(side: Side, price: f64, stop: f64) -> bool {
    stop.is_finite()
        && match side {
            Side::Buy => stop < price,
            Side::Sell => stop > price,
        }
}

fn target_is_valid(side: Side, price: f64, target: f64) -> bool {
    target.is_finite()
        && match side {
            Side::Buy => target > price,
            Side::Sell => target < price,
        }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, make_ohlc_bars};

    /// Closes stepping up 10 pips a bar: no reversals, no ranges.
    fn rising(n: usize) -> Vec<crate::domain::Bar> {
        let closes: Vec<f64> = (0..n).map(|i| 1.1000 + 0.0010 * i as f64).collect();
        make_bars(&closes)
    }

    fn setup(bars: &[crate::domain::Bar]) -> (TradeManager, IndicatorProcessor, RiskManager) {
        let config = EngineConfig::default();
        let mut processor = IndicatorProcessor::new(&config).unwrap();
        processor.process(bars).unwrap();
        (TradeManager::new(&config), processor, RiskManager::new(config.risk.clone()))
    }

    #[test]
    fn buy_sized_from_risk_amount() {
        let (mut tm, p, risk) = setup(&rising(6));
        // 2.5% of 10k = 250 over 25 pips × 10 = 1.0 lot
        let outcome = tm
            .execute_buy_trade(Some(1.0975), Some(1.1100), Some(1.1000), &p, &risk)
            .unwrap();
        assert_eq!(outcome, TradeOutcome::Opened { ticket: Ticket(1000) });
        let pos = tm.position(Ticket(1000)).unwrap();
        assert_eq!(pos.volume, 1.0);
        assert_eq!(pos.stop_loss(), 1.0975);
        assert_eq!(pos.take_profit, 1.1100);

        let events = tm.drain_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], EngineEvent::Intent { .. }));
        assert!(events[1].is_open());
        assert!(tm.drain_events().is_empty());
    }

    fn against_down_trend(min_risk_percent: f64) -> (TradeManager, IndicatorProcessor, RiskManager) {
        let mut config = EngineConfig::default();
        config.risk.min_risk_percent = min_risk_percent;
        let p = crate::scenarios::fixtures::processed(&config, &crate::scenarios::fixtures::counter_buy());
        assert_eq!(p.trend(), crate::indicators::TrendDirection::Down);
        (TradeManager::new(&config), p, RiskManager::new(config.risk.clone()))
    }

    #[test]
    fn opposing_trend_cuts_risk_to_minimum() {
        let (mut tm, p, risk) = against_down_trend(1.0);
        // 1% of 10k = 100 over 20 pips × 10 = 0.5 lot
        let t = tm
            .execute_buy_trade(Some(1.1105), None, Some(1.1125), &p, &risk)
            .unwrap()
            .ticket()
            .unwrap();
        assert_approx(tm.position(t).unwrap().volume, 0.5, 1e-9);

        // with the trend: full 2.5%
        let t = tm
            .execute_sell_trade(Some(1.1145), None, Some(1.1125), &p, &risk)
            .unwrap()
            .ticket()
            .unwrap();
        assert_approx(tm.position(t).unwrap().volume, 1.25, 1e-9);
    }

    #[test]
    fn minimum_above_dynamic_risk_never_raises_it() {
        let (mut tm, p, risk) = against_down_trend(5.0);
        let t = tm
            .execute_buy_trade(Some(1.1105), None, Some(1.1125), &p, &risk)
            .unwrap()
            .ticket()
            .unwrap();
        assert_approx(tm.position(t).unwrap().volume, 1.25, 1e-9);
    }

    #[test]
    fn wrong_side_stop_falls_back_to_capped_volatility_stop() {
        let (mut tm, p, risk) = setup(&rising(6));
        // no ATR yet: 2 × 0.0070 = 140 pips, capped at 70
        let outcome = tm
            .execute_buy_trade(Some(1.1010), None, Some(1.1000), &p, &risk)
            .unwrap();
        let pos = tm.position(outcome.ticket().unwrap()).unwrap();
        assert_approx(pos.stop_loss(), 1.0930, 1e-9);
        // 250 / (70 × 10) = 0.357 → 0.36
        assert_eq!(pos.volume, 0.36);
        // default target 250 pips
        assert_approx(pos.take_profit, 1.1250, 1e-9);
    }

    #[test]
    fn stop_beyond_cap_is_rejected() {
        let (mut tm, p, risk) = setup(&rising(6));
        let outcome = tm
            .execute_sell_trade(Some(1.1080), Some(1.0900), Some(1.1000), &p, &risk)
            .unwrap();
        match outcome {
            TradeOutcome::Rejected(Rejection::StopLossTooWide { stop_pips, max_pips }) => {
                assert_approx(stop_pips, 80.0, 1e-6);
                assert_eq!(max_pips, 70.0);
            }
            other => panic!("expected stop rejection, got {other:?}"),
        }
        assert!(!tm.has_open_positions());
        assert!(tm.drain_events().is_empty());
    }

    #[test]
    fn restricted_risk_rejects_without_state_change() {
        let bars = rising(6);
        let (mut tm, p, _) = setup(&bars);
        let mut risk = RiskManager::new(RiskConfig {
            enable_daily_limits: true,
            ..RiskConfig::default()
        });
        risk.update(bars[5].timestamp);
        let time = bars[5].timestamp;
        risk.add_trade(TradeRecord {
            ticket: Ticket(1),
            symbol: "EURUSD".into(),
            side: Side::Buy,
            volume: 1.0,
            open_price: 1.1,
            close_price: 1.09,
            open_time: time,
            close_time: time,
            profit: -100.0,
            commission: 0.0,
            swap: 0.0,
            reason: "stop loss".into(),
        });

        let outcome = tm.execute_buy_trade(Some(1.0975), None, None, &p, &risk).unwrap();
        assert!(matches!(outcome, TradeOutcome::Rejected(Rejection::TradingRestricted(_))));
        assert_eq!(tm.next_ticket(), Ticket::FIRST);
    }

    #[test]
    fn range_blocks_until_a_full_bar_has_passed() {
        let mut data = vec![
            (1.1000, 1.1040, 1.0960, 1.1010), // range mother bar
            (1.1010, 1.1030, 1.0970, 1.0990),
            (1.0990, 1.1020, 1.0980, 1.1000),
        ];
        let config = EngineConfig::default();
        let mut p = IndicatorProcessor::new(&config).unwrap();
        let risk = RiskManager::new(config.risk.clone());
        let mut tm = TradeManager::new(&config);

        p.process(&make_ohlc_bars(&data)).unwrap();
        assert!(p.is_in_range());
        let outcome = tm.execute_buy_trade(Some(1.0950), None, None, &p, &risk).unwrap();
        assert_eq!(outcome, TradeOutcome::Rejected(Rejection::InsideRange));

        // breakout bar: out of range, but only one bar interval has passed
        data.push((1.1000, 1.1060, 1.0995, 1.1055));
        p.process(&make_ohlc_bars(&data)).unwrap();
        assert!(!p.is_in_range());
        let outcome = tm.execute_buy_trade(Some(1.1000), None, None, &p, &risk).unwrap();
        assert_eq!(outcome, TradeOutcome::Rejected(Rejection::InsideRange));

        data.push((1.1055, 1.1080, 1.1050, 1.1075));
        p.process(&make_ohlc_bars(&data)).unwrap();
        let outcome = tm.execute_buy_trade(Some(1.1040), None, None, &p, &risk).unwrap();
        assert!(outcome.is_opened());
    }

    #[test]
    fn tickets_increase_and_are_never_reused() {
        let (mut tm, p, mut risk) = setup(&rising(6));
        let a = tm.execute_buy_trade(Some(1.0975), None, Some(1.1000), &p, &risk).unwrap();
        tm.close_position(a.ticket().unwrap(), "manual", &p, &mut risk).unwrap();
        let b = tm.execute_buy_trade(Some(1.0975), None, Some(1.1000), &p, &risk).unwrap();
        assert_eq!(a.ticket(), Some(Ticket(1000)));
        assert_eq!(b.ticket(), Some(Ticket(1001)));
    }

    #[test]
    fn close_reports_signed_profit() {
        let bars = rising(6);
        let (mut tm, p, mut risk) = setup(&bars);
        let t = tm
            .execute_buy_trade(Some(1.0975), None, Some(1.1000), &p, &risk)
            .unwrap()
            .ticket()
            .unwrap();
        let record = tm
            .close_position_at(t, 1.0980, bars[5].timestamp, "stop loss", &mut risk)
            .unwrap();
        assert_approx(record.profit, -200.0, 1e-6);
        assert_eq!(risk.history().len(), 1);
        assert!(tm.position(t).is_none());
    }

    #[test]
    fn closing_an_unknown_ticket_is_an_error() {
        let (mut tm, p, mut risk) = setup(&rising(3));
        let err = tm.close_position(Ticket(4242), "manual", &p, &mut risk).unwrap_err();
        assert_eq!(err, EngineError::UnknownTicket(Ticket(4242)));
    }

    #[test]
    fn partial_close_conserves_volume() {
        let bars = rising(6);
        let (mut tm, p, mut risk) = setup(&bars);
        let t = tm
            .execute_buy_trade(Some(1.0975), None, Some(1.1000), &p, &risk)
            .unwrap()
            .ticket()
            .unwrap();
        let now = bars[5].timestamp;
        assert_eq!(tm.partial_close(t, 50.0, 1.1020, now, "partial profit", &mut risk).unwrap(), 0.5);
        assert_eq!(tm.partial_close(t, 50.0, 1.1020, now, "partial profit", &mut risk).unwrap(), 0.25);
        let pos = tm.position(t).unwrap();
        assert_approx(pos.accounted_volume(), pos.original_volume, 1e-9);

        let record = tm.close_position_at(t, 1.1020, now, "target", &mut risk).unwrap();
        assert_eq!(record.volume, 0.25);
        let closed: f64 = risk.history().iter().map(|r| r.volume).sum();
        assert_approx(closed, 1.0, 1e-9);
    }

    #[test]
    fn slice_covering_remainder_closes_fully() {
        let bars = rising(6);
        let (mut tm, p, mut risk) = setup(&bars);
        let t = tm
            .execute_buy_trade(Some(1.0975), None, Some(1.1000), &p, &risk)
            .unwrap()
            .ticket()
            .unwrap();
        tm.drain_events();
        tm.partial_close(t, 100.0, 1.1010, bars[5].timestamp, "early exit", &mut risk)
            .unwrap();
        assert!(!tm.has_open_positions());
        let events = tm.drain_events();
        assert!(matches!(events.last(), Some(EngineEvent::Closed { .. })));
    }
}
