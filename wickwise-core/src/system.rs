//! The per-symbol trading system: one processing step per bar.
//!
//! Step order:
//! 1. Validate the bar prefix (and that it does not go back in time)
//! 2. Recompute indicators
//! 3. Risk: day rollover and volatility context
//! 4. Scenario manager bar bookkeeping
//! 5. Exits: protective stop/target, wick touch, position management
//! 6. Position-status transition tracking
//! 7. Entries (risk and session permitting): scenarios, early exit, re-entry
//! 8. Drain events into the `StepReport`
//!
//! A failed step leaves every component as it was before the step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::domain::{Bar, EngineEvent};
use crate::error::EngineError;
use crate::processor::{validate_bars, IndicatorProcessor};
use crate::risk::{RiskManager, RiskSnapshot};
use crate::scenarios::{BarState, ScenarioManager, ScenarioResult};
use crate::trade::TradeManager;

/// Everything one step produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub timestamp: DateTime<Utc>,
    pub new_bar: bool,
    pub scenarios: Vec<ScenarioResult>,
    pub events: Vec<EngineEvent>,
    pub risk: RiskSnapshot,
    pub open_positions: usize,
}

/// Pre-step copy of all mutable state.
struct Checkpoint {
    processor: IndicatorProcessor,
    trades: TradeManager,
    risk: RiskManager,
    scenario_state: BarState,
    last_step: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct TradingSystem {
    config: EngineConfig,
    processor: IndicatorProcessor,
    trades: TradeManager,
    risk: RiskManager,
    scenarios: ScenarioManager,
    last_step: Option<DateTime<Utc>>,
}

impl TradingSystem {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            processor: IndicatorProcessor::new(&config)?,
            trades: TradeManager::new(&config),
            risk: RiskManager::new(config.risk.clone()),
            scenarios: ScenarioManager::new(&config),
            last_step: None,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn processor(&self) -> &IndicatorProcessor {
        &self.processor
    }

    pub fn trade_manager(&self) -> &TradeManager {
        &self.trades
    }

    pub fn risk_manager(&self) -> &RiskManager {
        &self.risk
    }

    pub fn scenario_manager(&self) -> &ScenarioManager {
        &self.scenarios
    }

    /// Timestamp of the last completed step.
    pub fn last_step(&self) -> Option<DateTime<Utc>> {
        self.last_step
    }

    /// Run one processing step over `bars`, the latest bar being current.
    pub fn on_bar(&mut self, bars: &[Bar]) -> Result<StepReport, EngineError> {
        let checkpoint = self.checkpoint();
        match self.step(bars) {
            Ok(report) => Ok(report),
            Err(err) => {
                warn!(%err, "step aborted, state restored");
                self.rollback(checkpoint);
                Err(err)
            }
        }
    }

    /// Step over every prefix of `bars` from `warmup` bars on, feeding at
    /// most the last `window` bars each time.
    pub fn replay(
        &mut self,
        bars: &[Bar],
        warmup: usize,
        window: Option<usize>,
    ) -> Result<Vec<StepReport>, EngineError> {
        let mut reports = Vec::with_capacity(bars.len().saturating_sub(warmup));
        for end in warmup.max(1)..=bars.len() {
            let start = window.map_or(0, |w| end.saturating_sub(w.max(1)));
            reports.push(self.on_bar(&bars[start..end])?);
        }
        Ok(reports)
    }

    fn step(&mut self, bars: &[Bar]) -> Result<StepReport, EngineError> {
        // ─── Phase 1: Validate ───
        validate_bars(bars)?;
        let last = bars.last().ok_or(EngineError::EmptyBars)?;
        let now = last.timestamp;
        if let Some(previous) = self.last_step.filter(|prev| now < *prev) {
            return Err(EngineError::OutOfOrder { previous, current: now });
        }

        // ─── Phase 2: Indicators ───
        self.processor.process(bars)?;

        // ─── Phase 3: Risk ───
        self.risk.update(now);
        self.risk
            .update_market_conditions(self.processor.current_atr(), self.processor.average_atr());

        // ─── Phase 4: Bar bookkeeping ───
        let new_bar = self.scenarios.on_new_bar(now);

        // ─── Phase 5: Exits ───
        self.trades.observe_range(&self.processor);
        self.trades.check_stops_and_targets(&self.processor, &mut self.risk)?;
        let wicks = self.processor.prior_fresh_wicks();
        self.trades
            .check_and_close_on_wick_touch(wicks.upper, wicks.lower, None, &self.processor, &mut self.risk)?;
        self.trades.manage_open_positions(None, &self.processor, &mut self.risk)?;

        // ─── Phase 6: Position status ───
        self.scenarios.check_position_status(self.trades.has_open_positions());

        // ─── Phase 7: Entries ───
        let session_ok =
            self.config.sessions.allow_all_sessions || self.processor.is_trade_allowed_for_current_session();
        let mut scenario_results = Vec::new();
        if self.risk.is_trading_allowed() && session_ok {
            scenario_results = self
                .scenarios
                .check_all_scenarios(&self.processor, &mut self.trades, &self.risk)?;

            self.trades.check_early_exit(&self.processor, &mut self.risk)?;
            self.scenarios.check_position_status(self.trades.has_open_positions());

            if self.scenarios.can_trade_in_current_bar()
                && self.trades.execute_reentry(&self.processor, &self.risk)?.is_some()
            {
                self.scenarios.mark_trade_executed();
                self.scenarios.check_position_status(true);
            }
        } else {
            debug!(%now, session_ok, "entries skipped");
        }

        // ─── Phase 8: Report ───
        self.last_step = Some(now);
        Ok(StepReport {
            timestamp: now,
            new_bar,
            scenarios: scenario_results,
            events: self.trades.drain_events(),
            risk: self.risk.get_daily_stats(),
            open_positions: self.trades.open_count(),
        })
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            processor: self.processor.clone(),
            trades: self.trades.clone(),
            risk: self.risk.clone(),
            scenario_state: self.scenarios.state(),
            last_step: self.last_step,
        }
    }

    fn rollback(&mut self, checkpoint: Checkpoint) {
        self.processor = checkpoint.processor;
        self.trades = checkpoint.trades;
        self.risk = checkpoint.risk;
        self.scenarios.restore(checkpoint.scenario_state);
        self.last_step = checkpoint.last_step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Ticket;
    use crate::scenarios::fixtures::{pip_bars, trend_buy};
    use crate::scenarios::ScenarioKind;

    fn system() -> TradingSystem {
        TradingSystem::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.instrument.pip_size = 0.0;
        assert!(TradingSystem::new(config).is_err());
    }

    #[test]
    fn trend_setup_opens_on_the_current_bar() {
        let mut sys = system();
        let report = sys.on_bar(&trend_buy()).unwrap();
        assert!(report.new_bar);
        assert_eq!(report.open_positions, 1);
        assert_eq!(report.scenarios[0].kind, ScenarioKind::TrendFollowing);
        assert!(matches!(report.events[0], EngineEvent::Intent { .. }));
        assert!(matches!(report.events[1], EngineEvent::Opened { ticket, .. } if ticket == Ticket::FIRST));
        assert!(report.risk.trading_allowed);
    }

    #[test]
    fn repeating_the_bar_does_not_trade_twice() {
        let mut sys = system();
        let bars = trend_buy();
        sys.on_bar(&bars).unwrap();
        let again = sys.on_bar(&bars).unwrap();
        assert!(!again.new_bar);
        assert!(again.scenarios.is_empty());
        assert_eq!(again.open_positions, 1);
        assert_eq!(sys.trade_manager().next_ticket(), Ticket::FIRST.next());
    }

    #[test]
    fn replay_opens_at_most_one_scenario_trade_per_bar() {
        let mut sys = system();
        let reports = sys.replay(&trend_buy(), 1, None).unwrap();
        assert_eq!(reports.len(), 6);
        for report in &reports {
            let opened = report
                .scenarios
                .iter()
                .filter(|r| r.outcome.as_ref().is_some_and(|o| o.is_opened()))
                .count();
            assert!(opened <= 1);
        }
        assert!(sys.trade_manager().has_open_positions());
    }

    #[test]
    fn going_back_in_time_fails_and_keeps_state() {
        let mut sys = system();
        let bars = trend_buy();
        sys.on_bar(&bars).unwrap();
        let before = sys.last_step();

        let err = sys.on_bar(&bars[..4]).unwrap_err();
        assert!(matches!(err, EngineError::OutOfOrder { .. }));
        assert_eq!(sys.last_step(), before);
        assert_eq!(sys.trade_manager().open_count(), 1);
        assert_eq!(sys.processor().enriched().len(), 6);
    }

    #[test]
    fn bad_prefix_leaves_engine_callable() {
        let mut sys = system();
        let mut bars = pip_bars(&[(0, 5, -5, 2), (2, 8, -1, 6), (6, 9, 3, 4)]);
        sys.on_bar(&bars[..2]).unwrap();

        bars[2].close = f64::NAN;
        assert!(matches!(sys.on_bar(&bars).unwrap_err(), EngineError::NonFinitePrice { .. }));
        assert_eq!(sys.processor().enriched().len(), 2);

        bars[2].close = 1.1004;
        assert!(sys.on_bar(&bars).is_ok());
        assert!(sys.on_bar(&[]).is_err());
    }

    #[test]
    fn windowed_replay_feeds_bounded_prefixes() {
        let mut sys = system();
        sys.replay(&trend_buy(), 2, Some(3)).unwrap();
        assert_eq!(sys.processor().enriched().len(), 3);
    }
}
