//! Scenario manager: evaluation order and the one-trade-per-bar gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::domain::Side;
use crate::error::EngineError;
use crate::processor::IndicatorProcessor;
use crate::risk::RiskManager;
use crate::scenarios::{Breakout, CounterTrend, Scenario, ScenarioKind, TrendFollowing};
use crate::trade::{TradeManager, TradeOutcome};

/// Per-bar bookkeeping. Copyable so a step can be rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BarState {
    pub current_bar: Option<DateTime<Utc>>,
    pub trade_executed: bool,
    pub had_open_position: bool,
    pub position_closed: bool,
}

/// One strategy evaluation within a bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub kind: ScenarioKind,
    pub side: Side,
    pub triggered: bool,
    pub outcome: Option<TradeOutcome>,
}

#[derive(Debug)]
pub struct ScenarioManager {
    scenarios: Vec<Box<dyn Scenario>>,
    state: BarState,
    allow_all_sessions: bool,
}

impl ScenarioManager {
    /// The standard catalogue in priority order.
    pub fn new(config: &EngineConfig) -> Self {
        let sc = &config.scenarios;
        let scenarios: Vec<Box<dyn Scenario>> = vec![
            Box::new(TrendFollowing::buy()),
            Box::new(TrendFollowing::sell()),
            Box::new(CounterTrend::new(Side::Buy, sc)),
            Box::new(CounterTrend::new(Side::Sell, sc)),
            Box::new(Breakout::new(Side::Sell, sc)),
            Box::new(Breakout::new(Side::Buy, sc)),
        ];
        Self::with_scenarios(scenarios, config.sessions.allow_all_sessions)
    }

    pub fn with_scenarios(scenarios: Vec<Box<dyn Scenario>>, allow_all_sessions: bool) -> Self {
        Self {
            scenarios,
            state: BarState::default(),
            allow_all_sessions,
        }
    }

    pub fn scenarios(&self) -> &[Box<dyn Scenario>] {
        &self.scenarios
    }

    pub fn state(&self) -> BarState {
        self.state
    }

    pub fn restore(&mut self, state: BarState) {
        self.state = state;
    }

    // ─── Bar state machine ───

    /// Returns true when `timestamp` starts a new bar; clears the per-bar flags.
    pub fn on_new_bar(&mut self, timestamp: DateTime<Utc>) -> bool {
        if self.state.current_bar == Some(timestamp) {
            return false;
        }
        self.state.current_bar = Some(timestamp);
        self.state.trade_executed = false;
        self.state.position_closed = false;
        debug!(%timestamp, "new bar");
        true
    }

    pub fn mark_trade_executed(&mut self) {
        self.state.trade_executed = true;
    }

    pub fn can_trade_in_current_bar(&self) -> bool {
        !self.state.trade_executed && !self.state.position_closed
    }

    /// Track open→flat transitions; a close blocks new entries for the bar.
    pub fn check_position_status(&mut self, has_open_positions: bool) {
        if self.state.had_open_position && !has_open_positions {
            self.state.position_closed = true;
            debug!("position closed this bar");
        }
        self.state.had_open_position = has_open_positions;
    }

    // ─── Evaluation ───

    /// Check every scenario in order until one opens a trade.
    pub fn check_all_scenarios(
        &mut self,
        processor: &IndicatorProcessor,
        trades: &mut TradeManager,
        risk: &RiskManager,
    ) -> Result<Vec<ScenarioResult>, EngineError> {
        let mut results = Vec::new();
        if !self.can_trade_in_current_bar() {
            return Ok(results);
        }
        if !self.allow_all_sessions && !processor.is_trade_allowed_for_current_session() {
            debug!("session does not permit trading");
            return Ok(results);
        }

        for scenario in &self.scenarios {
            let Some(setup) = scenario.check(processor) else {
                results.push(ScenarioResult {
                    kind: scenario.kind(),
                    side: scenario.side(),
                    triggered: false,
                    outcome: None,
                });
                continue;
            };

            let outcome = trades.execute_trade(&setup, None, processor, risk)?;
            let opened = outcome.is_opened();
            results.push(ScenarioResult {
                kind: scenario.kind(),
                side: scenario.side(),
                triggered: true,
                outcome: Some(outcome),
            });
            if opened {
                info!(scenario = %scenario.kind(), side = %scenario.side(), "scenario opened a trade");
                self.state.trade_executed = true;
                self.state.had_open_position = true;
                break;
            }
        }
        Ok(results)
    }
}
