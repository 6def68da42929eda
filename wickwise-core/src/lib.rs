//! Wickwise Core — candlestick decision engine for one FX symbol.
//!
//! Turns a time-ordered bar prefix into trade decisions:
//! - Feature indicators (levels, trend, SuperTrend, ranges, candle patterns,
//!   fresh wicks, retracement stops, sessions) combined into an enriched table
//! - Entry scenarios (trend following, counter trend, breakout) behind a
//!   one-trade-per-bar scenario manager
//! - Trade management with ratcheting stops, partial closes, early exit and
//!   re-entry
//! - Daily risk limits and volatility-scaled risk sizing
//!
//! `TradingSystem` drives one processing step per bar. Each symbol gets its
//! own instance; nothing is shared between them.

pub mod config;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod indicators;
pub mod processor;
pub mod risk;
pub mod scenarios;
pub mod synthetic;
pub mod system;
pub mod trade;

pub use config::{ConfigError, EngineConfig};
pub use domain::{Bar, EngineEvent, Instrument, Position, Side, Ticket, TradeRecord};
pub use error::EngineError;
pub use processor::IndicatorProcessor;
pub use risk::{RiskManager, RiskSnapshot};
pub use scenarios::{ScenarioKind, ScenarioManager, ScenarioResult};
pub use system::{StepReport, TradingSystem};
pub use trade::{Rejection, TradeManager, TradeOutcome, TradeSetup};
