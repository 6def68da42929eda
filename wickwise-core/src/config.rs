//! Engine configuration.
//!
//! Every section carries `#[serde(default)]`, so a partial TOML file only
//! overrides what it names. `from_toml` and `from_file` validate before
//! returning; invalid values never reach the engine.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::Instrument;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(field, format!("must be a non-negative number, got {value}")));
    }
    Ok(())
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(field, format!("must be positive, got {value}")));
    }
    Ok(())
}

fn percent(field: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(invalid(field, format!("must be within 0..=100, got {value}")));
    }
    Ok(())
}

fn at_least_one(field: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(invalid(field, "must be at least 1"));
    }
    Ok(())
}

// ─── Sections ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub balance: f64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self { balance: 10_000.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Base risk percent fed into the dynamic risk calculation.
    pub max_risk_percent: f64,
    /// Cap on the risk percent when the prevailing trend opposes the trade.
    pub min_risk_percent: f64,
    /// Absolute ceiling on the dynamic risk percent.
    pub dynamic_risk_ceiling: f64,
    pub maximum_sl_pips: f64,
    pub max_daily_loss: f64,
    pub max_daily_profit: f64,
    pub enable_daily_limits: bool,
    /// Bars averaged for the volatility baseline.
    pub volatility_lookback: usize,
    /// ATR assumed for the dynamic stop when none is available yet.
    pub fallback_atr: f64,
    pub dynamic_stop_atr_multiple: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_percent: 5.0,
            min_risk_percent: 5.0,
            dynamic_risk_ceiling: 2.5,
            maximum_sl_pips: 70.0,
            max_daily_loss: 90.0,
            max_daily_profit: 400.0,
            enable_daily_limits: false,
            volatility_lookback: 50,
            fallback_atr: 0.0070,
            dynamic_stop_atr_multiple: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub partial_take_profit_pips: f64,
    pub partial_close_loss_pips: f64,
    pub partial_close_percent: f64,
    pub enable_partial_close_profit: bool,
    pub enable_partial_close_loss: bool,
    pub enable_breakeven: bool,
    pub breakeven_buffer_pips: f64,
    pub enable_trailing_stop: bool,
    pub enable_early_exit: bool,
    pub early_exit_close_percent: f64,
    pub reentry: bool,
    /// Target distance used when a setup supplies no usable take profit.
    pub default_target_pips: f64,
    /// Range cool-down when bar spacing cannot be inferred from the data.
    pub bar_interval_minutes: i64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            partial_take_profit_pips: 15.0,
            partial_close_loss_pips: 15.0,
            partial_close_percent: 50.0,
            enable_partial_close_profit: false,
            enable_partial_close_loss: false,
            enable_breakeven: true,
            breakeven_buffer_pips: 5.0,
            enable_trailing_stop: true,
            enable_early_exit: true,
            early_exit_close_percent: 50.0,
            reentry: true,
            default_target_pips: 250.0,
            bar_interval_minutes: 15,
        }
    }
}

/// Candle pattern thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandleConfig {
    pub body_to_wick_ratio: f64,
    pub min_wick_pips: f64,
    pub large_wick_ratio: f64,
    pub no_wick_pips: f64,
    pub exhaustion_window: usize,
}

impl Default for CandleConfig {
    fn default() -> Self {
        Self {
            body_to_wick_ratio: 0.5,
            min_wick_pips: 5.0,
            large_wick_ratio: 2.0,
            no_wick_pips: 0.4,
            exhaustion_window: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub level_break_buffer_pips: f64,
    pub level_min_pips: f64,
    /// Trailing window scanned by the level tracker and trend detector.
    pub level_window: usize,
    pub supertrend_period: usize,
    pub supertrend_multiplier: f64,
    pub range_min_candles: usize,
    pub range_lookback: usize,
    pub min_pips_for_range: f64,
    pub fresh_wick_atr_period: usize,
    pub fresh_wick_atr_ratio: f64,
    pub fresh_wick_search: usize,
    pub retrace_percent: f64,
    pub stop_loss_buffer_pips: f64,
    pub candles: CandleConfig,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            level_break_buffer_pips: 0.5,
            level_min_pips: 0.0,
            level_window: 1000,
            supertrend_period: 10,
            supertrend_multiplier: 3.0,
            range_min_candles: 3,
            range_lookback: 100,
            min_pips_for_range: 30.0,
            fresh_wick_atr_period: 20,
            fresh_wick_atr_ratio: 0.3,
            fresh_wick_search: 100,
            retrace_percent: 30.0,
            stop_loss_buffer_pips: 10.0,
            candles: CandleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub max_pips_to_opposite_level: f64,
    pub max_pips_from_previous_extreme: f64,
    pub min_wick_clearance_pips: f64,
    pub min_recent_move_pips: f64,
    pub breakout_extra_sl_pips: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            max_pips_to_opposite_level: 60.0,
            max_pips_from_previous_extreme: 20.0,
            min_wick_clearance_pips: 30.0,
            min_recent_move_pips: 10.0,
            breakout_extra_sl_pips: 10.0,
        }
    }
}

/// One named session window, `HH:MM` bounds in UTC, both inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub name: String,
    pub start: String,
    pub end: String,
    pub trade: bool,
}

impl SessionWindow {
    pub fn new(name: &str, start: &str, end: &str, trade: bool) -> Self {
        Self {
            name: name.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            trade,
        }
    }

    pub fn bounds(&self) -> Result<(NaiveTime, NaiveTime), ConfigError> {
        let parse = |raw: &str| {
            NaiveTime::parse_from_str(raw, "%H:%M").map_err(|e| {
                invalid(
                    &format!("sessions.windows[{}]", self.name),
                    format!("bad time {raw:?}: {e}"),
                )
            })
        };
        Ok((parse(&self.start)?, parse(&self.end)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub allow_all_sessions: bool,
    pub windows: Vec<SessionWindow>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allow_all_sessions: true,
            windows: vec![
                SessionWindow::new("Pre-Asian", "23:00", "01:00", false),
                SessionWindow::new("Asian", "01:00", "03:00", false),
                SessionWindow::new("Pre-London", "03:00", "08:00", true),
                SessionWindow::new("London Open", "08:00", "11:00", true),
                SessionWindow::new("Pre-New York", "11:00", "13:00", false),
                SessionWindow::new("New York Open", "13:00", "14:30", false),
                SessionWindow::new("London Close", "14:30", "20:00", false),
            ],
        }
    }
}

// ─── Root ───────────────────────────────────────────────────────────

/// Complete configuration for one per-symbol engine instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub instrument: Instrument,
    pub account: AccountConfig,
    pub risk: RiskConfig,
    pub positions: PositionConfig,
    pub indicators: IndicatorConfig,
    pub scenarios: ScenarioConfig,
    pub sessions: SessionConfig,
}

impl EngineConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let inst = &self.instrument;
        if inst.symbol.trim().is_empty() {
            return Err(invalid("instrument.symbol", "must not be empty"));
        }
        positive("instrument.pip_size", inst.pip_size)?;
        positive("instrument.pip_value", inst.pip_value)?;
        positive("instrument.lot_step", inst.lot_step)?;
        positive("instrument.min_lot", inst.min_lot)?;
        if inst.max_lot < inst.min_lot {
            return Err(invalid("instrument.max_lot", "must not be below min_lot"));
        }

        positive("account.balance", self.account.balance)?;

        let risk = &self.risk;
        percent("risk.max_risk_percent", risk.max_risk_percent)?;
        percent("risk.min_risk_percent", risk.min_risk_percent)?;
        percent("risk.dynamic_risk_ceiling", risk.dynamic_risk_ceiling)?;
        positive("risk.maximum_sl_pips", risk.maximum_sl_pips)?;
        non_negative("risk.max_daily_loss", risk.max_daily_loss)?;
        non_negative("risk.max_daily_profit", risk.max_daily_profit)?;
        at_least_one("risk.volatility_lookback", risk.volatility_lookback)?;
        positive("risk.fallback_atr", risk.fallback_atr)?;
        positive("risk.dynamic_stop_atr_multiple", risk.dynamic_stop_atr_multiple)?;

        let pos = &self.positions;
        non_negative("positions.partial_take_profit_pips", pos.partial_take_profit_pips)?;
        non_negative("positions.partial_close_loss_pips", pos.partial_close_loss_pips)?;
        percent("positions.partial_close_percent", pos.partial_close_percent)?;
        non_negative("positions.breakeven_buffer_pips", pos.breakeven_buffer_pips)?;
        percent("positions.early_exit_close_percent", pos.early_exit_close_percent)?;
        positive("positions.default_target_pips", pos.default_target_pips)?;
        if pos.bar_interval_minutes <= 0 {
            return Err(invalid("positions.bar_interval_minutes", "must be positive"));
        }

        let ind = &self.indicators;
        non_negative("indicators.candles.body_to_wick_ratio", ind.candles.body_to_wick_ratio)?;
        non_negative("indicators.candles.min_wick_pips", ind.candles.min_wick_pips)?;
        non_negative("indicators.candles.large_wick_ratio", ind.candles.large_wick_ratio)?;
        non_negative("indicators.candles.no_wick_pips", ind.candles.no_wick_pips)?;
        at_least_one("indicators.candles.exhaustion_window", ind.candles.exhaustion_window)?;
        non_negative("indicators.level_break_buffer_pips", ind.level_break_buffer_pips)?;
        non_negative("indicators.level_min_pips", ind.level_min_pips)?;
        at_least_one("indicators.level_window", ind.level_window)?;
        at_least_one("indicators.supertrend_period", ind.supertrend_period)?;
        positive("indicators.supertrend_multiplier", ind.supertrend_multiplier)?;
        at_least_one("indicators.range_min_candles", ind.range_min_candles)?;
        at_least_one("indicators.range_lookback", ind.range_lookback)?;
        non_negative("indicators.min_pips_for_range", ind.min_pips_for_range)?;
        at_least_one("indicators.fresh_wick_atr_period", ind.fresh_wick_atr_period)?;
        non_negative("indicators.fresh_wick_atr_ratio", ind.fresh_wick_atr_ratio)?;
        at_least_one("indicators.fresh_wick_search", ind.fresh_wick_search)?;
        percent("indicators.retrace_percent", ind.retrace_percent)?;
        non_negative("indicators.stop_loss_buffer_pips", ind.stop_loss_buffer_pips)?;

        let sc = &self.scenarios;
        non_negative("scenarios.max_pips_to_opposite_level", sc.max_pips_to_opposite_level)?;
        non_negative("scenarios.max_pips_from_previous_extreme", sc.max_pips_from_previous_extreme)?;
        non_negative("scenarios.min_wick_clearance_pips", sc.min_wick_clearance_pips)?;
        non_negative("scenarios.min_recent_move_pips", sc.min_recent_move_pips)?;
        non_negative("scenarios.breakout_extra_sl_pips", sc.breakout_extra_sl_pips)?;

        for window in &self.sessions.windows {
            if window.name.trim().is_empty() {
                return Err(invalid("sessions.windows", "session name must not be empty"));
            }
            window.bounds()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config = EngineConfig::from_toml(
            r#"
            [risk]
            max_daily_loss = 120.0
            enable_daily_limits = true

            [indicators]
            supertrend_period = 14
            "#,
        )
        .unwrap();
        assert_eq!(config.risk.max_daily_loss, 120.0);
        assert!(config.risk.enable_daily_limits);
        assert_eq!(config.risk.max_daily_profit, 400.0);
        assert_eq!(config.indicators.supertrend_period, 14);
        assert_eq!(config.indicators.supertrend_multiplier, 3.0);
        assert_eq!(config.sessions.windows.len(), 7);
    }

    #[test]
    fn negative_pip_distance_is_rejected() {
        let err = EngineConfig::from_toml("[positions]\nbreakeven_buffer_pips = -5.0\n").unwrap_err();
        match err {
            ConfigError::Invalid { field, .. } => assert_eq!(field, "positions.breakeven_buffer_pips"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn percent_out_of_range_is_rejected() {
        assert!(EngineConfig::from_toml("[positions]\npartial_close_percent = 150.0\n").is_err());
    }

    #[test]
    fn malformed_session_time_is_rejected() {
        let toml = r#"
            [sessions]
            windows = [{ name = "Broken", start = "25:00", end = "01:00", trade = true }]
        "#;
        assert!(EngineConfig::from_toml(toml).is_err());
    }

    #[test]
    fn toml_round_trip_preserves_config() {
        let config = EngineConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = EngineConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn session_bounds_parse() {
        let window = SessionWindow::new("London Open", "08:00", "11:00", true);
        let (start, end) = window.bounds().unwrap();
        assert_eq!(start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(end, NaiveTime::from_hms_opt(11, 0, 0).unwrap());
    }
}
