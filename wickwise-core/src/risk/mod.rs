//! Daily risk tracking.
//!
//! The risk manager keeps the realized trade log and today's profit/loss
//! totals. The clock is the bar timestamp handed in by the caller; on a day
//! rollover today's totals are looked up from the per-day index instead of
//! carried over.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RiskConfig;
use crate::domain::TradeRecord;

const LOW_VOLATILITY: f64 = 0.8;
const HIGH_VOLATILITY: f64 = 1.2;
const LOW_VOLATILITY_BOOST: f64 = 1.2;
const HIGH_VOLATILITY_CUT: f64 = 0.8;
const IN_PROFIT_BOOST: f64 = 1.1;

/// Realized profit and loss over one calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyPl {
    pub profit: f64,
    pub loss: f64,
    pub net: f64,
}

impl DailyPl {
    fn add(&mut self, net_profit: f64) {
        if net_profit >= 0.0 {
            self.profit += net_profit;
        } else {
            self.loss += net_profit.abs();
        }
        self.net = self.profit - self.loss;
    }
}

/// Queryable daily risk state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub date: Option<NaiveDate>,
    pub profit: f64,
    pub loss: f64,
    pub net: f64,
    pub trading_allowed: bool,
    pub limit_reached: bool,
    pub restricted_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSizeParams {
    pub risk_percent: f64,
    pub risk_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub pl: DailyPl,
}

/// Multi-day performance roll-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub period_days: u64,
    pub total_profit: f64,
    pub total_loss: f64,
    pub net_pl: f64,
    pub winning_days: usize,
    pub losing_days: usize,
    pub win_rate: f64,
    pub days: Vec<DaySummary>,
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    current_day: Option<NaiveDate>,
    today: DailyPl,
    limit_reached: bool,
    history: Vec<TradeRecord>,
    /// Realized totals keyed by close day.
    daily: BTreeMap<NaiveDate, DailyPl>,
    current_atr: Option<f64>,
    average_atr: Option<f64>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            current_day: None,
            today: DailyPl::default(),
            limit_reached: false,
            history: Vec::new(),
            daily: BTreeMap::new(),
            current_atr: None,
            average_atr: None,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn current_day(&self) -> Option<NaiveDate> {
        self.current_day
    }

    pub fn history(&self) -> &[TradeRecord] {
        &self.history
    }

    // ─── Clock ───

    /// Advance the clock. On a new day today's totals come from the per-day
    /// index. Times earlier than the current day are ignored.
    pub fn update(&mut self, now: DateTime<Utc>) {
        if self.roll_to(now.date_naive()) {
            self.today = self.calculate_daily_pl(self.current_day);
        }
        self.check_daily_limits();
    }

    fn roll_to(&mut self, day: NaiveDate) -> bool {
        match self.current_day {
            Some(current) if day <= current => false,
            previous => {
                self.current_day = Some(day);
                self.today = DailyPl::default();
                self.limit_reached = false;
                if previous.is_some() {
                    info!(%day, "new trading day, daily risk counters reset");
                }
                true
            }
        }
    }

    // ─── Trade log ───

    pub fn add_trade(&mut self, record: TradeRecord) {
        if self.roll_to(record.close_time.date_naive()) {
            self.today = self.calculate_daily_pl(self.current_day);
        }
        let day = record.close_time.date_naive();
        let net = record.net_profit();
        self.daily.entry(day).or_default().add(net);
        if Some(day) == self.current_day {
            self.today.add(net);
        }
        self.history.push(record);

        let was_reached = self.limit_reached;
        self.check_daily_limits();
        if self.limit_reached && !was_reached {
            if let Some(reason) = self.get_trading_restricted_reason() {
                warn!(%reason, "daily risk limit tripped");
            }
        }
    }

    fn check_daily_limits(&mut self) {
        if !self.config.enable_daily_limits {
            self.limit_reached = false;
            return;
        }
        if self.today.profit >= self.config.max_daily_profit || self.today.loss >= self.config.max_daily_loss {
            self.limit_reached = true;
        }
    }

    /// Profit/loss of the trades closed on `day` (defaults to the current day).
    pub fn calculate_daily_pl(&self, day: Option<NaiveDate>) -> DailyPl {
        let Some(day) = day.or(self.current_day) else {
            return DailyPl::default();
        };
        self.daily.get(&day).copied().unwrap_or_default()
    }

    // ─── Gating ───

    pub fn is_trading_allowed(&self) -> bool {
        !self.config.enable_daily_limits || !self.limit_reached
    }

    pub fn get_trading_restricted_reason(&self) -> Option<String> {
        if !self.config.enable_daily_limits {
            return None;
        }
        let cfg = &self.config;
        if self.today.profit >= cfg.max_daily_profit {
            return Some(format!(
                "Daily profit limit reached ({:.2} >= {:.2})",
                self.today.profit, cfg.max_daily_profit
            ));
        }
        if self.today.loss >= cfg.max_daily_loss {
            return Some(format!(
                "Daily loss limit reached ({:.2} >= {:.2})",
                self.today.loss, cfg.max_daily_loss
            ));
        }
        None
    }

    // ─── Sizing ───

    pub fn update_market_conditions(&mut self, current_atr: Option<f64>, average_atr: Option<f64>) {
        self.current_atr = current_atr;
        self.average_atr = average_atr;
    }

    /// Base risk scaled by volatility and today's result, capped at the ceiling.
    pub fn calculate_dynamic_risk_percent(&self) -> f64 {
        let mut risk = self.config.max_risk_percent;

        let usable = |v: Option<f64>| v.filter(|x| x.is_finite() && *x != 0.0);
        if let (Some(current), Some(average)) = (usable(self.current_atr), usable(self.average_atr)) {
            if current < average * LOW_VOLATILITY {
                risk *= LOW_VOLATILITY_BOOST;
            } else if current > average * HIGH_VOLATILITY {
                risk *= HIGH_VOLATILITY_CUT;
            }
        }
        if self.today.profit > 0.0 {
            risk *= IN_PROFIT_BOOST;
        }
        risk.min(self.config.dynamic_risk_ceiling)
    }

    pub fn get_position_size_params(&self, balance: f64) -> PositionSizeParams {
        let risk_percent = self.calculate_dynamic_risk_percent();
        PositionSizeParams {
            risk_percent,
            risk_amount: balance * risk_percent / 100.0,
        }
    }

    // ─── Reporting ───

    pub fn get_daily_stats(&self) -> RiskSnapshot {
        RiskSnapshot {
            date: self.current_day,
            profit: self.today.profit,
            loss: self.today.loss,
            net: self.today.profit - self.today.loss,
            trading_allowed: self.is_trading_allowed(),
            limit_reached: self.limit_reached,
            restricted_reason: self.get_trading_restricted_reason(),
        }
    }

    /// Per-day results for the `days` days up to and including the current day.
    pub fn daily_summary(&self, days: u64) -> PerformanceSummary {
        let mut summary = PerformanceSummary {
            period_days: days,
            total_profit: 0.0,
            total_loss: 0.0,
            net_pl: 0.0,
            winning_days: 0,
            losing_days: 0,
            win_rate: 0.0,
            days: Vec::new(),
        };
        let Some(end) = self.current_day else {
            return summary;
        };
        let start = end.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);

        for date in start.iter_days().take_while(|d| *d <= end) {
            let pl = self.calculate_daily_pl(Some(date));
            if pl.net > 0.0 {
                summary.winning_days += 1;
            } else if pl.net < 0.0 {
                summary.losing_days += 1;
            }
            summary.total_profit += pl.profit;
            summary.total_loss += pl.loss;
            summary.days.push(DaySummary { date, pl });
        }
        summary.net_pl = summary.total_profit - summary.total_loss;
        let decided = summary.winning_days + summary.losing_days;
        if decided > 0 {
            summary.win_rate = summary.winning_days as f64 / decided as f64;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Side, Ticket};
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn record(profit: f64, close_time: DateTime<Utc>) -> TradeRecord {
        TradeRecord {
            ticket: Ticket::FIRST,
            symbol: "EURUSD".into(),
            side: Side::Buy,
            volume: 0.1,
            open_price: 1.1000,
            close_price: 1.1000,
            open_time: close_time,
            close_time,
            profit,
            commission: 0.0,
            swap: 0.0,
            reason: "test".into(),
        }
    }

    fn limited() -> RiskManager {
        RiskManager::new(RiskConfig {
            enable_daily_limits: true,
            ..RiskConfig::default()
        })
    }

    #[test]
    fn limits_disabled_never_block() {
        let mut risk = RiskManager::new(RiskConfig::default());
        risk.add_trade(record(-500.0, at(4, 10)));
        assert!(risk.is_trading_allowed());
        assert_eq!(risk.get_trading_restricted_reason(), None);
    }

    #[test]
    fn loss_limit_blocks_trading() {
        let mut risk = limited();
        risk.add_trade(record(-50.0, at(4, 10)));
        assert!(risk.is_trading_allowed());
        risk.add_trade(record(-45.0, at(4, 11)));
        assert!(!risk.is_trading_allowed());
        assert_eq!(
            risk.get_trading_restricted_reason().as_deref(),
            Some("Daily loss limit reached (95.00 >= 90.00)")
        );
    }

    #[test]
    fn profit_limit_is_reported_first() {
        let mut risk = RiskManager::new(RiskConfig {
            enable_daily_limits: true,
            max_daily_profit: 100.0,
            max_daily_loss: 10.0,
            ..RiskConfig::default()
        });
        risk.add_trade(record(120.0, at(4, 9)));
        risk.add_trade(record(-20.0, at(4, 10)));
        let reason = risk.get_trading_restricted_reason().unwrap();
        assert!(reason.starts_with("Daily profit limit reached"), "{reason}");
    }

    #[test]
    fn new_day_replays_history() {
        let mut risk = limited();
        risk.add_trade(record(-95.0, at(4, 22)));
        assert!(!risk.is_trading_allowed());

        risk.update(at(5, 0));
        assert!(risk.is_trading_allowed());
        let stats = risk.get_daily_stats();
        assert_eq!(stats.date, Some(at(5, 0).date_naive()));
        assert_eq!(stats.loss, 0.0);
        assert_eq!(stats.restricted_reason, None);
    }

    #[test]
    fn earlier_times_do_not_rewind_the_day() {
        let mut risk = limited();
        risk.update(at(5, 8));
        risk.update(at(4, 8));
        assert_eq!(risk.current_day(), Some(at(5, 8).date_naive()));
    }

    #[test]
    fn records_from_past_days_only_touch_history() {
        let mut risk = limited();
        risk.update(at(5, 8));
        risk.add_trade(record(-200.0, at(4, 8)));
        assert!(risk.is_trading_allowed());
        assert_eq!(risk.calculate_daily_pl(Some(at(4, 8).date_naive())).loss, 200.0);
    }

    #[test]
    fn dynamic_risk_respects_ceiling() {
        let mut risk = RiskManager::new(RiskConfig {
            max_risk_percent: 1.5,
            ..RiskConfig::default()
        });
        assert_eq!(risk.calculate_dynamic_risk_percent(), 1.5);

        risk.update_market_conditions(Some(0.0005), Some(0.0010));
        assert!((risk.calculate_dynamic_risk_percent() - 1.8).abs() < 1e-12);

        risk.update_market_conditions(Some(0.0015), Some(0.0010));
        assert!((risk.calculate_dynamic_risk_percent() - 1.2).abs() < 1e-12);

        risk.update_market_conditions(Some(0.0005), Some(0.0010));
        risk.add_trade(record(10.0, at(4, 8)));
        // 1.5 * 1.2 * 1.1 = 1.98
        assert!((risk.calculate_dynamic_risk_percent() - 1.98).abs() < 1e-12);

        let capped = RiskManager::new(RiskConfig::default());
        assert_eq!(capped.calculate_dynamic_risk_percent(), 2.5);
    }

    #[test]
    fn position_size_params_scale_balance() {
        let risk = RiskManager::new(RiskConfig::default());
        let params = risk.get_position_size_params(10_000.0);
        assert_eq!(params.risk_percent, 2.5);
        assert!((params.risk_amount - 250.0).abs() < 1e-9);
    }

    #[test]
    fn summary_counts_winning_and_losing_days() {
        let mut risk = RiskManager::new(RiskConfig::default());
        risk.add_trade(record(30.0, at(2, 8)));
        risk.add_trade(record(-10.0, at(3, 8)));
        risk.add_trade(record(5.0, at(4, 8)));
        let summary = risk.daily_summary(7);
        assert_eq!(summary.winning_days, 2);
        assert_eq!(summary.losing_days, 1);
        assert!((summary.net_pl - 25.0).abs() < 1e-9);
        assert!((summary.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(summary.days.len(), 8);
    }

    #[test]
    fn day_totals_survive_many_rollovers() {
        let mut risk = limited();
        for day in 1..=28 {
            risk.update(at(day, 0));
            risk.add_trade(record(-40.0, at(day, 9)));
            risk.add_trade(record(15.0, at(day, 12)));
        }
        // late record for an earlier day lands on that day only
        risk.add_trade(record(-60.0, at(3, 18)));

        let third = risk.calculate_daily_pl(Some(at(3, 0).date_naive()));
        assert_eq!((third.profit, third.loss), (15.0, 100.0));
        let today = risk.get_daily_stats();
        assert_eq!((today.profit, today.loss), (15.0, 40.0));
        assert_eq!(risk.calculate_daily_pl(None), DailyPl { profit: 15.0, loss: 40.0, net: -25.0 });
        assert_eq!(risk.history().len(), 57);

        let summary = risk.daily_summary(27);
        assert_eq!(summary.days.len(), 28);
        assert_eq!(summary.losing_days, 28);
        assert!((summary.total_loss - (28.0 * 40.0 + 60.0)).abs() < 1e-9);
    }
}
