//! Indicator processor.
//!
//! Runs every feature indicator over a bar prefix in a fixed order
//! (sessions → candle patterns → levels → SuperTrend → trend detector →
//! range → fresh wicks → retracement stops), merges the outputs into an
//! `EnrichedBars` table and rebuilds the `CurrentLevels` cache. Nothing
//! survives between `process` calls except the results of the last one.

pub mod enriched;
pub mod levels;

pub use enriched::{EnrichedBar, EnrichedBars};
pub use levels::CurrentLevels;

use chrono::Duration;
use tracing::debug;

use crate::config::{ConfigError, EngineConfig};
use crate::domain::{Bar, Instrument};
use crate::error::EngineError;
use crate::indicators::{
    finite, CandleFeatures, CandlePatterns, FeatureIndicator, FreshWickLevels, FreshWicks,
    LevelTracker, LevelTrackerOutput, RangeDetector, RangeOutput, RangeSpan, Retracement,
    SessionClassifier, SessionLabel, Supertrend, TrendDetector, TrendDirection,
};
use crate::indicators::trend::{ActiveLevel, TrendTrack};

/// Reject prefixes the indicators cannot reason about.
pub fn validate_bars(bars: &[Bar]) -> Result<(), EngineError> {
    if bars.is_empty() {
        return Err(EngineError::EmptyBars);
    }
    for bar in bars {
        if bar.is_void() {
            return Err(EngineError::NonFinitePrice {
                timestamp: bar.timestamp,
            });
        }
        if !bar.is_sane() {
            return Err(EngineError::MalformedBar {
                timestamp: bar.timestamp,
            });
        }
    }
    for pair in bars.windows(2) {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(EngineError::OutOfOrder {
                previous: pair[0].timestamp,
                current: pair[1].timestamp,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct IndicatorProcessor {
    instrument: Instrument,
    sessions: SessionClassifier,
    candles: CandlePatterns,
    levels: LevelTracker,
    supertrend: Supertrend,
    trend: TrendDetector,
    range: RangeDetector,
    fresh_wicks: FreshWicks,
    retracement: Retracement,
    min_pips_for_range: f64,
    stop_loss_buffer_pips: f64,
    volatility_lookback: usize,

    enriched: EnrichedBars,
    level_book: LevelTrackerOutput,
    ranges: RangeOutput,
    trend_track: TrendTrack,
    current: CurrentLevels,
}

impl IndicatorProcessor {
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        let ind = &config.indicators;
        let pip = config.instrument.pip_size;
        Ok(Self {
            instrument: config.instrument.clone(),
            sessions: SessionClassifier::from_config(&config.sessions)?,
            candles: CandlePatterns::new(ind.candles.clone(), pip),
            levels: LevelTracker::new(ind.level_window, ind.level_break_buffer_pips, ind.level_min_pips, pip),
            supertrend: Supertrend::new(ind.supertrend_period, ind.supertrend_multiplier),
            trend: TrendDetector::new(ind.level_window),
            range: RangeDetector::new(ind.range_min_candles, ind.range_lookback),
            fresh_wicks: FreshWicks::new(ind.fresh_wick_atr_period, ind.fresh_wick_atr_ratio, ind.fresh_wick_search),
            retracement: Retracement::new(ind.retrace_percent),
            min_pips_for_range: ind.min_pips_for_range,
            stop_loss_buffer_pips: ind.stop_loss_buffer_pips,
            volatility_lookback: config.risk.volatility_lookback,
            enriched: EnrichedBars::default(),
            level_book: LevelTrackerOutput::default(),
            ranges: RangeOutput::default(),
            trend_track: TrendTrack::default(),
            current: CurrentLevels::default(),
        })
    }

    /// Recompute every indicator over `bars` and rebuild the query state.
    ///
    /// Idempotent: the same prefix always yields the same table.
    pub fn process(&mut self, bars: &[Bar]) -> Result<&EnrichedBars, EngineError> {
        validate_bars(bars)?;

        let sessions = self.sessions.compute(bars);
        let candles = self.candles.compute(bars);
        let level_book = self.levels.track(bars);
        let supertrend = self.supertrend.compute(bars);
        let trend_track = self.trend.track(bars);
        let ranges = self.range.detect(bars);
        let wicks = self.fresh_wicks.scan(bars);
        let stops = self.retracement.compute(&candles);

        let rows = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| EnrichedBar {
                bar: bar.clone(),
                session: sessions[i].clone(),
                candle: candles[i],
                levels: level_book.snapshots[i],
                supertrend: supertrend[i],
                trend: trend_track.directions[i],
                range: ranges.states[i],
                atr: finite(wicks.atr[i]),
                fresh_wicks: wicks.levels[i],
                stops: stops[i],
            })
            .collect();

        self.enriched = EnrichedBars::new(rows);
        self.level_book = level_book;
        self.ranges = ranges;
        self.trend_track = trend_track;
        self.current = CurrentLevels::rebuild(&self.enriched, &self.instrument, self.min_pips_for_range);

        debug!(
            bars = bars.len(),
            significant = self.current.in_significant_range,
            trend = ?self.trend(),
            "indicators processed"
        );
        Ok(&self.enriched)
    }

    // ── Table access ──

    pub fn enriched(&self) -> &EnrichedBars {
        &self.enriched
    }

    pub fn current_bar(&self) -> Option<&EnrichedBar> {
        self.enriched.current()
    }

    pub fn previous_bar(&self) -> Option<&EnrichedBar> {
        self.enriched.previous()
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn pips(&self, a: f64, b: f64) -> f64 {
        self.instrument.pips_between(a, b)
    }

    /// Spacing of the last two bars.
    pub fn bar_interval(&self) -> Option<Duration> {
        let last = self.enriched.current()?;
        let prev = self.enriched.previous()?;
        Some(last.bar.timestamp - prev.bar.timestamp)
    }

    // ── Levels ──

    pub fn current_levels(&self) -> &CurrentLevels {
        &self.current
    }

    pub fn is_in_significant_range(&self) -> bool {
        self.current.in_significant_range
    }

    pub fn current_level_min(&self) -> Option<f64> {
        self.current.current_level_min
    }

    pub fn current_level_max(&self) -> Option<f64> {
        self.current.current_level_max
    }

    pub fn max_support(&self) -> Option<f64> {
        self.current.max_support
    }

    pub fn min_resistance(&self) -> Option<f64> {
        self.current.min_resistance
    }

    /// Unbroken resistance prices ascending and support prices descending.
    pub fn active_levels(&self) -> (Vec<f64>, Vec<f64>) {
        self.level_book.active_prices()
    }

    // ── Trend ──

    /// Breakout trend detector direction at the current bar.
    pub fn trend(&self) -> TrendDirection {
        self.enriched.current().map(|b| b.trend).unwrap_or_default()
    }

    /// The single resistance/support pair the trend detector is watching.
    pub fn trend_levels(&self) -> (Option<ActiveLevel>, Option<ActiveLevel>) {
        (self.trend_track.resistance, self.trend_track.support)
    }

    pub fn supertrend_direction(&self) -> TrendDirection {
        self.enriched
            .current()
            .map(EnrichedBar::supertrend_direction)
            .unwrap_or_default()
    }

    // ── Candles ──

    /// Candle features `back` bars before the current one.
    pub fn candle(&self, back: usize) -> Option<&CandleFeatures> {
        self.enriched.from_end(back).map(|b| &b.candle)
    }

    // ── Range ──

    /// Price is inside an active consolidation range at the current bar.
    pub fn is_in_range(&self) -> bool {
        self.enriched.current().is_some_and(|b| b.range.in_range)
    }

    pub fn current_range(&self) -> Option<&RangeSpan> {
        self.ranges.current()
    }

    pub fn range_history(&self, min_bars: usize) -> Vec<&RangeSpan> {
        self.ranges.ranges_at_least(min_bars)
    }

    // ── Wicks and stops ──

    pub fn fresh_wicks(&self) -> FreshWickLevels {
        self.enriched.current().map(|b| b.fresh_wicks).unwrap_or_default()
    }

    /// Fresh levels as of the previous bar, i.e. the ones the current bar is testing.
    pub fn prior_fresh_wicks(&self) -> FreshWickLevels {
        self.enriched.previous().map(|b| b.fresh_wicks).unwrap_or_default()
    }

    /// Sell-side stop: upper-wick retracement plus the stop buffer.
    pub fn stop_loss_price_up(&self) -> Option<f64> {
        let buffer = self.instrument.pips_to_price(self.stop_loss_buffer_pips);
        self.enriched.current().and_then(|b| b.stops.up).map(|p| p + buffer)
    }

    /// Buy-side stop: lower-wick retracement minus the stop buffer.
    pub fn stop_loss_price_down(&self) -> Option<f64> {
        let buffer = self.instrument.pips_to_price(self.stop_loss_buffer_pips);
        self.enriched.current().and_then(|b| b.stops.down).map(|p| p - buffer)
    }

    // ── Volatility ──

    pub fn current_atr(&self) -> Option<f64> {
        self.enriched.current().and_then(|b| b.atr)
    }

    /// Mean ATR over the volatility lookback, ignoring warm-up bars.
    pub fn average_atr(&self) -> Option<f64> {
        let values: Vec<f64> = self
            .enriched
            .iter()
            .rev()
            .take(self.volatility_lookback)
            .filter_map(|b| b.atr)
            .collect();
        (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
    }

    // ── Sessions ──

    pub fn current_session(&self) -> Option<&SessionLabel> {
        self.enriched.current().and_then(|b| b.session.as_ref())
    }

    pub fn is_trade_allowed_for_current_session(&self) -> bool {
        self.enriched
            .current()
            .is_some_and(EnrichedBar::session_allows_trading)
    }
}
