//! Support/resistance level tracker.
//!
//! A bullish candle followed by a bearish one forms resistance at the open of
//! the bearish candle; bearish then bullish forms support at the open of the
//! bullish candle. A level breaks once a later close clears it by more than
//! the break buffer, and broken levels are pruned immediately.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::indicators::FeatureIndicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelKind {
    Support,
    Resistance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub kind: LevelKind,
    pub created_at: DateTime<Utc>,
    pub creation_index: usize,
    pub broken: bool,
    pub broken_at: Option<DateTime<Utc>>,
}

/// Level state after processing one bar.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LevelSnapshot {
    /// Resistance formed on this bar, if any.
    pub new_resistance: Option<f64>,
    /// Support formed on this bar, if any.
    pub new_support: Option<f64>,
    pub min_resistance: Option<f64>,
    pub max_resistance: Option<f64>,
    pub max_support: Option<f64>,
    pub min_support: Option<f64>,
    pub resistance_count: usize,
    pub support_count: usize,
}

impl LevelSnapshot {
    /// Distance between the nearest resistance and nearest support, in pips.
    pub fn trading_range_pips(&self, pip_size: f64) -> Option<f64> {
        match (self.min_resistance, self.max_support) {
            (Some(r), Some(s)) => Some((r - s).abs() / pip_size),
            _ => None,
        }
    }
}

/// Full tracker result: per-bar snapshots plus the surviving level lists.
#[derive(Debug, Clone, Default)]
pub struct LevelTrackerOutput {
    pub snapshots: Vec<LevelSnapshot>,
    /// Unbroken resistance levels at the last bar, in creation order.
    pub resistance: Vec<Level>,
    /// Unbroken support levels at the last bar, in creation order.
    pub support: Vec<Level>,
    /// Levels broken during the scan, in break order.
    pub broken: Vec<Level>,
}

impl LevelTrackerOutput {
    /// Active resistance prices ascending, support prices descending.
    pub fn active_prices(&self) -> (Vec<f64>, Vec<f64>) {
        let mut res: Vec<f64> = self.resistance.iter().map(|l| l.price).collect();
        let mut sup: Vec<f64> = self.support.iter().map(|l| l.price).collect();
        res.sort_by(|a, b| a.total_cmp(b));
        sup.sort_by(|a, b| b.total_cmp(a));
        (res, sup)
    }
}

#[derive(Debug, Clone)]
pub struct LevelTracker {
    window: usize,
    break_buffer: f64,
    min_pips: f64,
    pip_size: f64,
}

impl LevelTracker {
    pub fn new(window: usize, break_buffer_pips: f64, min_pips: f64, pip_size: f64) -> Self {
        Self {
            window: window.max(1),
            break_buffer: break_buffer_pips * pip_size,
            min_pips,
            pip_size,
        }
    }

    /// Scan the trailing window and return snapshots plus surviving levels.
    pub fn track(&self, bars: &[Bar]) -> LevelTrackerOutput {
        let n = bars.len();
        let mut out = LevelTrackerOutput {
            snapshots: vec![LevelSnapshot::default(); n],
            ..LevelTrackerOutput::default()
        };

        let start = n.saturating_sub(self.window);
        for i in start..n {
            let mut snapshot = LevelSnapshot::default();

            if i >= 1 {
                let prev = &bars[i - 1];
                let curr = &bars[i];
                if prev.is_bullish() && curr.is_bearish() {
                    out.resistance.push(self.level(LevelKind::Resistance, curr, i));
                    snapshot.new_resistance = Some(curr.open);
                }
                if prev.is_bearish() && curr.is_bullish() {
                    out.support.push(self.level(LevelKind::Support, curr, i));
                    snapshot.new_support = Some(curr.open);
                }
            }

            self.break_levels(&mut out, &bars[i], i);

            if let Some((lo, hi)) = self.resistance_pair(&out.resistance) {
                snapshot.min_resistance = Some(lo);
                snapshot.max_resistance = Some(hi);
            }
            if let Some((hi, lo)) = self.support_pair(&out.support) {
                snapshot.max_support = Some(hi);
                snapshot.min_support = Some(lo);
            }
            snapshot.resistance_count = out.resistance.len();
            snapshot.support_count = out.support.len();
            out.snapshots[i] = snapshot;
        }
        out
    }

    fn level(&self, kind: LevelKind, bar: &Bar, index: usize) -> Level {
        Level {
            price: bar.open,
            kind,
            created_at: bar.timestamp,
            creation_index: index,
            broken: false,
            broken_at: None,
        }
    }

    fn break_levels(&self, out: &mut LevelTrackerOutput, bar: &Bar, index: usize) {
        let buffer = self.break_buffer;
        let close = bar.close;

        let (kept, broken): (Vec<Level>, Vec<Level>) = out
            .resistance
            .drain(..)
            .partition(|l| !(l.creation_index < index && close > l.price + buffer));
        out.resistance = kept;
        out.broken.extend(broken.into_iter().map(|l| mark_broken(l, bar)));

        let (kept, broken): (Vec<Level>, Vec<Level>) = out
            .support
            .drain(..)
            .partition(|l| !(l.creation_index < index && close < l.price - buffer));
        out.support = kept;
        out.broken.extend(broken.into_iter().map(|l| mark_broken(l, bar)));
    }

    /// (min, max) resistance: first adjacent pair far enough apart scanning upward.
    fn resistance_pair(&self, levels: &[Level]) -> Option<(f64, f64)> {
        let mut prices: Vec<f64> = levels.iter().map(|l| l.price).collect();
        prices.sort_by(|a, b| a.total_cmp(b));
        self.first_spaced_pair(&prices)
    }

    /// (max, min) support: first adjacent pair far enough apart scanning downward.
    fn support_pair(&self, levels: &[Level]) -> Option<(f64, f64)> {
        let mut prices: Vec<f64> = levels.iter().map(|l| l.price).collect();
        prices.sort_by(|a, b| b.total_cmp(a));
        self.first_spaced_pair(&prices)
    }

    fn first_spaced_pair(&self, sorted: &[f64]) -> Option<(f64, f64)> {
        if sorted.len() < 2 {
            return None;
        }
        let pips = |a: f64, b: f64| (a - b).abs() / self.pip_size;
        if let Some(pair) = sorted.windows(2).find(|w| pips(w[1], w[0]) > self.min_pips) {
            return Some((pair[0], pair[1]));
        }
        let (first, last) = (sorted[0], sorted[sorted.len() - 1]);
        (pips(last, first) > self.min_pips).then_some((first, last))
    }
}

fn mark_broken(mut level: Level, bar: &Bar) -> Level {
    level.broken = true;
    level.broken_at = Some(bar.timestamp);
    level
}

impl FeatureIndicator for LevelTracker {
    type Output = LevelSnapshot;

    fn name(&self) -> &str {
        "levels"
    }

    fn lookback(&self) -> usize {
        2
    }

    fn compute(&self, bars: &[Bar]) -> Vec<LevelSnapshot> {
        self.track(bars).snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_ohlc_bars;

    fn tracker() -> LevelTracker {
        LevelTracker::new(1000, 0.5, 0.0, 0.0001)
    }

    #[test]
    fn bullish_then_bearish_forms_resistance_at_later_open() {
        let bars = make_ohlc_bars(&[
            (1.1000, 1.1025, 1.0995, 1.1020),
            (1.1020, 1.1022, 1.0990, 1.1000),
        ]);
        let out = tracker().track(&bars);
        assert_eq!(out.snapshots[1].new_resistance, Some(1.1020));
        assert_eq!(out.resistance.len(), 1);
        assert_eq!(out.resistance[0].creation_index, 1);
        assert!(out.support.is_empty());
    }

    #[test]
    fn bearish_then_bullish_forms_support() {
        let bars = make_ohlc_bars(&[
            (1.1020, 1.1025, 1.0995, 1.1000),
            (1.1000, 1.1030, 1.0998, 1.1025),
        ]);
        let out = tracker().track(&bars);
        assert_eq!(out.snapshots[1].new_support, Some(1.1000));
        assert_eq!(out.support.len(), 1);
    }

    #[test]
    fn close_beyond_buffer_breaks_resistance() {
        let bars = make_ohlc_bars(&[
            (1.1000, 1.1025, 1.0995, 1.1020),
            (1.1020, 1.1022, 1.0990, 1.1000),
            // close inside the buffer: 1.10204 < 1.1020 + 0.00005
            (1.1000, 1.1021, 1.0999, 1.10204),
            // close clears the buffer
            (1.10204, 1.1030, 1.1000, 1.1026),
        ]);
        let out = tracker().track(&bars);
        assert_eq!(out.snapshots[2].resistance_count, 1);
        assert_eq!(out.snapshots[3].resistance_count, 0);
        assert_eq!(out.broken.len(), 1);
        assert!(out.broken[0].broken);
        assert_eq!(out.broken[0].broken_at, Some(bars[3].timestamp));
    }

    #[test]
    fn resistance_pair_needs_two_levels() {
        let bars = make_ohlc_bars(&[
            (1.1000, 1.1025, 1.0995, 1.1020),
            (1.1020, 1.1022, 1.0990, 1.1000),
        ]);
        let out = tracker().track(&bars);
        assert_eq!(out.snapshots[1].min_resistance, None);
    }

    #[test]
    fn pair_selection_respects_min_pips() {
        let t = LevelTracker::new(1000, 0.5, 10.0, 0.0001);
        // adjacent gaps 5 and 20 pips: first qualifying pair is (1.1005, 1.1025)
        assert_eq!(t.first_spaced_pair(&[1.1000, 1.1005, 1.1025]), Some((1.1005, 1.1025)));
        // all adjacent gaps below min but the full spread qualifies
        assert_eq!(
            t.first_spaced_pair(&[1.1000, 1.1006, 1.1012]),
            Some((1.1000, 1.1012))
        );
        assert_eq!(t.first_spaced_pair(&[1.1000, 1.1005]), None);
    }

    #[test]
    fn support_pair_scans_downward() {
        let t = LevelTracker::new(1000, 0.5, 0.0, 0.0001);
        let levels: Vec<Level> = [1.0950, 1.0990, 1.0970]
            .iter()
            .enumerate()
            .map(|(i, &price)| Level {
                price,
                kind: LevelKind::Support,
                created_at: crate::indicators::bar_time(i),
                creation_index: i,
                broken: false,
                broken_at: None,
            })
            .collect();
        assert_eq!(t.support_pair(&levels), Some((1.0990, 1.0970)));
    }

    #[test]
    fn trading_range_in_pips() {
        let snap = LevelSnapshot {
            min_resistance: Some(1.1040),
            max_support: Some(1.1000),
            ..LevelSnapshot::default()
        };
        assert!((snap.trading_range_pips(0.0001).unwrap() - 40.0).abs() < 1e-9);
    }
}
