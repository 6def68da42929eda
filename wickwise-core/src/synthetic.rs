//! Deterministic synthetic bars for tests, benchmarks and demos.
//!
//! A seeded random walk in FX price scale. Each bar's drift follows a slowly
//! switching regime (up, down, flat) so trends, pullbacks and consolidations
//! all show up in a few hundred bars.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::Bar;

const START_PRICE: f64 = 1.1000;
const FLOOR_PRICE: f64 = 0.5;
/// Typical body size.
const STEP: f64 = 0.0008;
const MAX_WICK: f64 = 0.0012;
const REGIME_SWITCH_PROBABILITY: f64 = 0.05;

/// `count` bars spaced by `interval` starting at `start`. Same seed, same bars.
///
/// Stops early if the next timestamp would leave chrono's range.
pub fn random_walk_bars(seed: u64, start: DateTime<Utc>, count: usize, interval: Duration) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bars = Vec::with_capacity(count);
    let mut close = START_PRICE;
    let mut drift = 0.0;
    let mut timestamp = start;

    for _ in 0..count {
        if rng.gen_bool(REGIME_SWITCH_PROBABILITY) {
            drift = [-0.4, 0.0, 0.4][rng.gen_range(0..3)] * STEP;
        }
        let open = close;
        close = (open + drift + rng.gen_range(-1.0..1.0) * STEP).max(FLOOR_PRICE);
        let high = open.max(close) + rng.gen_range(0.0..MAX_WICK);
        let low = (open.min(close) - rng.gen_range(0.0..MAX_WICK)).max(FLOOR_PRICE / 2.0);

        bars.push(Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume: rng.gen_range(100..5_000),
        });
        timestamp = match timestamp.checked_add_signed(interval) {
            Some(next) => next,
            None => break,
        };
    }
    bars
}
