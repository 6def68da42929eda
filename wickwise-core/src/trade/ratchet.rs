//! Stop-loss ratchet.
//!
//! Stops may tighten, never loosen: a buy's stop only rises, a sell's stop
//! only falls. Breakeven and trailing updates both go through `apply`.

use serde::{Deserialize, Serialize};

use crate::domain::Side;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopRatchet {
    side: Side,
    level: f64,
}

impl StopRatchet {
    pub fn new(side: Side, initial_level: f64) -> Self {
        Self {
            side,
            level: initial_level,
        }
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Whether `proposed` is strictly tighter than the current level.
    pub fn tightens(&self, proposed: f64) -> bool {
        match self.side {
            Side::Buy => proposed > self.level,
            Side::Sell => proposed < self.level,
        }
    }

    /// Move toward `proposed` if it tightens; returns the resulting level.
    ///
    /// ```
    /// use wickwise_core::domain::Side;
    /// use wickwise_core::trade::ratchet::StopRatchet;
    ///
    /// let mut stop = StopRatchet::new(Side::Buy, 1.0950);
    /// assert_eq!(stop.apply(1.1005), 1.1005);
    /// // loosening is ignored
    /// assert_eq!(stop.apply(1.0990), 1.1005);
    /// ```
    pub fn apply(&mut self, proposed: f64) -> f64 {
        if proposed.is_finite() && self.tightens(proposed) {
            self.level = proposed;
        }
        self.level
    }
}
