//! Open simulated positions and their exit-stage bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{Instrument, Ticket};
use crate::trade::ratchet::StopRatchet;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Which one-shot exit stages have already fired for a position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitFlags {
    pub partial_profit_done: bool,
    pub partial_loss_done: bool,
    pub breakeven_set: bool,
    pub early_exit_done: bool,
    pub reentry_done: bool,
}

/// An open simulated position.
///
/// `volume` shrinks on partial closes; `closed_volume` accumulates what has
/// been taken off so that `volume + closed_volume == original_volume`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticket: Ticket,
    pub symbol: String,
    pub side: Side,
    pub open_price: f64,
    pub volume: f64,
    pub original_volume: f64,
    pub closed_volume: f64,
    pub stop: StopRatchet,
    pub take_profit: f64,
    pub open_time: DateTime<Utc>,
    pub comment: String,
    pub flags: ExitFlags,
    /// Set when this position tops up an earlier one after an early exit.
    pub reentry_of: Option<Ticket>,
}

impl Position {
    pub fn stop_loss(&self) -> f64 {
        self.stop.level()
    }

    /// Signed distance from the open price in pips, positive when in profit.
    pub fn profit_pips(&self, price: f64, instrument: &Instrument) -> f64 {
        self.side.sign() * (price - self.open_price) / instrument.pip_size
    }

    /// Volume still open after partial closes, for conservation checks.
    pub fn accounted_volume(&self) -> f64 {
        self.volume + self.closed_volume
    }
}
