//! Trade management: opening, protecting and closing simulated positions.
//!
//! - `manager`: `TradeManager`, the owner of the open-position set and the
//!   execution pipeline (risk gate → range gate → stop validation → sizing)
//! - `exits`: per-bar exit management (protective stops, partial closes,
//!   breakeven, trailing, wick touch, early exit, re-entry)
//! - `ratchet`: stop levels that only tighten
//!
//! Rejections are ordinary outcomes, not errors.

pub mod exits;
pub mod manager;
pub mod ratchet;

pub use manager::TradeManager;
pub use ratchet::StopRatchet;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{Side, Ticket};

/// What a scenario asks the trade manager to open.
///
/// Missing or wrong-side levels are replaced during execution: the stop by a
/// volatility stop, the target by the default target distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSetup {
    pub side: Side,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub comment: String,
}

impl TradeSetup {
    pub fn buy(stop_loss: Option<f64>, take_profit: Option<f64>, comment: impl Into<String>) -> Self {
        Self {
            side: Side::Buy,
            stop_loss,
            take_profit,
            comment: comment.into(),
        }
    }

    pub fn sell(stop_loss: Option<f64>, take_profit: Option<f64>, comment: impl Into<String>) -> Self {
        Self {
            side: Side::Sell,
            stop_loss,
            take_profit,
            comment: comment.into(),
        }
    }
}

/// Why an execution request did not open a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Rejection {
    TradingRestricted(String),
    InsideRange,
    StopLossTooWide { stop_pips: f64, max_pips: f64 },
    InvalidVolume,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TradingRestricted(reason) => write!(f, "trading restricted: {reason}"),
            Rejection::InsideRange => write!(f, "price is in range"),
            Rejection::StopLossTooWide { stop_pips, max_pips } => {
                write!(f, "stop loss exceeds maximum ({stop_pips:.1} > {max_pips})")
            }
            Rejection::InvalidVolume => write!(f, "computed volume is not tradable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Opened { ticket: Ticket },
    Rejected(Rejection),
}

impl TradeOutcome {
    pub fn is_opened(&self) -> bool {
        matches!(self, TradeOutcome::Opened { .. })
    }

    pub fn ticket(&self) -> Option<Ticket> {
        match self {
            TradeOutcome::Opened { ticket } => Some(*ticket),
            TradeOutcome::Rejected(_) => None,
        }
    }
}
