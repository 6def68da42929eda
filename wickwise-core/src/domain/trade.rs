//! Trade records emitted to the risk manager on every realized close.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Side, Ticket};

/// A realized close, full or partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ticket: Ticket,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub open_price: f64,
    pub close_price: f64,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub profit: f64,
    /// Signed broker amount; charges are negative.
    pub commission: f64,
    /// Signed overnight financing; charges are negative.
    pub swap: f64,
    pub reason: String,
}

impl TradeRecord {
    /// Profit after commission and swap, all three signed.
    pub fn net_profit(&self) -> f64 {
        self.profit + self.commission + self.swap
    }

    pub fn is_winner(&self) -> bool {
        self.net_profit() > 0.0
    }
}
