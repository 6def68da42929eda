//! Fatal per-step errors.
//!
//! Trade rejections are not errors; see `trade::Rejection`. An `EngineError`
//! aborts the current processing step only and the engine stays callable.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::Ticket;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("bar sequence is empty")]
    EmptyBars,

    #[error("bars out of order: {current} is not after {previous}")]
    OutOfOrder {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("non-finite price in bar at {timestamp}")]
    NonFinitePrice { timestamp: DateTime<Utc> },

    #[error("malformed bar at {timestamp}: prices outside its high/low")]
    MalformedBar { timestamp: DateTime<Utc> },

    #[error("cannot size position: stop distance {stop_pips} pips with pip value {pip_value}")]
    DegenerateSizing { stop_pips: f64, pip_value: f64 },

    #[error("no open position with ticket {0}")]
    UnknownTicket(Ticket),

    #[error("indicators have not been processed yet")]
    NotProcessed,
}
