//! Events emitted for the external order/position sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Side, Ticket};

/// Order as it would be handed to a broker at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub side: Side,
    pub volume: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopChangeReason {
    Breakeven,
    Trailing,
}

/// Position lifecycle events, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Intent {
        time: DateTime<Utc>,
        intent: TradeIntent,
    },
    Opened {
        time: DateTime<Utc>,
        ticket: Ticket,
        side: Side,
        volume: f64,
        price: f64,
        stop_loss: f64,
        take_profit: f64,
    },
    StopModified {
        time: DateTime<Utc>,
        ticket: Ticket,
        old: f64,
        new: f64,
        reason: StopChangeReason,
    },
    VolumeModified {
        time: DateTime<Utc>,
        ticket: Ticket,
        old: f64,
        new: f64,
        reason: String,
    },
    Closed {
        time: DateTime<Utc>,
        ticket: Ticket,
        reason: String,
        price: f64,
        profit: f64,
    },
}

impl EngineEvent {
    pub fn ticket(&self) -> Option<Ticket> {
        match self {
            EngineEvent::Intent { .. } => None,
            EngineEvent::Opened { ticket, .. }
            | EngineEvent::StopModified { ticket, .. }
            | EngineEvent::VolumeModified { ticket, .. }
            | EngineEvent::Closed { ticket, .. } => Some(*ticket),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, EngineEvent::Opened { .. })
    }
}
