use serde::{Deserialize, Serialize};
use std::fmt;

/// Position ticket. Assigned monotonically by the trade manager, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ticket(pub u64);

impl Ticket {
    /// First ticket handed out by a fresh trade manager.
    pub const FIRST: Ticket = Ticket(1000);

    pub fn next(self) -> Ticket {
        Ticket(self.0 + 1)
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
